//! Network endpoint of a cluster member

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Host and port of a member's gRPC listener
///
/// Endpoints are compared by value and used as the channel cache key, so
/// `node-a:2113` and `NODE-A:2113` are distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// URI for the transport (`http://` or `https://`)
    pub fn uri(&self, secure: bool) -> String {
        let scheme = if secure { "https" } else { "http" };
        if self.host.contains(':') {
            format!("{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}", scheme, self.host, self.port)
        }
    }

    /// Parse `host[:port]`, using `default_port` when the port is omitted
    pub fn parse_with_default_port(s: &str, default_port: u16) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidConfig("empty endpoint".to_string()));
        }

        // [v6]:port or [v6]
        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| Error::InvalidConfig(format!("unterminated IPv6 host in '{}'", s)))?;
            let port = match tail.strip_prefix(':') {
                Some(p) => parse_port(p, s)?,
                None if tail.is_empty() => default_port,
                None => {
                    return Err(Error::InvalidConfig(format!("invalid endpoint '{}'", s)));
                }
            };
            return Ok(Self::new(host, port));
        }

        match s.rsplit_once(':') {
            Some((host, _)) if host.contains(':') => Err(Error::InvalidConfig(format!(
                "IPv6 endpoint '{}' must be bracketed",
                s
            ))),
            Some((host, _)) if host.is_empty() => {
                Err(Error::InvalidConfig(format!("missing host in '{}'", s)))
            }
            Some((host, port)) => Ok(Self::new(host, parse_port(port, s)?)),
            None => Ok(Self::new(s, default_port)),
        }
    }
}

fn parse_port(port: &str, input: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|_| Error::InvalidConfig(format!("invalid port in endpoint '{}'", input)))
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_with_default_port(s, chronicle_protocol::DEFAULT_PORT)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(ep: Endpoint) -> Self {
        ep.to_string()
    }
}
