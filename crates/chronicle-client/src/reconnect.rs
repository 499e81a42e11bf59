//! Mapping failed calls to reconnection instructions

use crate::endpoint::Endpoint;
use chronicle_protocol::headers::{self, exceptions};
use std::fmt;
use tonic::{Code, Status};

/// What the channel selector should do before the next call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReconnectionSignal {
    /// Keep using the current channel
    #[default]
    None,
    /// Drop the current node and run discovery again
    Rediscover,
    /// Connect straight to the node the server named as leader
    NewLeader(Endpoint),
}

impl ReconnectionSignal {
    /// Classify a failed RPC
    ///
    /// - a `not-leader` trailer with a leader endpoint: follow that leader
    /// - `Unavailable`, or `DeadlineExceeded` before any response headers:
    ///   rediscover
    /// - anything else is an application failure: no reconnection
    pub fn from_status(status: &Status) -> Self {
        if let Some(leader) = leader_endpoint(status) {
            return ReconnectionSignal::NewLeader(leader);
        }

        match status.code() {
            Code::Unavailable => ReconnectionSignal::Rediscover,
            Code::DeadlineExceeded if status.metadata().is_empty() => {
                ReconnectionSignal::Rediscover
            }
            _ => ReconnectionSignal::None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ReconnectionSignal::None)
    }
}

impl fmt::Display for ReconnectionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconnectionSignal::None => f.write_str("none"),
            ReconnectionSignal::Rediscover => f.write_str("rediscover"),
            ReconnectionSignal::NewLeader(ep) => write!(f, "new leader {}", ep),
        }
    }
}

/// Leader endpoint named by a `not-leader` trailer
pub(crate) fn leader_endpoint(status: &Status) -> Option<Endpoint> {
    let metadata = status.metadata();
    let header = |key: &str| metadata.get(key).and_then(|v| v.to_str().ok());

    if header(headers::EXCEPTION) != Some(exceptions::NOT_LEADER) {
        return None;
    }
    let host = header(headers::LEADER_ENDPOINT_HOST).filter(|h| !h.is_empty())?;
    let port = header(headers::LEADER_ENDPOINT_PORT)?.parse::<u16>().ok()?;
    Some(Endpoint::new(host, port))
}
