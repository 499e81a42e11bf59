//! Per-endpoint transport channel cache
//!
//! Every request module obtains its channels here, so there is at most one
//! live [`Channel`] per [`Endpoint`] for a client instance. Channels are
//! connected lazily: construction is synchronous and the TCP/TLS handshake
//! happens on the first RPC, which keeps creation atomic under the cache
//! lock. Channels are only released when the cache is torn down.

use crate::endpoint::Endpoint;
use crate::settings::ClientSettings;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tonic::transport::{Certificate, ClientTlsConfig};
use tracing::{debug, info};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// A transport handle bound to one endpoint
///
/// Clones share the same underlying HTTP/2 connection and the same
/// [`id`](Channel::id).
#[derive(Clone)]
pub struct Channel {
    id: u64,
    endpoint: Endpoint,
    inner: tonic::transport::Channel,
}

impl Channel {
    /// Process-unique identity of the underlying connection
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The tonic channel, for building gRPC clients
    pub fn transport(&self) -> tonic::transport::Channel {
        self.inner.clone()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

struct CacheState {
    channels: HashMap<Endpoint, Channel>,
    closed: bool,
}

/// Owner of every channel a client opens
pub struct ChannelCache {
    state: Mutex<CacheState>,
    secure: bool,
    tls: Option<ClientTlsConfig>,
    connect_timeout: std::time::Duration,
    keep_alive_interval: std::time::Duration,
    keep_alive_timeout: std::time::Duration,
}

impl ChannelCache {
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        let tls = if settings.tls {
            let config = match &settings.tls_ca_file {
                Some(path) => {
                    let pem = std::fs::read(path).map_err(|e| {
                        Error::InvalidConfig(format!(
                            "cannot read TLS CA file {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                    ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem))
                }
                None => ClientTlsConfig::new().with_native_roots(),
            };
            Some(config)
        } else {
            None
        };

        Ok(Self {
            state: Mutex::new(CacheState {
                channels: HashMap::new(),
                closed: false,
            }),
            secure: settings.tls,
            tls,
            connect_timeout: settings.connect_timeout,
            keep_alive_interval: settings.keep_alive_interval,
            keep_alive_timeout: settings.keep_alive_timeout,
        })
    }

    /// Return the cached channel for `endpoint`, creating it on first use
    pub fn get_or_create(&self, endpoint: &Endpoint) -> Result<Channel> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::ShutDown);
        }
        if let Some(channel) = state.channels.get(endpoint) {
            return Ok(channel.clone());
        }

        let channel = self.build(endpoint)?;
        debug!("Created channel {} to {}", channel.id, endpoint);
        state.channels.insert(endpoint.clone(), channel.clone());
        Ok(channel)
    }

    fn build(&self, endpoint: &Endpoint) -> Result<Channel> {
        let mut builder = tonic::transport::Channel::from_shared(endpoint.uri(self.secure))
            .map_err(|e| Error::InvalidConfig(format!("invalid endpoint {}: {}", endpoint, e)))?
            .connect_timeout(self.connect_timeout)
            .tcp_nodelay(true);

        if !self.keep_alive_interval.is_zero() {
            builder = builder
                .http2_keep_alive_interval(self.keep_alive_interval)
                .keep_alive_timeout(self.keep_alive_timeout)
                .keep_alive_while_idle(true);
        }

        if let Some(tls) = &self.tls {
            builder = builder.tls_config(tls.clone()).map_err(|e| {
                Error::InvalidConfig(format!("TLS config error for {}: {}", endpoint, e))
            })?;
        }

        Ok(Channel {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            endpoint: endpoint.clone(),
            inner: builder.connect_lazy(),
        })
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.state.lock().channels.contains_key(endpoint)
    }

    pub fn len(&self) -> usize {
        self.state.lock().channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every channel and refuse new ones
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let count = state.channels.len();
        state.channels.clear();
        state.closed = true;
        info!("Channel cache closed, released {} channels", count);
    }
}
