//! Fixed-endpoint channel selection

use crate::channel_cache::{Channel, ChannelCache};
use crate::endpoint::Endpoint;
use crate::reconnect::ReconnectionSignal;
use crate::{Error, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Always routes to the one configured node
///
/// Reconnection is left to the transport: a broken connection is
/// re-established by the channel itself on the next call.
pub struct SingleNodeChannelSelector {
    endpoint: Endpoint,
    cache: Arc<ChannelCache>,
}

impl SingleNodeChannelSelector {
    pub fn new(endpoint: Endpoint, cache: Arc<ChannelCache>) -> Self {
        Self { endpoint, cache }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn select_channel(&self, cancel: &CancellationToken) -> Result<Channel> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.cache.get_or_create(&self.endpoint)
    }

    pub fn select_endpoint_channel(&self, endpoint: &Endpoint) -> Result<Channel> {
        self.cache.get_or_create(endpoint)
    }

    pub fn shutdown(&self) {
        self.cache.clear();
    }

    pub fn report(&self, signal: ReconnectionSignal) {
        if !signal.is_none() {
            trace!("Ignoring {} for single node {}", signal, self.endpoint);
        }
    }
}
