//! Channel selection
//!
//! A [`ChannelSelector`] answers "which channel should the next call use".
//! The variant is fixed by the settings: single-node clients always use the
//! configured node, gossip clients discover the cluster and follow the
//! reconnection signals reported after failed calls.

mod gossip;
mod single_node;

pub use gossip::GossipChannelSelector;
pub use single_node::SingleNodeChannelSelector;

use crate::channel_cache::{Channel, ChannelCache};
use crate::endpoint::Endpoint;
use crate::gossip::GossipClient;
use crate::reconnect::ReconnectionSignal;
use crate::settings::ClientSettings;
use crate::{Error, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Channel selection strategy picked from the client settings
///
/// Gossip mode discovers and follows the cluster; single-node mode always
/// hands out the channel of its one endpoint.
pub enum ChannelSelector {
    Gossip(GossipChannelSelector),
    SingleNode(SingleNodeChannelSelector),
}

impl ChannelSelector {
    /// Pick the variant the settings call for
    pub fn from_settings(
        settings: &ClientSettings,
        cache: Arc<ChannelCache>,
        gossip: Arc<dyn GossipClient>,
    ) -> Result<Self> {
        if settings.is_gossip() {
            return Ok(ChannelSelector::Gossip(GossipChannelSelector::new(
                settings, cache, gossip,
            )));
        }
        let endpoint = settings
            .endpoints
            .first()
            .cloned()
            .ok_or_else(|| Error::InvalidConfig("no endpoint configured".to_string()))?;
        Ok(ChannelSelector::SingleNode(SingleNodeChannelSelector::new(
            endpoint, cache,
        )))
    }

    pub async fn select_channel(&self, cancel: &CancellationToken) -> Result<Channel> {
        match self {
            ChannelSelector::Gossip(s) => s.select_channel(cancel).await,
            ChannelSelector::SingleNode(s) => s.select_channel(cancel),
        }
    }

    pub fn select_endpoint_channel(&self, endpoint: &Endpoint) -> Result<Channel> {
        match self {
            ChannelSelector::Gossip(s) => s.select_endpoint_channel(endpoint),
            ChannelSelector::SingleNode(s) => s.select_endpoint_channel(endpoint),
        }
    }

    pub async fn report(&self, signal: ReconnectionSignal) {
        match self {
            ChannelSelector::Gossip(s) => s.report(signal).await,
            ChannelSelector::SingleNode(s) => s.report(signal),
        }
    }

    /// Release every channel the selector's cache holds
    pub fn shutdown(&self) {
        match self {
            ChannelSelector::Gossip(s) => s.shutdown(),
            ChannelSelector::SingleNode(s) => s.shutdown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gossip::GrpcGossipClient;

    fn build(settings: ClientSettings) -> ChannelSelector {
        let cache = Arc::new(ChannelCache::new(&settings).unwrap());
        ChannelSelector::from_settings(&settings, cache, Arc::new(GrpcGossipClient::new()))
            .unwrap()
    }

    #[test]
    fn test_variant_follows_mode() {
        let single = ClientSettings::builder()
            .single_node(Endpoint::new("a", 2113))
            .tls(false)
            .build()
            .unwrap();
        assert!(matches!(build(single), ChannelSelector::SingleNode(_)));

        let gossip = ClientSettings::builder()
            .gossip_seeds(vec![Endpoint::new("a", 2113), Endpoint::new("b", 2113)])
            .tls(false)
            .build()
            .unwrap();
        assert!(matches!(build(gossip), ChannelSelector::Gossip(_)));
    }

    #[tokio::test]
    async fn test_single_node_facade() {
        let endpoint = Endpoint::new("a", 2113);
        let selector = build(
            ClientSettings::builder()
                .single_node(endpoint.clone())
                .tls(false)
                .build()
                .unwrap(),
        );
        selector.report(ReconnectionSignal::Rediscover).await;
        let channel = selector
            .select_channel(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(channel.endpoint(), &endpoint);

        selector.shutdown();
        assert!(matches!(
            selector.select_channel(&CancellationToken::new()).await,
            Err(Error::ShutDown)
        ));
    }
}
