//! Gossip-driven channel selection
//!
//! # State
//!
//! ```text
//! pending = NewLeader(e)  ──► channel to e, no gossip
//! pending = None, current ──► reuse current
//! otherwise               ──► discovery round:
//!                               last gossip endpoint, known members, seeds
//!                               (each tried once) ─► rank ─► commit
//! ```
//!
//! Selection holds the state lock for its whole duration, so concurrent
//! callers queue behind an in-flight discovery and then reuse its outcome.
//! Nothing is written back until a round succeeds: a cancelled or failed
//! call leaves the state exactly as it found it.

use crate::channel_cache::{Channel, ChannelCache};
use crate::endpoint::Endpoint;
use crate::gossip::{ClusterTopology, GossipClient};
use crate::node_selector::NodeSelector;
use crate::reconnect::ReconnectionSignal;
use crate::settings::ClientSettings;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct SelectorState {
    /// Endpoint requests are currently routed to
    current: Option<Endpoint>,
    /// Endpoint whose gossip answer produced `current`
    last_gossip: Option<Endpoint>,
    /// Member endpoints from the latest snapshot
    known: Vec<Endpoint>,
    pending: ReconnectionSignal,
}

/// Outcome of one successful discovery round
struct Discovery {
    gossip_endpoint: Endpoint,
    topology: ClusterTopology,
    selected: Endpoint,
    channel: Channel,
}

/// Selects channels by gossiping against cluster members
pub struct GossipChannelSelector {
    seeds: Vec<Endpoint>,
    dns_discover: bool,
    gossip_timeout: Duration,
    node_selector: NodeSelector,
    cache: Arc<ChannelCache>,
    gossip: Arc<dyn GossipClient>,
    state: Mutex<SelectorState>,
}

impl GossipChannelSelector {
    pub fn new(
        settings: &ClientSettings,
        cache: Arc<ChannelCache>,
        gossip: Arc<dyn GossipClient>,
    ) -> Self {
        Self {
            seeds: settings.endpoints.clone(),
            dns_discover: settings.dns_discover,
            gossip_timeout: settings.gossip_timeout,
            node_selector: NodeSelector::new(settings.node_preference),
            cache,
            gossip,
            state: Mutex::new(SelectorState::default()),
        }
    }

    /// Channel to the node requests should go to right now
    pub async fn select_channel(&self, cancel: &CancellationToken) -> Result<Channel> {
        let mut state = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.state.lock() => guard,
        };

        match &state.pending {
            ReconnectionSignal::NewLeader(leader) => {
                let leader = leader.clone();
                match self.cache.get_or_create(&leader) {
                    Ok(channel) => {
                        info!("Following new leader at {}", leader);
                        state.current = Some(leader);
                        state.pending = ReconnectionSignal::None;
                        return Ok(channel);
                    }
                    Err(Error::ShutDown) => return Err(Error::ShutDown),
                    // unusable redirect: fall back to discovery
                    Err(e) => warn!("Cannot follow leader {}, rediscovering: {}", leader, e),
                }
            }
            ReconnectionSignal::None => {
                if let Some(current) = &state.current {
                    return self.cache.get_or_create(current);
                }
            }
            ReconnectionSignal::Rediscover => {
                debug!("Rediscovering, dropping current endpoint {:?}", state.current);
            }
        }

        let discovery = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Discovery cancelled, selector state left unchanged");
                return Err(Error::Cancelled);
            }
            result = self.discover(&state) => result?,
        };

        info!(
            "Selected {} ({} members reported by {})",
            discovery.selected,
            discovery.topology.members().len(),
            discovery.gossip_endpoint
        );
        state.known = discovery.topology.endpoints();
        state.last_gossip = Some(discovery.gossip_endpoint);
        state.current = Some(discovery.selected);
        state.pending = ReconnectionSignal::None;
        Ok(discovery.channel)
    }

    /// Channel to a specific endpoint, bypassing selection
    pub fn select_endpoint_channel(&self, endpoint: &Endpoint) -> Result<Channel> {
        self.cache.get_or_create(endpoint)
    }

    /// Record how the next selection should behave; the latest report wins
    pub async fn report(&self, signal: ReconnectionSignal) {
        if signal.is_none() {
            return;
        }
        let mut state = self.state.lock().await;
        debug!("Reconnection requested: {}", signal);
        state.pending = signal;
    }

    /// Close every channel; later selections fail with [`Error::ShutDown`]
    pub fn shutdown(&self) {
        self.cache.clear();
    }

    /// Endpoint requests are currently routed to
    pub async fn current_endpoint(&self) -> Option<Endpoint> {
        self.state.lock().await.current.clone()
    }

    /// Member endpoints from the latest successful discovery
    pub async fn known_endpoints(&self) -> Vec<Endpoint> {
        self.state.lock().await.known.clone()
    }

    /// One pass over every candidate, each gossiped at most once
    async fn discover(&self, state: &SelectorState) -> Result<Discovery> {
        let candidates = self.candidates(state).await;
        debug!("Starting discovery over {} candidates", candidates.len());

        for candidate in &candidates {
            let channel = match self.cache.get_or_create(candidate) {
                Ok(channel) => channel,
                Err(Error::ShutDown) => return Err(Error::ShutDown),
                Err(e) => {
                    warn!("Skipping candidate {}: {}", candidate, e);
                    continue;
                }
            };

            let topology = match self
                .gossip
                .get_cluster_info(&channel, self.gossip_timeout)
                .await
            {
                Ok(topology) => topology,
                Err(e) => {
                    warn!("Gossip with {} failed: {}", candidate, e);
                    continue;
                }
            };

            // best ranked member we can open a channel to
            let mut picked = None;
            for member in self.node_selector.rank(&topology) {
                match self.cache.get_or_create(&member.endpoint) {
                    Ok(channel) => {
                        picked = Some((member.endpoint.clone(), channel));
                        break;
                    }
                    Err(Error::ShutDown) => return Err(Error::ShutDown),
                    Err(e) => warn!("Skipping member {}: {}", member.endpoint, e),
                }
            }

            match picked {
                Some((selected, channel)) => {
                    return Ok(Discovery {
                        gossip_endpoint: candidate.clone(),
                        topology,
                        selected,
                        channel,
                    });
                }
                None => {
                    warn!(
                        "No usable member for preference {} in gossip from {}",
                        self.node_selector.preference(),
                        candidate
                    );
                }
            }
        }

        Err(Error::DiscoveryExhausted {
            attempts: candidates.len(),
        })
    }

    /// Last gossip endpoint, then known members, then seeds, deduplicated
    async fn candidates(&self, state: &SelectorState) -> Vec<Endpoint> {
        let seeds = self.resolve_seeds().await;
        let mut candidates: Vec<Endpoint> = Vec::new();
        for endpoint in state
            .last_gossip
            .iter()
            .chain(state.known.iter())
            .chain(seeds.iter())
        {
            if !candidates.contains(endpoint) {
                candidates.push(endpoint.clone());
            }
        }
        candidates
    }

    async fn resolve_seeds(&self) -> Vec<Endpoint> {
        if !self.dns_discover {
            return self.seeds.clone();
        }

        let mut resolved = Vec::new();
        for seed in &self.seeds {
            match tokio::net::lookup_host((seed.host(), seed.port())).await {
                Ok(addrs) => {
                    let before = resolved.len();
                    resolved.extend(addrs.map(|a| Endpoint::new(a.ip().to_string(), a.port())));
                    if resolved.len() == before {
                        resolved.push(seed.clone());
                    }
                    debug!("Seed {} resolved to {} addresses", seed, resolved.len() - before);
                }
                Err(e) => {
                    warn!("DNS lookup for {} failed, gossiping by name: {}", seed, e);
                    resolved.push(seed.clone());
                }
            }
        }
        resolved
    }
}
