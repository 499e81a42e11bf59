//! Chronicle Client
//!
//! Cluster-aware gRPC client for the Chronicle event store.
//!
//! # Connectivity
//!
//! - **Channel cache**: one lazily connected channel per node endpoint
//! - **Discovery**: gossip against seeds (optionally DNS-expanded) and pick
//!   a node by [`NodePreference`]
//! - **Reconnection**: leader redirects are followed directly, transport
//!   failures trigger rediscovery with jittered exponential backoff
//!
//! # Example
//!
//! ```rust,ignore
//! use chronicle_client::{Client, ClientSettings, Endpoint, NodePreference};
//!
//! let settings = ClientSettings::builder()
//!     .gossip_seeds(vec!["node1:2113".parse()?, "node2:2113".parse()?])
//!     .node_preference(NodePreference::Leader)
//!     .build()?;
//! let client = Client::new(settings)?;
//! let topology = client.cluster_info().await?;
//! ```

pub mod backoff;
pub mod channel_cache;
pub mod client;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod gossip;
pub mod node_selector;
pub mod reconnect;
pub mod selector;
pub mod serde_utils;
pub mod settings;
pub mod streams;
pub mod types;

pub use backoff::{BackoffPolicy, BackoffPolicyFactory};
pub use channel_cache::{Channel, ChannelCache};
pub use client::Client;
pub use connection::{CallOptions, ConnectionManager};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use gossip::{ClusterTopology, GossipClient, GrpcGossipClient, MemberInfo, MemberState};
pub use node_selector::NodeSelector;
pub use reconnect::ReconnectionSignal;
pub use selector::{ChannelSelector, GossipChannelSelector, SingleNodeChannelSelector};
pub use settings::{ClientSettings, ClientSettingsBuilder, Credentials, DiscoveryMode, NodePreference};
pub use streams::{AppendToStreamOptions, ReadDirection, ReadStreamOptions, StreamPosition};
pub use types::{
    CurrentRevision, EventData, ExpectedRevision, Position, RecordedEvent, ResolvedEvent,
    WriteResult,
};

pub use tokio_util::sync::CancellationToken;
