//! Gossip client and topology snapshots
//!
//! One [`GossipClient::get_cluster_info`] call asks one node for its view
//! of the cluster. Failures are returned as-is: trying another candidate is
//! the selector's job.

use crate::channel_cache::Channel;
use crate::endpoint::Endpoint;
use crate::{Error, Result};
use async_trait::async_trait;
use chronicle_protocol::gossip as proto;
use chronicle_protocol::{paths, Empty};
use std::time::Duration;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::Status;
use tracing::{debug, trace};
use uuid::Uuid;

pub use chronicle_protocol::gossip::VNodeState as MemberState;

/// One cluster member as reported by gossip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub instance_id: Option<Uuid>,
    pub endpoint: Endpoint,
    pub state: MemberState,
    pub is_alive: bool,
    /// Server timestamp of the last time the member was heard from
    pub last_seen: i64,
}

impl MemberInfo {
    pub fn new(endpoint: Endpoint, state: MemberState, is_alive: bool) -> Self {
        Self {
            instance_id: None,
            endpoint,
            state,
            is_alive,
            last_seen: 0,
        }
    }

    pub fn with_last_seen(mut self, last_seen: i64) -> Self {
        self.last_seen = last_seen;
        self
    }
}

impl TryFrom<proto::MemberInfo> for MemberInfo {
    type Error = Error;

    fn try_from(member: proto::MemberInfo) -> Result<Self> {
        let (host, port) = member.endpoint()?;
        let endpoint = Endpoint::new(host, port);
        let state = member.checked_state().unwrap_or_else(|e| {
            debug!("Treating member {} as Unknown: {}", endpoint, e);
            MemberState::Unknown
        });
        let instance_id = member.instance_id.as_ref().and_then(|id| {
            id.as_u128()
                .map(Uuid::from_u128)
                .or_else(|| id.as_str().and_then(|s| Uuid::parse_str(s).ok()))
        });

        Ok(Self {
            instance_id,
            endpoint,
            state,
            is_alive: member.is_alive,
            last_seen: member.time_stamp,
        })
    }
}

/// Membership snapshot from one gossip call
///
/// Snapshots are never merged; a newer one replaces the older one whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterTopology {
    members: Vec<MemberInfo>,
}

impl ClusterTopology {
    pub fn new(members: Vec<MemberInfo>) -> Self {
        Self { members }
    }

    /// Members in the order the server sent them
    pub fn members(&self) -> &[MemberInfo] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Distinct member endpoints, first occurrence order
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints: Vec<Endpoint> = Vec::with_capacity(self.members.len());
        for member in &self.members {
            if !endpoints.contains(&member.endpoint) {
                endpoints.push(member.endpoint.clone());
            }
        }
        endpoints
    }

    /// The alive leader, if the snapshot has one
    pub fn leader(&self) -> Option<&MemberInfo> {
        self.members
            .iter()
            .find(|m| m.is_alive && m.state == MemberState::Leader)
    }
}

impl TryFrom<proto::ClusterInfo> for ClusterTopology {
    type Error = Error;

    fn try_from(info: proto::ClusterInfo) -> Result<Self> {
        let members = info
            .members
            .into_iter()
            .map(MemberInfo::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { members })
    }
}

/// Transport seam for the gossip RPC
#[async_trait]
pub trait GossipClient: Send + Sync + 'static {
    /// Ask the node behind `channel` for its view of the cluster
    async fn get_cluster_info(&self, channel: &Channel, timeout: Duration)
        -> Result<ClusterTopology>;
}

/// Gossip over the `Gossip/Read` gRPC method
#[derive(Debug, Clone, Default)]
pub struct GrpcGossipClient;

impl GrpcGossipClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GossipClient for GrpcGossipClient {
    async fn get_cluster_info(
        &self,
        channel: &Channel,
        timeout: Duration,
    ) -> Result<ClusterTopology> {
        let mut grpc = tonic::client::Grpc::new(channel.transport());

        let call = async {
            grpc.ready()
                .await
                .map_err(|e| Status::unavailable(format!("Channel not ready: {}", e)))?;

            let mut request = tonic::Request::new(Empty {});
            request.set_timeout(timeout);
            let codec: ProstCodec<Empty, proto::ClusterInfo> = ProstCodec::default();
            grpc.unary(request, PathAndQuery::from_static(paths::GOSSIP_READ), codec)
                .await
        };

        let response = tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "gossip to {} timed out after {:?}",
                    channel.endpoint(),
                    timeout
                ))
            })?
            .map_err(Error::from)?;

        let topology = ClusterTopology::try_from(response.into_inner())?;
        trace!(
            "Gossip from {} returned {} members",
            channel.endpoint(),
            topology.members().len()
        );
        Ok(topology)
    }
}
