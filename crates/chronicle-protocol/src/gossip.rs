//! Gossip service messages
//!
//! A `Gossip/Read` call returns every member the answering node knows
//! about, including dead ones. Interpreting the snapshot (filtering, ranking)
//! is left to the client.

use crate::{ProtocolError, Result, Uuid};

/// Snapshot of cluster membership as seen by one node
#[derive(Clone, PartialEq, prost::Message)]
pub struct ClusterInfo {
    #[prost(message, repeated, tag = "1")]
    pub members: Vec<MemberInfo>,
}

/// Network address of a member's client-facing listener
#[derive(Clone, PartialEq, prost::Message)]
pub struct EndPoint {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(uint32, tag = "2")]
    pub port: u32,
}

/// One member entry of a gossip snapshot
#[derive(Clone, PartialEq, prost::Message)]
pub struct MemberInfo {
    #[prost(message, optional, tag = "1")]
    pub instance_id: Option<Uuid>,
    /// Last time the reporting node heard from this member (ticks)
    #[prost(int64, tag = "2")]
    pub time_stamp: i64,
    #[prost(enumeration = "VNodeState", tag = "3")]
    pub state: i32,
    #[prost(bool, tag = "4")]
    pub is_alive: bool,
    #[prost(message, optional, tag = "5")]
    pub http_end_point: Option<EndPoint>,
}

impl MemberInfo {
    /// The advertised endpoint as `(host, port)`
    pub fn endpoint(&self) -> Result<(&str, u16)> {
        let ep = self
            .http_end_point
            .as_ref()
            .ok_or(ProtocolError::MissingField("http_end_point"))?;
        if ep.address.is_empty() {
            return Err(ProtocolError::InvalidFormat(
                "member endpoint has an empty address".to_string(),
            ));
        }
        let port = u16::try_from(ep.port).map_err(|_| {
            ProtocolError::InvalidFormat(format!("member port {} out of range", ep.port))
        })?;
        Ok((&ep.address, port))
    }

    /// Strictly decoded state, rejecting values this client does not know
    pub fn checked_state(&self) -> Result<VNodeState> {
        VNodeState::try_from(self.state).map_err(|_| ProtocolError::UnknownEnumValue {
            kind: "VNodeState",
            value: self.state,
        })
    }
}

/// Role/status of a cluster member
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum VNodeState {
    Initializing = 0,
    DiscoverLeader = 1,
    Unknown = 2,
    PreReplica = 3,
    CatchingUp = 4,
    Clone = 5,
    Follower = 6,
    PreLeader = 7,
    Leader = 8,
    Manager = 9,
    ShuttingDown = 10,
    Shutdown = 11,
    ReadOnlyLeaderless = 12,
    PreReadOnlyReplica = 13,
    ReadOnlyReplica = 14,
    ResigningLeader = 15,
}
