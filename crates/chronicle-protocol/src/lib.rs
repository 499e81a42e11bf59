//! Chronicle Wire Protocol
//!
//! This crate mirrors the subset of the Chronicle gRPC contract used by
//! `chronicle-client`. The message types are plain prost structs (no build
//! script), so the tag numbers below are the wire contract and must not be
//! renumbered.
//!
//! # Services
//!
//! - `Gossip/Read`: cluster membership snapshot
//! - `Streams/Append`: client-streaming append (options first, then events)
//! - `Streams/Read`: server-streaming read of a single stream
//!
//! # Example
//!
//! ```rust,ignore
//! use chronicle_protocol::gossip::{ClusterInfo, VNodeState};
//!
//! let info: ClusterInfo = decode(bytes)?;
//! for member in &info.members {
//!     println!("{:?} alive={}", member.state(), member.is_alive);
//! }
//! ```

mod error;
pub mod gossip;
pub mod shared;
pub mod streams;

pub use error::{ProtocolError, Result};
pub use shared::{Empty, StreamIdentifier, Uuid};

/// Fully qualified gRPC method paths
pub mod paths {
    /// Gossip snapshot (unary, `Empty` -> `ClusterInfo`)
    pub const GOSSIP_READ: &str = "/chronicle.client.gossip.Gossip/Read";
    /// Append to a stream (client streaming, `AppendReq` -> `AppendResp`)
    pub const STREAMS_APPEND: &str = "/chronicle.client.streams.Streams/Append";
    /// Read a stream (server streaming, `ReadReq` -> `ReadResp`)
    pub const STREAMS_READ: &str = "/chronicle.client.streams.Streams/Read";
}

/// Metadata keys used in request headers and error trailers
pub mod headers {
    /// Trailer naming the server-side exception kind
    pub const EXCEPTION: &str = "exception";
    /// Request header asking the server to reject non-leader handling
    pub const REQUIRES_LEADER: &str = "requires-leader";
    /// Basic credentials header
    pub const AUTHORIZATION: &str = "authorization";

    pub const LEADER_ENDPOINT_HOST: &str = "leader-endpoint-host";
    pub const LEADER_ENDPOINT_PORT: &str = "leader-endpoint-port";

    pub const STREAM_NAME: &str = "stream-name";
    pub const ACTUAL_VERSION: &str = "actual-version";
    pub const EXPECTED_VERSION: &str = "expected-version";

    /// Values carried in the [`EXCEPTION`] trailer
    pub mod exceptions {
        pub const NOT_LEADER: &str = "not-leader";
        pub const ACCESS_DENIED: &str = "access-denied";
        pub const NOT_AUTHENTICATED: &str = "not-authenticated";
        pub const STREAM_DELETED: &str = "stream-deleted";
        pub const STREAM_NOT_FOUND: &str = "stream-not-found";
        pub const WRONG_EXPECTED_VERSION: &str = "wrong-expected-version";
    }
}

/// Default port of a Chronicle node's gRPC listener
pub const DEFAULT_PORT: u16 = 2113;
