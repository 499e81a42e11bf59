//! Client error types
//!
//! Errors fall into two families. Connectivity errors (discovery exhausted,
//! unreachable node, timeout, leader redirect) are retried by the
//! connection manager. Application errors (wrong expected revision, access
//! denied, missing stream) are surfaced to the caller unchanged.

use crate::endpoint::Endpoint;
use crate::reconnect::leader_endpoint;
use crate::types::{CurrentRevision, ExpectedRevision};
use chronicle_protocol::headers::{self, exceptions};
use chronicle_protocol::ProtocolError;
use thiserror::Error;
use tonic::{Code, Status};

#[derive(Error, Debug)]
pub enum Error {
    // ==================== Connectivity ====================
    #[error("Discovery failed: no candidate answered gossip after {attempts} attempts")]
    DiscoveryExhausted { attempts: usize },

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Not leader: leader is at {leader}")]
    NotLeader { leader: Endpoint },

    // ==================== Application ====================
    #[error("Wrong expected revision on '{stream}': expected {expected}, current {current}")]
    WrongExpectedVersion {
        stream: String,
        expected: ExpectedRevision,
        current: CurrentRevision,
    },

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Stream deleted: {0}")]
    StreamDeleted(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    // ==================== Local ====================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Client is shut down")]
    ShutDown,

    /// Status that matched no known failure kind
    #[error("gRPC error ({}): {}", .0.code(), .0.message())]
    Grpc(Status),
}

impl Error {
    /// Failures that call for reconnection rather than surfacing to the user
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Error::DiscoveryExhausted { .. } | Error::ConnectionError(_) | Error::Timeout(_)
        )
    }

    /// Whether retrying the operation (possibly elsewhere) may succeed
    pub fn is_retriable(&self) -> bool {
        self.is_connectivity() || matches!(self, Error::NotLeader { .. })
    }

    /// Leader endpoint carried by a redirect
    pub fn leader(&self) -> Option<&Endpoint> {
        match self {
            Error::NotLeader { leader } => Some(leader),
            _ => None,
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        let metadata = status.metadata();
        let header = |key: &str| metadata.get(key).and_then(|v| v.to_str().ok());
        let stream = || header(headers::STREAM_NAME).unwrap_or_default().to_string();

        match header(headers::EXCEPTION) {
            Some(exceptions::NOT_LEADER) => {
                if let Some(leader) = leader_endpoint(&status) {
                    return Error::NotLeader { leader };
                }
            }
            Some(exceptions::ACCESS_DENIED) => {
                return Error::AccessDenied(status.message().to_string())
            }
            Some(exceptions::NOT_AUTHENTICATED) => return Error::NotAuthenticated,
            Some(exceptions::STREAM_DELETED) => return Error::StreamDeleted(stream()),
            Some(exceptions::STREAM_NOT_FOUND) => return Error::StreamNotFound(stream()),
            Some(exceptions::WRONG_EXPECTED_VERSION) => {
                let expected = header(headers::EXPECTED_VERSION)
                    .and_then(|v| v.parse::<i64>().ok())
                    .map(ExpectedRevision::from_wire)
                    .unwrap_or(ExpectedRevision::Any);
                let current = header(headers::ACTUAL_VERSION)
                    .and_then(|v| v.parse::<i64>().ok())
                    .map(CurrentRevision::from_wire)
                    .unwrap_or(CurrentRevision::NoStream);
                return Error::WrongExpectedVersion {
                    stream: stream(),
                    expected,
                    current,
                };
            }
            _ => {}
        }

        match status.code() {
            Code::Unavailable => Error::ConnectionError(status.message().to_string()),
            Code::DeadlineExceeded => Error::Timeout(status.message().to_string()),
            Code::Unauthenticated => Error::NotAuthenticated,
            Code::PermissionDenied => Error::AccessDenied(status.message().to_string()),
            _ => Error::Grpc(status),
        }
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(e: tonic::transport::Error) -> Self {
        Error::ConnectionError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::metadata::MetadataValue;

    fn status_with(code: Code, pairs: &[(&'static str, &str)]) -> Status {
        let mut status = Status::new(code, "server says no");
        for (k, v) in pairs {
            status
                .metadata_mut()
                .insert(*k, MetadataValue::try_from(*v).unwrap());
        }
        status
    }

    #[test]
    fn test_not_leader_status() {
        let status = status_with(
            Code::NotFound,
            &[
                (headers::EXCEPTION, exceptions::NOT_LEADER),
                (headers::LEADER_ENDPOINT_HOST, "node-c"),
                (headers::LEADER_ENDPOINT_PORT, "2113"),
            ],
        );
        let err = Error::from(status);
        assert_eq!(err.leader(), Some(&Endpoint::new("node-c", 2113)));
        assert!(err.is_retriable());
        assert!(!err.is_connectivity());
    }

    #[test]
    fn test_not_leader_without_endpoint_falls_back() {
        let status = status_with(
            Code::NotFound,
            &[(headers::EXCEPTION, exceptions::NOT_LEADER)],
        );
        assert!(matches!(Error::from(status), Error::Grpc(_)));
    }

    #[test]
    fn test_wrong_expected_version_status() {
        let status = status_with(
            Code::FailedPrecondition,
            &[
                (headers::EXCEPTION, exceptions::WRONG_EXPECTED_VERSION),
                (headers::STREAM_NAME, "orders"),
                (headers::EXPECTED_VERSION, "-1"),
                (headers::ACTUAL_VERSION, "5"),
            ],
        );
        match Error::from(status) {
            Error::WrongExpectedVersion {
                stream,
                expected,
                current,
            } => {
                assert_eq!(stream, "orders");
                assert_eq!(expected, ExpectedRevision::NoStream);
                assert_eq!(current, CurrentRevision::Current(5));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_application_errors_not_retriable() {
        let denied = Error::from(status_with(
            Code::PermissionDenied,
            &[(headers::EXCEPTION, exceptions::ACCESS_DENIED)],
        ));
        assert!(matches!(denied, Error::AccessDenied(_)));
        assert!(!denied.is_retriable());

        let missing = Error::from(status_with(
            Code::NotFound,
            &[
                (headers::EXCEPTION, exceptions::STREAM_NOT_FOUND),
                (headers::STREAM_NAME, "ghost"),
            ],
        ));
        assert!(matches!(missing, Error::StreamNotFound(ref s) if s == "ghost"));
        assert!(!missing.is_retriable());
    }

    #[test]
    fn test_code_fallbacks() {
        assert!(Error::from(Status::unavailable("down")).is_connectivity());
        assert!(matches!(
            Error::from(Status::deadline_exceeded("slow")),
            Error::Timeout(_)
        ));
        assert!(matches!(
            Error::from(Status::unauthenticated("who")),
            Error::NotAuthenticated
        ));
        assert!(matches!(
            Error::from(Status::internal("boom")),
            Error::Grpc(_)
        ));
    }

    #[test]
    fn test_discovery_exhausted_display() {
        let err = Error::DiscoveryExhausted { attempts: 3 };
        assert!(err.is_connectivity());
        assert_eq!(
            err.to_string(),
            "Discovery failed: no candidate answered gossip after 3 attempts"
        );
    }
}
