//! Stream append and read
//!
//! Both operations go through [`ConnectionManager::execute`], so they pick
//! up leader redirects and rediscovery transparently. A read collects the
//! whole server stream inside one attempt: a connection lost half way
//! restarts the read on the newly selected node.

use crate::connection::ConnectionManager;
use crate::types::{
    CurrentRevision, EventData, ExpectedRevision, Position, RecordedEvent, ResolvedEvent,
    WriteResult, METADATA_CONTENT_TYPE, METADATA_TYPE,
};
use crate::{Error, Result};
use bytes::Bytes;
use chronicle_protocol::streams::{append_req, append_resp, read_req, read_resp};
use chronicle_protocol::streams::{AppendReq, AppendResp, ReadReq, ReadResp};
use chronicle_protocol::{paths, Empty, StreamIdentifier};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::Status;
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// Options
// ============================================================================

/// Options for [`append_to_stream`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendToStreamOptions {
    pub expected_revision: ExpectedRevision,
    /// Reject the write unless the receiving node is the leader
    pub requires_leader: bool,
}

impl AppendToStreamOptions {
    pub fn expected_revision(mut self, expected: ExpectedRevision) -> Self {
        self.expected_revision = expected;
        self
    }

    pub fn requires_leader(mut self, requires_leader: bool) -> Self {
        self.requires_leader = requires_leader;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadDirection {
    #[default]
    Forwards,
    Backwards,
}

/// Where a stream read begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPosition {
    #[default]
    Start,
    End,
    Revision(u64),
}

/// Options for [`read_stream`]
#[derive(Debug, Clone, Copy)]
pub struct ReadStreamOptions {
    pub direction: ReadDirection,
    pub position: StreamPosition,
    pub max_count: u64,
    pub resolve_links: bool,
    pub requires_leader: bool,
}

impl Default for ReadStreamOptions {
    fn default() -> Self {
        Self {
            direction: ReadDirection::Forwards,
            position: StreamPosition::Start,
            max_count: u64::MAX,
            resolve_links: false,
            requires_leader: false,
        }
    }
}

impl ReadStreamOptions {
    pub fn forwards(mut self) -> Self {
        self.direction = ReadDirection::Forwards;
        self
    }

    pub fn backwards(mut self) -> Self {
        self.direction = ReadDirection::Backwards;
        self
    }

    pub fn position(mut self, position: StreamPosition) -> Self {
        self.position = position;
        self
    }

    pub fn max_count(mut self, max_count: u64) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn resolve_links(mut self, resolve_links: bool) -> Self {
        self.resolve_links = resolve_links;
        self
    }

    pub fn requires_leader(mut self, requires_leader: bool) -> Self {
        self.requires_leader = requires_leader;
        self
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Append `events` to `stream` atomically
pub async fn append_to_stream(
    conn: &ConnectionManager,
    cancel: &CancellationToken,
    stream: &str,
    options: AppendToStreamOptions,
    events: Vec<EventData>,
) -> Result<WriteResult> {
    let frames = append_frames(stream, options.expected_revision, &events);
    let call_options = conn.call_options().requires_leader(options.requires_leader);
    debug!("Appending {} events to '{}'", events.len(), stream);

    let response = conn
        .execute(cancel, |channel| {
            let request = call_options.request(futures::stream::iter(frames.clone()));
            async move {
                let mut grpc = tonic::client::Grpc::new(channel.transport());
                grpc.ready()
                    .await
                    .map_err(|e| Status::unavailable(format!("Channel not ready: {}", e)))?;
                let codec: ProstCodec<AppendReq, AppendResp> = ProstCodec::default();
                grpc.client_streaming(
                    request,
                    PathAndQuery::from_static(paths::STREAMS_APPEND),
                    codec,
                )
                .await
            }
        })
        .await?;

    write_result(stream, response.into_inner())
}

/// Read events from `stream`
pub async fn read_stream(
    conn: &ConnectionManager,
    cancel: &CancellationToken,
    stream: &str,
    options: ReadStreamOptions,
) -> Result<Vec<ResolvedEvent>> {
    let read = read_request(stream, &options);
    let call_options = conn.call_options().requires_leader(options.requires_leader);

    let responses = conn
        .execute(cancel, |channel| {
            let request = call_options.request(read.clone());
            async move {
                let mut grpc = tonic::client::Grpc::new(channel.transport());
                grpc.ready()
                    .await
                    .map_err(|e| Status::unavailable(format!("Channel not ready: {}", e)))?;
                let codec: ProstCodec<ReadReq, ReadResp> = ProstCodec::default();
                let mut messages = grpc
                    .server_streaming(request, PathAndQuery::from_static(paths::STREAMS_READ), codec)
                    .await?
                    .into_inner();

                let mut responses = Vec::new();
                while let Some(message) = messages.message().await? {
                    responses.push(message);
                }
                Ok::<_, Status>(responses)
            }
        })
        .await?;

    let events = resolved_events(stream, responses)?;
    debug!("Read {} events from '{}'", events.len(), stream);
    Ok(events)
}

// ============================================================================
// Wire conversion
// ============================================================================

fn append_frames(stream: &str, expected: ExpectedRevision, events: &[EventData]) -> Vec<AppendReq> {
    use append_req::options::ExpectedStreamRevision;

    let expected_stream_revision = match expected {
        ExpectedRevision::Any => ExpectedStreamRevision::Any(Empty {}),
        ExpectedRevision::NoStream => ExpectedStreamRevision::NoStream(Empty {}),
        ExpectedRevision::StreamExists => ExpectedStreamRevision::StreamExists(Empty {}),
        ExpectedRevision::Exact(revision) => ExpectedStreamRevision::Revision(revision),
    };

    let header = AppendReq {
        content: Some(append_req::Content::Options(append_req::Options {
            stream_identifier: Some(StreamIdentifier::new(stream)),
            expected_stream_revision: Some(expected_stream_revision),
        })),
    };

    std::iter::once(header)
        .chain(events.iter().map(|event| AppendReq {
            content: Some(append_req::Content::ProposedMessage(proposed_message(event))),
        }))
        .collect()
}

fn proposed_message(event: &EventData) -> append_req::ProposedMessage {
    let mut metadata = HashMap::with_capacity(2);
    metadata.insert(METADATA_TYPE.to_string(), event.event_type.clone());
    metadata.insert(METADATA_CONTENT_TYPE.to_string(), event.content_type.clone());

    append_req::ProposedMessage {
        id: Some(chronicle_protocol::Uuid::from_string(event.id.to_string())),
        metadata,
        custom_metadata: event.custom_metadata.to_vec(),
        data: event.data.to_vec(),
    }
}

fn write_result(stream: &str, response: AppendResp) -> Result<WriteResult> {
    match response.result {
        Some(append_resp::Result::Success(success)) => {
            use append_resp::success::{CurrentRevisionOption, PositionOption};

            let next_expected_revision = match success.current_revision_option {
                Some(CurrentRevisionOption::CurrentRevision(r)) => CurrentRevision::Current(r),
                Some(CurrentRevisionOption::NoStream(_)) | None => CurrentRevision::NoStream,
            };
            let position = match success.position_option {
                Some(PositionOption::Position(p)) => Some(Position {
                    commit: p.commit_position,
                    prepare: p.prepare_position,
                }),
                Some(PositionOption::NoPosition(_)) | None => None,
            };
            Ok(WriteResult {
                next_expected_revision,
                position,
            })
        }
        Some(append_resp::Result::WrongExpectedVersion(wrong)) => {
            use append_resp::wrong_expected_version::{
                CurrentRevisionOption, ExpectedRevisionOption,
            };

            let current = match wrong.current_revision_option {
                Some(CurrentRevisionOption::CurrentRevision(r)) => CurrentRevision::Current(r),
                Some(CurrentRevisionOption::CurrentNoStream(_)) | None => {
                    CurrentRevision::NoStream
                }
            };
            let expected = match wrong.expected_revision_option {
                Some(ExpectedRevisionOption::ExpectedRevision(r)) => ExpectedRevision::Exact(r),
                Some(ExpectedRevisionOption::ExpectedNoStream(_)) => ExpectedRevision::NoStream,
                Some(ExpectedRevisionOption::ExpectedStreamExists(_)) => {
                    ExpectedRevision::StreamExists
                }
                Some(ExpectedRevisionOption::ExpectedAny(_)) | None => ExpectedRevision::Any,
            };
            Err(Error::WrongExpectedVersion {
                stream: stream.to_string(),
                expected,
                current,
            })
        }
        None => Err(Error::InvalidResponse(
            "append response carried no result".to_string(),
        )),
    }
}

fn read_request(stream: &str, options: &ReadStreamOptions) -> ReadReq {
    use read_req::stream_options::RevisionOption;

    let revision_option = match options.position {
        StreamPosition::Start => RevisionOption::Start(Empty {}),
        StreamPosition::End => RevisionOption::End(Empty {}),
        StreamPosition::Revision(r) => RevisionOption::Revision(r),
    };
    let direction = match options.direction {
        ReadDirection::Forwards => read_req::ReadDirection::Forwards,
        ReadDirection::Backwards => read_req::ReadDirection::Backwards,
    };

    ReadReq {
        options: Some(read_req::Options {
            stream: Some(read_req::StreamOptions {
                stream_identifier: Some(StreamIdentifier::new(stream)),
                revision_option: Some(revision_option),
            }),
            read_direction: direction as i32,
            resolve_links: options.resolve_links,
            count: options.max_count,
        }),
    }
}

fn resolved_events(stream: &str, responses: Vec<ReadResp>) -> Result<Vec<ResolvedEvent>> {
    let mut events = Vec::with_capacity(responses.len());
    for response in responses {
        match response.content {
            Some(read_resp::Content::Event(read)) => events.push(ResolvedEvent {
                event: read.event.map(recorded_event).transpose()?,
                link: read.link.map(recorded_event).transpose()?,
            }),
            Some(read_resp::Content::StreamNotFound(_)) => {
                return Err(Error::StreamNotFound(stream.to_string()))
            }
            None => {}
        }
    }
    Ok(events)
}

fn recorded_event(mut event: read_resp::RecordedEvent) -> Result<RecordedEvent> {
    let id = match &event.id {
        Some(id) => id
            .as_u128()
            .map(Uuid::from_u128)
            .or_else(|| id.as_str().and_then(|s| Uuid::parse_str(s).ok()))
            .ok_or_else(|| Error::InvalidResponse("malformed event id".to_string()))?,
        None => return Err(Error::InvalidResponse("event without id".to_string())),
    };
    let stream_id = event
        .stream_identifier
        .as_ref()
        .map(StreamIdentifier::name)
        .unwrap_or_default();
    let event_type = event.metadata.remove(METADATA_TYPE).unwrap_or_default();
    let content_type = event
        .metadata
        .remove(METADATA_CONTENT_TYPE)
        .unwrap_or_default();

    Ok(RecordedEvent {
        id,
        stream_id,
        revision: event.stream_revision,
        position: Position {
            commit: event.commit_position,
            prepare: event.prepare_position,
        },
        event_type,
        content_type,
        metadata: event.metadata,
        custom_metadata: Bytes::from(event.custom_metadata),
        data: Bytes::from(event.data),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CONTENT_TYPE_JSON;
    use serde_json::json;

    #[test]
    fn test_append_frames_options_first() {
        let events = vec![
            EventData::json("order-placed", &json!({"id": 1})).unwrap(),
            EventData::binary("blob", vec![1u8, 2, 3]),
        ];
        let frames = append_frames("orders-1", ExpectedRevision::Exact(4), &events);

        assert_eq!(frames.len(), 3);
        match &frames[0].content {
            Some(append_req::Content::Options(options)) => {
                assert_eq!(
                    options.stream_identifier.as_ref().unwrap().name(),
                    "orders-1"
                );
                assert_eq!(
                    options.expected_stream_revision,
                    Some(append_req::options::ExpectedStreamRevision::Revision(4))
                );
            }
            other => panic!("expected options frame, got {:?}", other),
        }
        match &frames[1].content {
            Some(append_req::Content::ProposedMessage(message)) => {
                assert_eq!(message.metadata[METADATA_TYPE], "order-placed");
                assert_eq!(message.metadata[METADATA_CONTENT_TYPE], CONTENT_TYPE_JSON);
                assert_eq!(
                    message.id.as_ref().unwrap().as_str(),
                    Some(events[0].id.to_string().as_str())
                );
            }
            other => panic!("expected event frame, got {:?}", other),
        }
    }

    #[test]
    fn test_success_response() {
        let response = AppendResp {
            result: Some(append_resp::Result::Success(append_resp::Success {
                current_revision_option: Some(
                    append_resp::success::CurrentRevisionOption::CurrentRevision(7),
                ),
                position_option: Some(append_resp::success::PositionOption::Position(
                    chronicle_protocol::streams::Position {
                        commit_position: 100,
                        prepare_position: 90,
                    },
                )),
            })),
        };

        let result = write_result("s", response).unwrap();
        assert_eq!(result.next_expected_revision, CurrentRevision::Current(7));
        assert_eq!(
            result.position,
            Some(Position {
                commit: 100,
                prepare: 90
            })
        );
    }

    #[test]
    fn test_wrong_expected_version_response() {
        use append_resp::wrong_expected_version::{CurrentRevisionOption, ExpectedRevisionOption};

        let response = AppendResp {
            result: Some(append_resp::Result::WrongExpectedVersion(
                append_resp::WrongExpectedVersion {
                    current_revision_option: Some(CurrentRevisionOption::CurrentRevision(3)),
                    expected_revision_option: Some(ExpectedRevisionOption::ExpectedNoStream(
                        Empty {},
                    )),
                },
            )),
        };

        match write_result("orders-1", response) {
            Err(Error::WrongExpectedVersion {
                stream,
                expected,
                current,
            }) => {
                assert_eq!(stream, "orders-1");
                assert_eq!(expected, ExpectedRevision::NoStream);
                assert_eq!(current, CurrentRevision::Current(3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_append_response_is_invalid() {
        assert!(matches!(
            write_result("s", AppendResp { result: None }),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_read_request_backwards_from_end() {
        let options = ReadStreamOptions::default()
            .backwards()
            .position(StreamPosition::End)
            .max_count(10);
        let request = read_request("s", &options);
        let inner = request.options.unwrap();

        assert_eq!(inner.read_direction, read_req::ReadDirection::Backwards as i32);
        assert_eq!(inner.count, 10);
        assert_eq!(
            inner.stream.unwrap().revision_option,
            Some(read_req::stream_options::RevisionOption::End(Empty {}))
        );
    }

    fn wire_event(revision: u64) -> read_resp::RecordedEvent {
        let mut metadata = HashMap::new();
        metadata.insert(METADATA_TYPE.to_string(), "order-placed".to_string());
        metadata.insert(
            METADATA_CONTENT_TYPE.to_string(),
            CONTENT_TYPE_JSON.to_string(),
        );
        metadata.insert("created".to_string(), "1700000000".to_string());
        read_resp::RecordedEvent {
            id: Some(chronicle_protocol::Uuid::from_u128(revision as u128 + 1)),
            stream_identifier: Some(StreamIdentifier::new("orders-1")),
            stream_revision: revision,
            prepare_position: 10,
            commit_position: 11,
            metadata,
            custom_metadata: Vec::new(),
            data: br#"{"id":1}"#.to_vec(),
        }
    }

    #[test]
    fn test_resolved_events() {
        let responses = vec![
            ReadResp {
                content: Some(read_resp::Content::Event(read_resp::ReadEvent {
                    event: Some(wire_event(0)),
                    link: None,
                })),
            },
            ReadResp {
                content: Some(read_resp::Content::Event(read_resp::ReadEvent {
                    event: Some(wire_event(1)),
                    link: None,
                })),
            },
        ];

        let events = resolved_events("orders-1", responses).unwrap();
        assert_eq!(events.len(), 2);
        let first = events[0].get_event().unwrap();
        assert_eq!(first.stream_id, "orders-1");
        assert_eq!(first.event_type, "order-placed");
        assert!(first.is_json());
        assert_eq!(first.metadata.get("created").map(String::as_str), Some("1700000000"));
        assert!(!first.metadata.contains_key(METADATA_TYPE));
        assert_eq!(first.id, Uuid::from_u128(1));
        let payload: serde_json::Value = first.as_json().unwrap();
        assert_eq!(payload, json!({"id": 1}));
        assert_eq!(events[1].get_event().unwrap().revision, 1);
    }

    #[test]
    fn test_stream_not_found() {
        let responses = vec![ReadResp {
            content: Some(read_resp::Content::StreamNotFound(read_resp::StreamNotFound {
                stream_identifier: Some(StreamIdentifier::new("missing")),
            })),
        }];
        assert!(matches!(
            resolved_events("missing", responses),
            Err(Error::StreamNotFound(s)) if s == "missing"
        ));
    }

    #[test]
    fn test_event_without_id_rejected() {
        let mut event = wire_event(0);
        event.id = None;
        assert!(matches!(
            recorded_event(event),
            Err(Error::InvalidResponse(_))
        ));
    }
}
