//! Streams service messages

use crate::{Empty, StreamIdentifier, Uuid};
use std::collections::HashMap;

// ============================================================================
// Append
// ============================================================================

/// One frame of a client-streaming append: options first, then events
#[derive(Clone, PartialEq, prost::Message)]
pub struct AppendReq {
    #[prost(oneof = "append_req::Content", tags = "1, 2")]
    pub content: Option<append_req::Content>,
}

pub mod append_req {
    use super::*;

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Options {
        #[prost(message, optional, tag = "1")]
        pub stream_identifier: Option<StreamIdentifier>,
        #[prost(oneof = "options::ExpectedStreamRevision", tags = "2, 3, 4, 5")]
        pub expected_stream_revision: Option<options::ExpectedStreamRevision>,
    }

    pub mod options {
        use super::Empty;

        #[derive(Clone, Copy, PartialEq, prost::Oneof)]
        pub enum ExpectedStreamRevision {
            #[prost(uint64, tag = "2")]
            Revision(u64),
            #[prost(message, tag = "3")]
            NoStream(Empty),
            #[prost(message, tag = "4")]
            Any(Empty),
            #[prost(message, tag = "5")]
            StreamExists(Empty),
        }
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ProposedMessage {
        #[prost(message, optional, tag = "1")]
        pub id: Option<Uuid>,
        /// System metadata (`type`, `content-type`)
        #[prost(map = "string, string", tag = "2")]
        pub metadata: HashMap<String, String>,
        #[prost(bytes = "vec", tag = "3")]
        pub custom_metadata: Vec<u8>,
        #[prost(bytes = "vec", tag = "4")]
        pub data: Vec<u8>,
    }

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Content {
        #[prost(message, tag = "1")]
        Options(Options),
        #[prost(message, tag = "2")]
        ProposedMessage(ProposedMessage),
    }
}

/// Global log position of a committed write
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Position {
    #[prost(uint64, tag = "1")]
    pub commit_position: u64,
    #[prost(uint64, tag = "2")]
    pub prepare_position: u64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppendResp {
    #[prost(oneof = "append_resp::Result", tags = "1, 2")]
    pub result: Option<append_resp::Result>,
}

pub mod append_resp {
    use super::{Empty, Position};

    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct Success {
        #[prost(oneof = "success::CurrentRevisionOption", tags = "1, 2")]
        pub current_revision_option: Option<success::CurrentRevisionOption>,
        #[prost(oneof = "success::PositionOption", tags = "3, 4")]
        pub position_option: Option<success::PositionOption>,
    }

    pub mod success {
        use super::{Empty, Position};

        #[derive(Clone, Copy, PartialEq, prost::Oneof)]
        pub enum CurrentRevisionOption {
            #[prost(uint64, tag = "1")]
            CurrentRevision(u64),
            #[prost(message, tag = "2")]
            NoStream(Empty),
        }

        #[derive(Clone, Copy, PartialEq, prost::Oneof)]
        pub enum PositionOption {
            #[prost(message, tag = "3")]
            Position(Position),
            #[prost(message, tag = "4")]
            NoPosition(Empty),
        }
    }

    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct WrongExpectedVersion {
        #[prost(oneof = "wrong_expected_version::CurrentRevisionOption", tags = "1, 2")]
        pub current_revision_option: Option<wrong_expected_version::CurrentRevisionOption>,
        #[prost(
            oneof = "wrong_expected_version::ExpectedRevisionOption",
            tags = "3, 4, 5, 6"
        )]
        pub expected_revision_option: Option<wrong_expected_version::ExpectedRevisionOption>,
    }

    pub mod wrong_expected_version {
        use super::Empty;

        #[derive(Clone, Copy, PartialEq, prost::Oneof)]
        pub enum CurrentRevisionOption {
            #[prost(uint64, tag = "1")]
            CurrentRevision(u64),
            #[prost(message, tag = "2")]
            CurrentNoStream(Empty),
        }

        #[derive(Clone, Copy, PartialEq, prost::Oneof)]
        pub enum ExpectedRevisionOption {
            #[prost(uint64, tag = "3")]
            ExpectedRevision(u64),
            #[prost(message, tag = "4")]
            ExpectedAny(Empty),
            #[prost(message, tag = "5")]
            ExpectedStreamExists(Empty),
            #[prost(message, tag = "6")]
            ExpectedNoStream(Empty),
        }
    }

    #[derive(Clone, Copy, PartialEq, prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "1")]
        Success(Success),
        #[prost(message, tag = "2")]
        WrongExpectedVersion(WrongExpectedVersion),
    }
}

// ============================================================================
// Read
// ============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct ReadReq {
    #[prost(message, optional, tag = "1")]
    pub options: Option<read_req::Options>,
}

pub mod read_req {
    use super::{Empty, StreamIdentifier};

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Options {
        #[prost(message, optional, tag = "1")]
        pub stream: Option<StreamOptions>,
        #[prost(enumeration = "ReadDirection", tag = "3")]
        pub read_direction: i32,
        #[prost(bool, tag = "4")]
        pub resolve_links: bool,
        #[prost(uint64, tag = "5")]
        pub count: u64,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct StreamOptions {
        #[prost(message, optional, tag = "1")]
        pub stream_identifier: Option<StreamIdentifier>,
        #[prost(oneof = "stream_options::RevisionOption", tags = "2, 3, 4")]
        pub revision_option: Option<stream_options::RevisionOption>,
    }

    pub mod stream_options {
        use super::Empty;

        #[derive(Clone, Copy, PartialEq, prost::Oneof)]
        pub enum RevisionOption {
            #[prost(uint64, tag = "2")]
            Revision(u64),
            #[prost(message, tag = "3")]
            Start(Empty),
            #[prost(message, tag = "4")]
            End(Empty),
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum ReadDirection {
        Forwards = 0,
        Backwards = 1,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ReadResp {
    #[prost(oneof = "read_resp::Content", tags = "1, 2")]
    pub content: Option<read_resp::Content>,
}

pub mod read_resp {
    use super::{StreamIdentifier, Uuid};
    use std::collections::HashMap;

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReadEvent {
        #[prost(message, optional, tag = "1")]
        pub event: Option<RecordedEvent>,
        /// Present when the event was reached through a link
        #[prost(message, optional, tag = "2")]
        pub link: Option<RecordedEvent>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct RecordedEvent {
        #[prost(message, optional, tag = "1")]
        pub id: Option<Uuid>,
        #[prost(message, optional, tag = "2")]
        pub stream_identifier: Option<StreamIdentifier>,
        #[prost(uint64, tag = "3")]
        pub stream_revision: u64,
        #[prost(uint64, tag = "4")]
        pub prepare_position: u64,
        #[prost(uint64, tag = "5")]
        pub commit_position: u64,
        #[prost(map = "string, string", tag = "6")]
        pub metadata: HashMap<String, String>,
        #[prost(bytes = "vec", tag = "7")]
        pub custom_metadata: Vec<u8>,
        #[prost(bytes = "vec", tag = "8")]
        pub data: Vec<u8>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct StreamNotFound {
        #[prost(message, optional, tag = "1")]
        pub stream_identifier: Option<StreamIdentifier>,
    }

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Content {
        #[prost(message, tag = "1")]
        Event(ReadEvent),
        #[prost(message, tag = "2")]
        StreamNotFound(StreamNotFound),
    }
}
