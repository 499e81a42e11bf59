//! Messages shared by every service

/// Placeholder message for requests and oneof arms without payload
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Empty {}

/// Identifier of a stream (raw UTF-8 bytes on the wire)
#[derive(Clone, PartialEq, prost::Message)]
pub struct StreamIdentifier {
    #[prost(bytes = "vec", tag = "3")]
    pub stream_name: Vec<u8>,
}

impl StreamIdentifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            stream_name: name.into().into_bytes(),
        }
    }

    /// Stream name, replacing invalid UTF-8 sequences
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.stream_name).into_owned()
    }
}

/// A 128-bit identifier, either as two signed halves or as text
#[derive(Clone, PartialEq, prost::Message)]
pub struct Uuid {
    #[prost(oneof = "uuid_value::Value", tags = "1, 2")]
    pub value: Option<uuid_value::Value>,
}

pub mod uuid_value {
    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct Structured {
        #[prost(int64, tag = "1")]
        pub most_significant_bits: i64,
        #[prost(int64, tag = "2")]
        pub least_significant_bits: i64,
    }

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        #[prost(message, tag = "1")]
        Structured(Structured),
        #[prost(string, tag = "2")]
        String(String),
    }
}

impl Uuid {
    /// Structured form of a 128-bit value
    pub fn from_u128(value: u128) -> Self {
        Self {
            value: Some(uuid_value::Value::Structured(uuid_value::Structured {
                most_significant_bits: (value >> 64) as u64 as i64,
                least_significant_bits: value as u64 as i64,
            })),
        }
    }

    /// Textual form
    pub fn from_string(value: impl Into<String>) -> Self {
        Self {
            value: Some(uuid_value::Value::String(value.into())),
        }
    }

    /// The 128-bit value when sent in structured form
    pub fn as_u128(&self) -> Option<u128> {
        match &self.value {
            Some(uuid_value::Value::Structured(s)) => Some(
                ((s.most_significant_bits as u64 as u128) << 64)
                    | (s.least_significant_bits as u64 as u128),
            ),
            _ => None,
        }
    }

    /// The text when sent in string form
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Some(uuid_value::Value::String(s)) => Some(s),
            _ => None,
        }
    }
}
