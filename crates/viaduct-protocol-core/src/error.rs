use crate::codec::CodecError;
use crate::value::Shape;
use thiserror::Error;

/// Failures that abort translation of a single packet.
///
/// Recoverable conditions (shape mismatches on write, metadata for unknown
/// entities) are logged where they happen and never surface here.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// Malformed bytes for a codec.
    #[error("Failed to read {codec} in packet {} at byte {offset}: {source} (output: {output})", fmt_id(.packet_id))]
    Decode {
        codec: &'static str,
        packet_id: Option<i32>,
        offset: usize,
        output: String,
        #[source]
        source: CodecError,
    },

    /// `get`/`set` asked for a codec + index that was never written.
    #[error("Could not find {codec} at index {index} in packet {} (output: {output})", fmt_id(.packet_id))]
    FieldLookup {
        codec: &'static str,
        index: usize,
        packet_id: Option<i32>,
        output: String,
    },

    /// The next queued input value was written under a different codec.
    #[error("Unable to read {expected}, found {found} in packet {} (output: {output})", fmt_id(.packet_id))]
    ReadMismatch {
        expected: &'static str,
        found: &'static str,
        packet_id: Option<i32>,
        output: String,
    },

    /// A stored value does not have the shape its codec reads as.
    #[error("{codec} at index {index} in packet {} holds a {found} value", fmt_id(.packet_id))]
    WrongShape {
        codec: &'static str,
        index: usize,
        found: Shape,
        packet_id: Option<i32>,
    },

    /// A field failed to serialize.
    #[error("Failed to write field {index} ({codec}) of packet {}: {source}", fmt_id(.packet_id))]
    Encode {
        index: usize,
        codec: &'static str,
        packet_id: Option<i32>,
        #[source]
        source: CodecError,
    },

    /// A read reached the raw payload of a packet that was built from scratch.
    #[error("Packet {} has no input buffer to read {codec} from", fmt_id(.packet_id))]
    NoInput {
        codec: &'static str,
        packet_id: Option<i32>,
    },

    /// A rewrite rule rejected the packet contents.
    #[error("Rule for packet {} failed: {message}", fmt_id(.packet_id))]
    Rule {
        packet_id: Option<i32>,
        message: String,
    },
}

impl TranslateError {
    pub fn rule(packet_id: Option<i32>, message: impl Into<String>) -> Self {
        TranslateError::Rule {
            packet_id,
            message: message.into(),
        }
    }

    pub fn packet_id(&self) -> Option<i32> {
        match self {
            TranslateError::Decode { packet_id, .. }
            | TranslateError::FieldLookup { packet_id, .. }
            | TranslateError::ReadMismatch { packet_id, .. }
            | TranslateError::WrongShape { packet_id, .. }
            | TranslateError::Encode { packet_id, .. }
            | TranslateError::NoInput { packet_id, .. }
            | TranslateError::Rule { packet_id, .. } => *packet_id,
        }
    }
}

pub type TranslateResult<T> = Result<T, TranslateError>;

fn fmt_id(id: &Option<i32>) -> String {
    match id {
        Some(id) => format!("0x{:02X}", id),
        None => "<none>".to_string(),
    }
}
