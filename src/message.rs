//! Protocol messages: one tagged JSON object per input line.

use serde::Deserialize;
use serde_json::Value;

use crate::error::TargetError;

/// A single protocol message.
///
/// The variant set is closed: adding a message kind is a compile-time
/// checked change because every dispatch site matches exhaustively.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Declares (or re-declares) the schema and key properties of a stream.
    #[serde(rename = "SCHEMA")]
    Schema {
        stream: String,
        schema: Value,
        key_properties: Vec<String>,
    },

    /// One data record for a previously declared stream.
    #[serde(rename = "RECORD")]
    Record { stream: String, record: Value },

    /// A checkpoint bookmark mapping, echoed back at the end of the run.
    #[serde(rename = "STATE")]
    State { value: Value },

    /// Reserved for version-cutover semantics; currently acknowledged only.
    #[serde(rename = "ACTIVATE_VERSION")]
    ActivateVersion {
        stream: String,
        #[serde(default)]
        version: Option<i64>,
    },
}

impl Message {
    /// Parse one input line into a message.
    ///
    /// Goes through simd-json's serde bridge, the same fast path the rest of
    /// the line parsing uses. Any failure (malformed JSON, missing `type`,
    /// unknown message kind, missing required fields) is a fatal parse error
    /// carrying the offending line.
    pub fn parse(line: &str) -> Result<Self, TargetError> {
        let mut bytes = line.as_bytes().to_vec();
        simd_json::serde::from_slice(&mut bytes).map_err(|e| TargetError::Parse {
            reason: e.to_string(),
            line: line.trim_end().to_string(),
        })
    }
}
