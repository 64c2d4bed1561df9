//! Protocol Codec
//!
//! Wire format for the chat connection: one JSON object per text frame,
//! discriminated by a `type` field.
//!
//! # Frames
//!
//! ```text
//! client -> server   {"type":"auth","token":"..."}
//!                    {"type":"query","query":"..."}
//! server -> client   {"type":"processing","message":"..."}
//!                    {"type":"response","answer":"..."}
//!                    {"type":"error","message":"..."}
//! ```
//!
//! # Forward Compatibility
//!
//! Unknown `type` values decode to `Ok(None)` and are skipped by the
//! controller. Anything that is not a JSON object with a string `type`, or a
//! known frame missing its payload field, is a [`DecodeError`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Maximum accepted size of an incoming frame (1 MiB)
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Frames sent by the widget
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Authenticate the connection (first frame on every connection)
    Auth {
        /// Opaque token supplied by the embedding host
        token: String,
    },
    /// Ask a question
    Query {
        /// The user's text
        query: String,
    },
}

/// Frames sent by the backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Transient status while the answer is being prepared
    Processing {
        /// Status line to display
        message: String,
    },
    /// The complete answer
    Response {
        /// Full answer text
        answer: String,
    },
    /// Backend-reported failure for the current query
    Error {
        /// Error text, shown verbatim
        message: String,
    },
}

impl ServerFrame {
    /// Kind tag as it appears on the wire
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Processing { .. } => "processing",
            Self::Response { .. } => "response",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this frame ends the current query
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Response { .. } | Self::Error { .. })
    }

    /// Encode as a text frame (used by test servers and fakes)
    pub fn to_text(&self) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Incoming frame could not be interpreted
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not JSON
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    /// JSON value is not an object
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// Object has no string `type` field
    #[error("frame has no \"type\" discriminant")]
    MissingDiscriminant,

    /// Known frame kind without its payload field
    #[error("\"{kind}\" frame is missing string field \"{field}\"")]
    MissingField {
        /// Frame kind
        kind: &'static str,
        /// Name of the absent field
        field: &'static str,
    },

    /// Frame exceeds [`MAX_FRAME_BYTES`]
    #[error("frame of {size} bytes exceeds limit of {max} bytes")]
    TooLarge {
        /// Received size
        size: usize,
        /// Allowed size
        max: usize,
    },
}

/// Outgoing frame could not be serialized
#[derive(Debug, Error)]
#[error("failed to encode frame: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

impl ClientFrame {
    /// Encode as a text frame
    pub fn encode(&self) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Encode the per-connection auth frame
pub fn encode_auth(token: &str) -> Result<String, EncodeError> {
    ClientFrame::Auth {
        token: token.to_string(),
    }
    .encode()
}

/// Encode a query frame
pub fn encode_query(text: &str) -> Result<String, EncodeError> {
    ClientFrame::Query {
        query: text.to_string(),
    }
    .encode()
}

/// Decode one incoming text frame
///
/// Returns:
/// - `Ok(Some(frame))` for a known frame kind
/// - `Ok(None)` for a well-formed frame of an unknown kind
/// - `Err(DecodeError)` for anything unusable
pub fn decode(text: &str) -> Result<Option<ServerFrame>, DecodeError> {
    if text.len() > MAX_FRAME_BYTES {
        return Err(DecodeError::TooLarge {
            size: text.len(),
            max: MAX_FRAME_BYTES,
        });
    }

    let value: Value = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
    let Value::Object(object) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingDiscriminant)?;

    let frame = match kind {
        "processing" => ServerFrame::Processing {
            message: string_field(&object, "processing", "message")?,
        },
        "response" => ServerFrame::Response {
            answer: string_field(&object, "response", "answer")?,
        },
        "error" => ServerFrame::Error {
            message: string_field(&object, "error", "message")?,
        },
        other => {
            tracing::debug!(kind = %other, "Ignoring frame of unknown kind");
            return Ok(None);
        }
    };

    Ok(Some(frame))
}

fn string_field(
    object: &Map<String, Value>,
    kind: &'static str,
    field: &'static str,
) -> Result<String, DecodeError> {
    object
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(DecodeError::MissingField { kind, field })
}
