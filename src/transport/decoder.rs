//! Inbound decoder shared by POST responses and the server-push stream.
//!
//! Every payload the transport receives (a JSON body or the `data` of one
//! SSE `message` event) funnels through [`decode`], so both producers on the
//! inbound channel report malformed input identically.
//!
//! # Array tolerance
//!
//! Some servers wrap a single message in a JSON array. That is not valid
//! Streamable HTTP, and it is not JSON-RPC batching either: only element 0
//! is decoded and the remaining elements are ignored.

use serde_json::Value;
use tracing::debug;

use crate::models::ProtocolMessage;
use crate::{AppError, Result};

/// Decode one raw JSON payload into a [`ProtocolMessage`].
///
/// # Errors
///
/// - [`AppError::Decode`]`("malformed json: …")`: not valid JSON.
/// - [`AppError::Decode`]`("malformed payload: …")`: an empty array, an
///   array whose first element is not an object, or a scalar.
/// - [`AppError::Decode`]`("schema violation: …")`: an object that is not a
///   JSON-RPC 2.0 message.
pub fn decode(payload: &str) -> Result<ProtocolMessage> {
    let value: Value = serde_json::from_str(payload)?;
    decode_value(value)
}

/// Decode an already-parsed JSON value; see [`decode`].
///
/// # Errors
///
/// Same as [`decode`], minus the JSON syntax case.
pub fn decode_value(value: Value) -> Result<ProtocolMessage> {
    match value {
        Value::Object(object) => ProtocolMessage::from_object(object),
        Value::Array(items) => {
            let ignored = items.len().saturating_sub(1);
            match items.into_iter().next() {
                Some(Value::Object(object)) => {
                    debug!(ignored, "unwrapping array-wrapped message (non-standard server)");
                    ProtocolMessage::from_object(object)
                }
                Some(other) => Err(AppError::Decode(format!(
                    "malformed payload: array element 0 is {}, expected an object",
                    kind(&other)
                ))),
                None => Err(AppError::Decode("malformed payload: empty array".into())),
            }
        }
        other => Err(AppError::Decode(format!(
            "malformed payload: expected an object or an array, got {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
