//! JSON-RPC 2.0 message model carried by the transport.
//!
//! [`ProtocolMessage`] is the unit on both the outbound queue and the
//! inbound channel. Construction from untrusted JSON goes through
//! [`ProtocolMessage::from_object`], which enforces the request,
//! notification, response and error shapes.

use std::fmt::{Display, Formatter};

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{AppError, Result};

/// Protocol version string every message must carry.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of the lifecycle request that opens a session.
pub const METHOD_INITIALIZE: &str = "initialize";

/// Method name of the notification that completes the handshake.
pub const METHOD_INITIALIZED: &str = "notifications/initialized";

/// JSON-RPC request identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer identifier.
    Number(i64),
    /// String identifier.
    String(String),
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Error member of a JSON-RPC error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Numeric error code.
    pub code: i64,
    /// Short human-readable description.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// One JSON-RPC 2.0 message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolMessage {
    /// A call expecting a response correlated by `id`.
    Request {
        /// Correlation identifier.
        id: RequestId,
        /// Method name.
        method: String,
        /// Structured parameters (object or array).
        params: Option<Value>,
    },
    /// A one-way message; no reply is ever produced.
    Notification {
        /// Method name.
        method: String,
        /// Structured parameters (object or array).
        params: Option<Value>,
    },
    /// Successful reply to a request.
    Response {
        /// Identifier of the request being answered.
        id: RequestId,
        /// Method-specific result payload.
        result: Value,
    },
    /// Failed reply to a request.
    ErrorResponse {
        /// Identifier of the request being answered.
        id: RequestId,
        /// Error detail.
        error: ErrorObject,
    },
}

impl ProtocolMessage {
    /// Build a request.
    #[must_use]
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Build a notification.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification {
            method: method.into(),
            params,
        }
    }

    /// Build a successful response.
    #[must_use]
    pub fn response(id: impl Into<RequestId>, result: Value) -> Self {
        Self::Response {
            id: id.into(),
            result,
        }
    }

    /// Build an error response without structured data.
    #[must_use]
    pub fn error_response(id: impl Into<RequestId>, code: i64, message: impl Into<String>) -> Self {
        Self::ErrorResponse {
            id: id.into(),
            error: ErrorObject {
                code,
                message: message.into(),
                data: None,
            },
        }
    }

    /// Correlation identifier, absent for notifications.
    #[must_use]
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request { id, .. } | Self::Response { id, .. } | Self::ErrorResponse { id, .. } => {
                Some(id)
            }
            Self::Notification { .. } => None,
        }
    }

    /// Method name, absent for responses.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Notification { method, .. } => Some(method),
            Self::Response { .. } | Self::ErrorResponse { .. } => None,
        }
    }

    /// Whether this message is a request (and so expects a reply).
    #[must_use]
    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request { .. })
    }

    /// Whether this message is the `initialize` request.
    #[must_use]
    pub fn is_initialize_request(&self) -> bool {
        matches!(self, Self::Request { method, .. } if method == METHOD_INITIALIZE)
    }

    /// Whether this message is the `notifications/initialized` notification.
    #[must_use]
    pub fn is_initialized_notification(&self) -> bool {
        matches!(self, Self::Notification { method, .. } if method == METHOD_INITIALIZED)
    }

    /// Validate a decoded JSON object against the JSON-RPC 2.0 shapes.
    ///
    /// Unknown members are ignored. A `params` of `null` is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Decode("schema violation: …")` when the object is
    /// not a well-formed request, notification, response, or error response.
    pub fn from_object(mut object: Map<String, Value>) -> Result<Self> {
        match object.get("jsonrpc") {
            Some(Value::String(version)) if version == JSONRPC_VERSION => {}
            _ => return Err(schema_violation("jsonrpc must be \"2.0\"")),
        }

        let id = object
            .remove("id")
            .map(|raw| {
                RequestId::deserialize(&raw)
                    .map_err(|_| schema_violation("id must be a string or an integer"))
            })
            .transpose()?;

        if let Some(method) = object.remove("method") {
            let Value::String(method) = method else {
                return Err(schema_violation("method must be a string"));
            };
            if object.contains_key("result") || object.contains_key("error") {
                return Err(schema_violation("a request must not carry result or error"));
            }
            let params = match object.remove("params") {
                None | Some(Value::Null) => None,
                Some(params @ (Value::Object(_) | Value::Array(_))) => Some(params),
                Some(_) => return Err(schema_violation("params must be an object or an array")),
            };
            return Ok(match id {
                Some(id) => Self::Request { id, method, params },
                None => Self::Notification { method, params },
            });
        }

        let id = id.ok_or_else(|| schema_violation("response is missing id"))?;
        match (object.remove("result"), object.remove("error")) {
            (Some(result), None) => Ok(Self::Response { id, result }),
            (None, Some(error)) => {
                let error = ErrorObject::deserialize(&error)
                    .map_err(|err| schema_violation(&format!("invalid error object: {err}")))?;
                Ok(Self::ErrorResponse { id, error })
            }
            (Some(_), Some(_)) => Err(schema_violation("response carries both result and error")),
            (None, None) => Err(schema_violation("object has neither method, result nor error")),
        }
    }
}

fn schema_violation(detail: &str) -> AppError {
    AppError::Decode(format!("schema violation: {detail}"))
}

impl Serialize for ProtocolMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        match self {
            Self::Request { id, method, params } => {
                map.serialize_entry("id", id)?;
                map.serialize_entry("method", method)?;
                if let Some(params) = params {
                    map.serialize_entry("params", params)?;
                }
            }
            Self::Notification { method, params } => {
                map.serialize_entry("method", method)?;
                if let Some(params) = params {
                    map.serialize_entry("params", params)?;
                }
            }
            Self::Response { id, result } => {
                map.serialize_entry("id", id)?;
                map.serialize_entry("result", result)?;
            }
            Self::ErrorResponse { id, error } => {
                map.serialize_entry("id", id)?;
                map.serialize_entry("error", error)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ProtocolMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Object(object) => Self::from_object(object).map_err(D::Error::custom),
            _ => Err(D::Error::custom("expected a JSON-RPC message object")),
        }
    }
}
