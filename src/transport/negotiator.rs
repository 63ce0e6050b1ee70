//! Session negotiation: header decoration, session capture, and expiry policy.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::warn;

use crate::config::TransportConfig;
use crate::models::{ProtocolMessage, RequestId};
use crate::{AppError, Result};

/// Header carrying the server-issued session id.
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Header used for SSE resumption. Exported for callers; resumption is not performed.
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// JSON body content type.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Server-Sent Events content type.
pub const CONTENT_TYPE_SSE: &str = "text/event-stream";

/// Code of the error synthesized when a request hits an expired session.
///
/// Positive, matching what existing MCP clients emit, not the standard `-32600`.
pub const SESSION_TERMINATED_CODE: i64 = 32600;

/// Message of the error synthesized when a request hits an expired session.
pub const SESSION_TERMINATED_MESSAGE: &str = "Session terminated";

/// What the dispatcher does after a 404 on a POST.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpiryAction {
    /// Clear the stale session id and resend the message once without it.
    Retry,
    /// Deliver this synthesized error response instead of retrying.
    Reply(ProtocolMessage),
    /// No reply channel exists for the message; drop it.
    Ignore,
}

/// Headers sent with every POST: `Accept`, `Content-Type`, and the configured extras.
///
/// # Errors
///
/// Returns `AppError::Config` if a configured header name or value is invalid.
pub fn base_headers(config: &TransportConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/event-stream"),
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));

    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| AppError::Config(format!("invalid header name {name}: {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| AppError::Config(format!("invalid value for header {name}: {err}")))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

/// Decorate `headers` with the session id when one is known.
pub fn attach(headers: &mut HeaderMap, session_id: Option<&str>) {
    let Some(session_id) = session_id else {
        return;
    };
    match HeaderValue::from_str(session_id) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(MCP_SESSION_ID_HEADER), value);
        }
        Err(err) => {
            warn!(%err, "session id is not a valid header value; sending without it");
        }
    }
}

/// Extract the session id a server issued on a successful `initialize` response.
#[must_use]
pub fn observe_init_response(headers: &HeaderMap) -> Option<String> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Whether `status` signals that the session no longer exists.
#[must_use]
pub fn is_expiry(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND
}

/// Decide how to recover from a 404 for `message`.
///
/// `had_session` is whether a session id was attached to the failed POST.
#[must_use]
pub fn expiry_action(message: &ProtocolMessage, had_session: bool) -> ExpiryAction {
    if message.is_initialize_request() && had_session {
        return ExpiryAction::Retry;
    }
    match message {
        ProtocolMessage::Request { id, .. } => ExpiryAction::Reply(session_terminated(id)),
        _ => ExpiryAction::Ignore,
    }
}

/// Error response delivered in place of a reply when the session has expired.
#[must_use]
pub fn session_terminated(id: &RequestId) -> ProtocolMessage {
    ProtocolMessage::error_response(
        id.clone(),
        SESSION_TERMINATED_CODE,
        SESSION_TERMINATED_MESSAGE,
    )
}
