//! MCP initialization handshake.
//!
//! Before a session is usable the client performs the lifecycle exchange:
//!
//! 1. **`initialize`**: a request carrying the protocol version and
//!    `clientInfo`; the server's reply may carry `mcp-session-id`, which
//!    the dispatcher captures.
//! 2. **`notifications/initialized`**: sent once the reply arrives; the
//!    dispatcher opens the server-push stream right after posting it.
//!
//! Inbound traffic that is not the `initialize` reply is skipped while
//! waiting. Call this before handing the transport to other consumers.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::time;
use tracing::{debug, info};
use uuid::Uuid;

use super::StreamableHttpTransport;
use crate::models::message::{METHOD_INITIALIZE, METHOD_INITIALIZED};
use crate::models::{ProtocolMessage, RequestId};
use crate::{AppError, Result};

/// Protocol revision announced in `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Run the lifecycle exchange and return the server's `initialize` result.
///
/// # Errors
///
/// - `AppError::Mcp` if the server answers `initialize` with an error.
/// - `AppError::Transport` if no reply arrives within `wait`, the
///   dispatcher has stopped, or the exchange itself failed.
/// - `AppError::Decode` if the reply could not be decoded.
pub async fn initialize(
    transport: &mut StreamableHttpTransport,
    client_name: &str,
    client_version: &str,
    wait: Duration,
) -> Result<Value> {
    let id = RequestId::String(Uuid::new_v4().to_string());
    let params = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": client_name,
            "version": client_version
        }
    });

    transport
        .send(ProtocolMessage::request(id.clone(), METHOD_INITIALIZE, Some(params)))
        .await?;

    let result = time::timeout(wait, wait_for_reply(transport, &id))
        .await
        .map_err(|_| {
            AppError::Transport(format!(
                "no initialize response within {}s",
                wait.as_secs()
            ))
        })??;

    transport
        .send(ProtocolMessage::notification(METHOD_INITIALIZED, None))
        .await?;

    info!(session_id = ?transport.session_id(), "mcp session initialized");
    Ok(result)
}

async fn wait_for_reply(transport: &mut StreamableHttpTransport, id: &RequestId) -> Result<Value> {
    while let Some(item) = transport.recv().await {
        match item? {
            ProtocolMessage::Response { id: reply_id, result } if reply_id == *id => {
                return Ok(result);
            }
            ProtocolMessage::ErrorResponse { id: reply_id, error } if reply_id == *id => {
                return Err(AppError::Mcp(format!(
                    "initialize rejected ({}): {}",
                    error.code, error.message
                )));
            }
            other => {
                debug!(?other, "skipping message received before initialize response");
            }
        }
    }

    Err(AppError::Transport(
        "inbound channel closed before initialize response".into(),
    ))
}
