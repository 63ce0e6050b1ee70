#![forbid(unsafe_code)]

//! MCP Streamable HTTP client transport.
//!
//! JSON-RPC messages are POSTed to a single endpoint; replies arrive as JSON
//! bodies or Server-Sent Events, server-initiated traffic arrives on an
//! optional GET event stream, and the session is bound together by the
//! `mcp-session-id` header. See [`transport`] for the task layout.

pub mod config;
pub mod errors;
pub mod models;
pub mod transport;

pub use config::TransportConfig;
pub use errors::{AppError, Result};
pub use models::{ErrorObject, ProtocolMessage, RequestId};
pub use transport::{Inbound, SessionState, SessionTerminator, StreamableHttpTransport};
