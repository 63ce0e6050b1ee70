//! Domain model module declarations.

pub mod message;

pub use message::{ErrorObject, ProtocolMessage, RequestId};
