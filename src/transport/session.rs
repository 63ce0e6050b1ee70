//! Session id cell shared by the transport tasks.

use std::sync::{Arc, PoisonError, RwLock};

/// Current `mcp-session-id`, if the server has issued one.
///
/// The dispatcher is the only writer. Readers take owned snapshots, so no
/// lock is ever held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    cell: Arc<RwLock<Option<String>>>,
}

impl SessionState {
    /// Create a cell holding `initial`.
    #[must_use]
    pub fn new(initial: Option<String>) -> Self {
        Self {
            cell: Arc::new(RwLock::new(initial)),
        }
    }

    /// Owned copy of the current session id.
    #[must_use]
    pub fn snapshot(&self) -> Option<String> {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set(&self, session_id: String) {
        *self.cell.write().unwrap_or_else(PoisonError::into_inner) = Some(session_id);
    }

    pub(crate) fn clear(&self) -> Option<String> {
        self.cell
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
