//! Best-effort session termination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::StatusCode;
use tokio::time;
use tracing::{debug, info, warn};

use super::{negotiator, HttpContext, SessionState};

/// Sends `DELETE` for the current session.
///
/// Cloneable so the session can be torn down from a shutdown hook while
/// another task owns the transport.
#[derive(Debug, Clone)]
pub struct SessionTerminator {
    http: HttpContext,
    session: SessionState,
    attempted: Arc<AtomicBool>,
}

impl SessionTerminator {
    pub(crate) fn new(http: HttpContext, session: SessionState) -> Self {
        Self {
            http,
            session,
            attempted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ask the server to drop the session.
    ///
    /// No request is made when no session id is held, or when a `DELETE`
    /// was already attempted. A `405` means the server does not allow
    /// client-initiated termination. Every failure is logged and swallowed.
    pub async fn terminate(&self) {
        let Some(session_id) = self.session.snapshot() else {
            debug!("no session to terminate");
            return;
        };

        if self.attempted.swap(true, Ordering::SeqCst) {
            debug!(%session_id, "session termination already attempted");
            return;
        }

        let mut headers = self.http.headers.clone();
        negotiator::attach(&mut headers, Some(&session_id));

        let request = self
            .http
            .client
            .delete(self.http.endpoint.clone())
            .headers(headers)
            .send();

        match time::timeout(self.http.timeout, request).await {
            Ok(Ok(response)) => match response.status() {
                StatusCode::OK => info!(%session_id, "session terminated"),
                StatusCode::METHOD_NOT_ALLOWED => {
                    debug!(%session_id, "server does not allow session termination");
                }
                status => warn!(%session_id, %status, "session termination failed"),
            },
            Ok(Err(err)) => warn!(%session_id, %err, "session termination failed"),
            Err(_) => warn!(%session_id, "session termination timed out"),
        }
    }
}
