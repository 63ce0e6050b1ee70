//! Server-push listener task.
//!
//! Holds a `GET` event stream open for server-initiated requests and
//! notifications. The stream is optional in Streamable HTTP: a refused GET,
//! a dropped connection, or an idle timeout ends the listener quietly and
//! never affects the dispatcher or the session.

use reqwest::header::{HeaderValue, ACCEPT};
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use super::negotiator::{self, CONTENT_TYPE_SSE};
use super::sse::SseFrames;
use super::{decoder, HttpContext, Inbound, SessionState};
use crate::{AppError, Result};

/// Everything needed to start the listener once the handshake completes.
pub(crate) struct ListenerLauncher {
    pub(crate) http: HttpContext,
    pub(crate) session: SessionState,
    pub(crate) inbound_tx: mpsc::Sender<Inbound>,
    pub(crate) cancel: CancellationToken,
    pub(crate) tasks: TaskTracker,
}

impl ListenerLauncher {
    /// Spawn the listener, or do nothing when no session id has been issued.
    pub(crate) fn launch(self) {
        let Some(session_id) = self.session.snapshot() else {
            debug!("no session id; server push stream not opened");
            return;
        };

        self.tasks.spawn(run_listener(
            self.http,
            session_id,
            self.inbound_tx,
            self.cancel,
        ));
    }
}

async fn run_listener(
    http: HttpContext,
    session_id: String,
    inbound_tx: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) {
    tokio::select! {
        biased;

        () = cancel.cancelled() => {
            debug!("listener: cancellation received, stopping");
        }

        outcome = listen(&http, &session_id, &inbound_tx) => match outcome {
            Ok(()) => debug!("server push stream ended"),
            Err(err) => debug!(%err, "server push stream error (non-fatal)"),
        },
    }
}

async fn listen(
    http: &HttpContext,
    session_id: &str,
    inbound_tx: &mpsc::Sender<Inbound>,
) -> Result<()> {
    let mut headers = http.headers.clone();
    headers.insert(ACCEPT, HeaderValue::from_static(CONTENT_TYPE_SSE));
    negotiator::attach(&mut headers, Some(session_id));

    let request = http
        .client
        .get(http.endpoint.clone())
        .headers(headers)
        .send();
    let response = time::timeout(http.timeout, request)
        .await
        .map_err(|_| AppError::Transport("server push GET timed out".into()))??;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Transport(format!(
            "server push GET refused with status {status}"
        )));
    }
    debug!(session_id, "server push stream established");

    let mut frames = SseFrames::from_response(response, http.sse_read_timeout);
    while let Some(frame) = frames.next_frame().await {
        let frame = frame?;
        if !frame.is_message() {
            debug!(event = %frame.event, "dropping non-message event from server push stream");
            continue;
        }

        debug!(event_id = %frame.id, data = %frame.data, "received server push message");
        if inbound_tx.send(decoder::decode(&frame.data)).await.is_err() {
            debug!("inbound channel closed, stopping server push stream");
            break;
        }
    }

    Ok(())
}
