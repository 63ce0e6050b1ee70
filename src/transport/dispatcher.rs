//! Outbound dispatcher task.
//!
//! Takes one message at a time from the outbound queue, POSTs it, and turns
//! the HTTP response into zero or more inbound items. Failures of a single
//! exchange are delivered as errors and the loop moves on to the next
//! message; the loop itself only stops on cancellation, when the outbound
//! queue closes, or when the caller has dropped the inbound receiver.
//!
//! # Response handling
//!
//! | Status / content type     | Delivered                                  |
//! |---------------------------|--------------------------------------------|
//! | `202`                     | nothing                                    |
//! | `404`                     | see [`negotiator::expiry_action`]          |
//! | other non-2xx             | `AppError::Transport`                      |
//! | 2xx `application/json`    | one decoded message or `AppError::Decode`  |
//! | 2xx `text/event-stream`   | one item per `message` event               |
//! | 2xx anything else         | `AppError::Transport`                      |

use std::ops::ControlFlow;

use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::listener::ListenerLauncher;
use super::negotiator::{self, ExpiryAction, CONTENT_TYPE_JSON, CONTENT_TYPE_SSE};
use super::sse::SseFrames;
use super::{decoder, HttpContext, Inbound, SessionState};
use crate::models::ProtocolMessage;
use crate::{AppError, Result};

pub(crate) struct Dispatcher {
    http: HttpContext,
    session: SessionState,
    inbound_tx: mpsc::Sender<Inbound>,
    listener: Option<ListenerLauncher>,
}

impl Dispatcher {
    pub(crate) fn new(
        http: HttpContext,
        session: SessionState,
        inbound_tx: mpsc::Sender<Inbound>,
        listener: ListenerLauncher,
    ) -> Self {
        Self {
            http,
            session,
            inbound_tx,
            listener: Some(listener),
        }
    }

    /// Drain `outbound_rx` until cancellation, queue closure, or inbound closure.
    pub(crate) async fn run(
        mut self,
        mut outbound_rx: mpsc::Receiver<ProtocolMessage>,
        cancel: CancellationToken,
    ) {
        loop {
            let message = tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!("dispatcher: cancellation received, stopping");
                    break;
                }

                message = outbound_rx.recv() => message,
            };

            let Some(message) = message else {
                debug!("dispatcher: outbound queue closed, stopping");
                break;
            };

            let flow = tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!("dispatcher: cancelled mid-exchange, stopping");
                    break;
                }

                flow = self.dispatch(message) => flow,
            };

            if flow.is_break() {
                debug!("dispatcher: inbound channel closed, stopping");
                break;
            }
        }
    }

    async fn dispatch(&mut self, message: ProtocolMessage) -> ControlFlow<()> {
        debug!(method = ?message.method(), id = ?message.id(), "sending client message");

        let flow = self.exchange(&message).await;

        if message.is_initialized_notification() {
            if let Some(listener) = self.listener.take() {
                listener.launch();
            }
        }

        flow
    }

    async fn exchange(&self, message: &ProtocolMessage) -> ControlFlow<()> {
        let session_id = self.session.snapshot();

        let response = match self.post(message, session_id.as_deref()).await {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "POST failed");
                return self.deliver(Err(err)).await;
            }
        };

        if !negotiator::is_expiry(response.status()) {
            return self.handle_response(message, response).await;
        }

        match negotiator::expiry_action(message, session_id.is_some()) {
            ExpiryAction::Retry => {
                let stale = self.session.clear();
                info!(stale_session_id = ?stale, "session expired, retrying initialize without session id");
                match self.post(message, None).await {
                    Ok(response) => self.handle_response(message, response).await,
                    Err(err) => {
                        warn!(%err, "initialize retry failed");
                        self.deliver(Err(err)).await
                    }
                }
            }
            ExpiryAction::Reply(reply) => {
                info!(id = ?message.id(), "session expired; request reported as terminated");
                self.deliver(Ok(reply)).await
            }
            ExpiryAction::Ignore => {
                debug!(method = ?message.method(), "session expired; message dropped without reply");
                ControlFlow::Continue(())
            }
        }
    }

    async fn post(
        &self,
        message: &ProtocolMessage,
        session_id: Option<&str>,
    ) -> Result<reqwest::Response> {
        let mut headers = self.http.headers.clone();
        negotiator::attach(&mut headers, session_id);

        let request = self
            .http
            .client
            .post(self.http.endpoint.clone())
            .headers(headers)
            .json(message)
            .send();

        match time::timeout(self.http.timeout, request).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(AppError::Transport(format!(
                "POST timed out after {}s",
                self.http.timeout.as_secs()
            ))),
        }
    }

    async fn handle_response(
        &self,
        message: &ProtocolMessage,
        response: reqwest::Response,
    ) -> ControlFlow<()> {
        let status = response.status();

        if status == StatusCode::ACCEPTED {
            debug!("received 202 accepted");
            return ControlFlow::Continue(());
        }

        if !status.is_success() {
            warn!(%status, method = ?message.method(), "unexpected http status");
            return self
                .deliver(Err(AppError::Transport(format!("unexpected http status {status}"))))
                .await;
        }

        if message.is_initialize_request() {
            if let Some(session_id) = negotiator::observe_init_response(response.headers()) {
                info!(%session_id, "received session id");
                self.session.set(session_id);
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with(CONTENT_TYPE_JSON) {
            self.read_json(response).await
        } else if content_type.starts_with(CONTENT_TYPE_SSE) {
            self.read_event_stream(response).await
        } else {
            warn!(%content_type, "unexpected content type");
            self.deliver(Err(AppError::Transport(format!(
                "unexpected content type: {content_type:?}"
            ))))
            .await
        }
    }

    async fn read_json(&self, response: reqwest::Response) -> ControlFlow<()> {
        let body = match time::timeout(self.http.timeout, response.text()).await {
            Ok(Ok(body)) => body,
            Ok(Err(err)) => return self.deliver(Err(AppError::from(err))).await,
            Err(_) => {
                return self
                    .deliver(Err(AppError::Transport(
                        "timed out reading response body".into(),
                    )))
                    .await;
            }
        };

        debug!(%body, "received json response");
        let decoded = decoder::decode(&body);
        if let Err(err) = &decoded {
            warn!(%err, "error parsing json response");
        }
        self.deliver(decoded).await
    }

    async fn read_event_stream(&self, response: reqwest::Response) -> ControlFlow<()> {
        let mut frames = SseFrames::from_response(response, self.http.timeout);

        while let Some(frame) = frames.next_frame().await {
            match frame {
                Ok(frame) if frame.is_message() => {
                    debug!(data = %frame.data, "received sse message");
                    let decoded = decoder::decode(&frame.data);
                    if let Err(err) = &decoded {
                        warn!(%err, "error parsing sse message");
                    }
                    if self.deliver(decoded).await.is_break() {
                        return ControlFlow::Break(());
                    }
                }
                Ok(frame) => {
                    warn!(event = %frame.event, "unknown sse event");
                }
                Err(err) => {
                    warn!(%err, "error reading sse stream");
                    return self.deliver(Err(err)).await;
                }
            }
        }

        ControlFlow::Continue(())
    }

    async fn deliver(&self, item: Inbound) -> ControlFlow<()> {
        if self.inbound_tx.send(item).await.is_err() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}
