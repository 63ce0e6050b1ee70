//! Streamable HTTP client transport.
//!
//! A [`StreamableHttpTransport`] owns two background tasks that share one
//! HTTP connection pool and one [`SessionState`]:
//!
//! - `dispatcher`: drains the outbound queue, POSTs each message, and
//!   delivers decoded replies (or per-exchange errors) on the inbound channel.
//! - `listener`: started once the `notifications/initialized` notification
//!   has been sent; holds a GET event stream open for server-initiated
//!   traffic and feeds the same inbound channel.
//!
//! The inbound channel closes after both tasks have stopped. Cancelling the
//! parent token, calling [`StreamableHttpTransport::shutdown`], or dropping
//! the transport stops both tasks.
//!
//! Submodules:
//! - `decoder`: JSON / SSE payload → [`ProtocolMessage`].
//! - `negotiator`: session header handling and the 404 recovery policy.
//! - `sse`: SSE framing with idle timeouts.
//! - `terminator`: best-effort `DELETE` of the session.
//! - `handshake`: `initialize` / `notifications/initialized` exchange.

pub mod decoder;
mod dispatcher;
pub mod handshake;
mod listener;
pub mod negotiator;
pub mod session;
pub mod sse;
pub mod terminator;

use std::time::Duration;

use reqwest::header::HeaderMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;
use url::Url;

use crate::config::TransportConfig;
use crate::models::ProtocolMessage;
use crate::{AppError, Result};

pub use session::SessionState;
pub use terminator::SessionTerminator;

use dispatcher::Dispatcher;
use listener::ListenerLauncher;

/// Item delivered on the inbound channel: a decoded message or the error
/// that replaced it.
pub type Inbound = Result<ProtocolMessage>;

/// Outbound queue depth. One is the smallest bounded capacity Tokio offers,
/// so a second `send` waits until the dispatcher has taken the first.
const OUTBOUND_QUEUE_DEPTH: usize = 1;

/// Inbound channel depth; producers wait for the caller to read.
const INBOUND_QUEUE_DEPTH: usize = 1;

/// Connection settings shared by the dispatcher, listener, and terminator.
#[derive(Debug, Clone)]
pub(crate) struct HttpContext {
    pub(crate) client: reqwest::Client,
    pub(crate) endpoint: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) timeout: Duration,
    pub(crate) sse_read_timeout: Duration,
}

impl HttpContext {
    fn new(config: &TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            headers: negotiator::base_headers(config)?,
            timeout: config.timeout(),
            sse_read_timeout: config.sse_read_timeout(),
        })
    }
}

/// One MCP session over Streamable HTTP.
pub struct StreamableHttpTransport {
    outbound: mpsc::Sender<ProtocolMessage>,
    inbound: mpsc::Receiver<Inbound>,
    session: SessionState,
    terminator: SessionTerminator,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl StreamableHttpTransport {
    /// Validate `config` and start the dispatcher task.
    ///
    /// The transport's tasks run under a child of `ct`, so cancelling `ct`
    /// stops them.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the configuration is invalid or the
    /// HTTP client cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn connect(config: TransportConfig, ct: &CancellationToken) -> Result<Self> {
        config.validate()?;
        let http = HttpContext::new(&config)?;
        let session = SessionState::new(config.session_id.clone());
        let cancel = ct.child_token();
        let tasks = TaskTracker::new();

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);

        let launcher = ListenerLauncher {
            http: http.clone(),
            session: session.clone(),
            inbound_tx: inbound_tx.clone(),
            cancel: cancel.clone(),
            tasks: tasks.clone(),
        };
        let dispatcher = Dispatcher::new(http.clone(), session.clone(), inbound_tx, launcher);
        tasks.spawn(dispatcher.run(outbound_rx, cancel.clone()));

        info!(endpoint = %config.endpoint, "connecting to streamable http endpoint");

        Ok(Self {
            outbound: outbound_tx,
            inbound: inbound_rx,
            terminator: SessionTerminator::new(http, session.clone()),
            session,
            cancel,
            tasks,
        })
    }

    /// Enqueue `message` for dispatch, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if the dispatcher has stopped.
    pub async fn send(&self, message: ProtocolMessage) -> Result<()> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| AppError::Transport("outbound queue closed".into()))
    }

    /// Handle for enqueueing from other tasks.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<ProtocolMessage> {
        self.outbound.clone()
    }

    /// Next inbound item; `None` once both producers have stopped.
    pub async fn recv(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }

    /// Current session id, if the server has issued one.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session.snapshot()
    }

    /// Handle that can terminate the session from another task.
    #[must_use]
    pub fn terminator(&self) -> SessionTerminator {
        self.terminator.clone()
    }

    /// Best-effort `DELETE` of the session; see [`SessionTerminator::terminate`].
    pub async fn terminate(&self) {
        self.terminator.terminate().await;
    }

    /// Token cancelling this transport's tasks.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop both tasks and wait for them to exit.
    ///
    /// Does not terminate the server-side session; call
    /// [`StreamableHttpTransport::terminate`] first for that.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        info!("streamable http transport shut down");
    }
}

impl Drop for StreamableHttpTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
