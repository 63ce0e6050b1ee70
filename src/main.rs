#![forbid(unsafe_code)]

//! `mcp-streamable-http`: line-oriented client for MCP Streamable HTTP endpoints.
//!
//! Opens a session, performs the lifecycle handshake, then forwards one
//! JSON-RPC message per stdin line and prints every inbound message as one
//! JSON line on stdout. Logs go to stderr.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

use mcp_streamable_http::transport::{decoder, handshake};
use mcp_streamable_http::{
    AppError, ProtocolMessage, RequestId, Result, StreamableHttpTransport, TransportConfig,
};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "mcp-streamable-http",
    about = "Talk to an MCP Streamable HTTP endpoint over stdin/stdout",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML transport configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Endpoint URL; overrides the one in `--config`.
    #[arg(long)]
    endpoint: Option<Url>,

    /// Extra request header as `NAME=VALUE`. Repeatable.
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Exchange timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Idle timeout in seconds for the server-push stream.
    #[arg(long)]
    sse_read_timeout: Option<u64>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Do not send `initialize` / `notifications/initialized` on start.
    #[arg(long)]
    skip_handshake: bool,
}

/// Depth of the stdin-forwarder → main-loop event queue.
const STDIN_EVENT_QUEUE_DEPTH: usize = 64;

/// What the stdin forwarder reports back to the main loop.
#[derive(Debug)]
enum StdinEvent {
    /// A request with this id is about to be enqueued.
    Forwarded(RequestId),
    /// Stdin reached EOF or failed; nothing more will be forwarded.
    Closed,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;

    let outcome = runtime.block_on(run(&args));
    // A stdin read may still be parked on a blocking thread.
    runtime.shutdown_background();
    outcome
}

async fn run(args: &Cli) -> Result<()> {
    let config = build_config(args)?;
    let wait = config.timeout();

    let ct = CancellationToken::new();
    let mut transport = StreamableHttpTransport::connect(config, &ct)?;

    let outcome = session(&mut transport, args.skip_handshake, wait).await;

    transport.terminate().await;
    transport.shutdown().await;
    outcome
}

async fn session(
    transport: &mut StreamableHttpTransport,
    skip_handshake: bool,
    wait: Duration,
) -> Result<()> {
    let mut stdout = tokio::io::stdout();

    if !skip_handshake {
        let result = handshake::initialize(
            transport,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            wait,
        )
        .await?;
        write_line(&mut stdout, &result).await?;
    }

    let (events_tx, mut events) = mpsc::channel(STDIN_EVENT_QUEUE_DEPTH);
    let forwarder = tokio::spawn(forward_stdin(
        transport.sender(),
        events_tx,
        transport.cancellation_token(),
    ));

    let mut pending: HashSet<RequestId> = HashSet::new();
    let mut stdin_open = true;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let drain = tokio::time::sleep(Duration::MAX);
    tokio::pin!(drain);

    let outcome = loop {
        // Events are polled before replies so a request id is always
        // recorded before its reply can be matched against it.
        tokio::select! {
            biased;

            () = &mut shutdown => {
                info!("shutdown signal received");
                break Ok(());
            }

            event = events.recv(), if stdin_open => match event {
                Some(StdinEvent::Forwarded(id)) => {
                    pending.insert(id);
                }
                Some(StdinEvent::Closed) | None => {
                    info!("stdin closed");
                    stdin_open = false;
                    drain.as_mut().reset(tokio::time::Instant::now() + wait);
                }
            },

            item = transport.recv() => match item {
                None => {
                    info!("transport closed");
                    break Ok(());
                }
                Some(Ok(message)) => {
                    if let ProtocolMessage::Response { id, .. } | ProtocolMessage::ErrorResponse { id, .. } = &message {
                        pending.remove(id);
                    }
                    if let Err(err) = write_line(&mut stdout, &message).await {
                        break Err(err);
                    }
                }
                Some(Err(err)) => error!(%err, "exchange failed"),
            },

            () = &mut drain, if !stdin_open => {
                warn!(pending = pending.len(), "gave up waiting for replies after stdin closed");
                break Ok(());
            }
        }

        if !stdin_open && pending.is_empty() {
            break Ok(());
        }
    };

    forwarder.abort();
    outcome
}

/// Read stdin line by line and enqueue each valid message on `sender`.
///
/// Runs apart from the main loop so a full outbound queue never stops
/// inbound messages from being printed.
async fn forward_stdin(
    sender: mpsc::Sender<ProtocolMessage>,
    events: mpsc::Sender<StdinEvent>,
    cancel: CancellationToken,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!(%err, "failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let message = match decoder::decode(&line) {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, "ignoring invalid json-rpc line");
                continue;
            }
        };

        if message.is_request() {
            if let Some(id) = message.id() {
                if events.send(StdinEvent::Forwarded(id.clone())).await.is_err() {
                    return;
                }
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            sent = sender.send(message) => {
                if sent.is_err() {
                    warn!("transport stopped, no longer forwarding stdin");
                    break;
                }
            }
        }
    }

    let _ = events.send(StdinEvent::Closed).await;
}

fn build_config(args: &Cli) -> Result<TransportConfig> {
    let mut config = match (&args.config, &args.endpoint) {
        (Some(path), endpoint) => {
            let mut config = TransportConfig::load_from_path(path)?;
            if let Some(endpoint) = endpoint {
                config.endpoint = endpoint.clone();
            }
            config
        }
        (None, Some(endpoint)) => TransportConfig::new(endpoint.clone()),
        (None, None) => {
            return Err(AppError::Config(
                "either --config or --endpoint is required".into(),
            ));
        }
    };

    for (name, value) in &args.headers {
        config.headers.insert(name.clone(), value.clone());
    }
    if let Some(seconds) = args.timeout {
        config.timeout_seconds = seconds;
    }
    if let Some(seconds) = args.sse_read_timeout {
        config.sse_read_timeout_seconds = seconds;
    }

    config.validate()?;
    Ok(config)
}

fn parse_header(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_owned(), value.trim().to_owned()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got {raw:?}"))
}

async fn write_line<T: serde::Serialize>(stdout: &mut Stdout, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec(value)
        .map_err(|err| AppError::Io(format!("failed to serialise output: {err}")))?;
    bytes.push(b'\n');
    stdout.write_all(&bytes).await?;
    stdout.flush().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
