//! Transport configuration parsing and validation.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use serde::Deserialize;
use url::Url;

use crate::{AppError, Result};

fn default_timeout_seconds() -> u64 {
    30
}

fn default_sse_read_timeout_seconds() -> u64 {
    300
}

/// Caller-configurable surface of the Streamable HTTP transport.
///
/// Loaded from TOML:
///
/// ```toml
/// endpoint = "https://mcp.example.com/mcp"
/// timeout_seconds = 30
/// sse_read_timeout_seconds = 300
///
/// [headers]
/// x-tenant-id = "acme"
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TransportConfig {
    /// MCP endpoint receiving POST, GET and DELETE.
    pub endpoint: Url,
    /// Extra static headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Bound for connect, send, and each body or frame read of an ordinary exchange.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Idle bound between frames on the server-push stream.
    #[serde(default = "default_sse_read_timeout_seconds")]
    pub sse_read_timeout_seconds: u64,
    /// Session id to resume; replaced by whatever the server issues on `initialize`.
    #[serde(default)]
    pub session_id: Option<String>,
}

impl TransportConfig {
    /// Build a configuration for `endpoint` with default timeouts.
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            headers: BTreeMap::new(),
            timeout_seconds: default_timeout_seconds(),
            sse_read_timeout_seconds: default_sse_read_timeout_seconds(),
            session_id: None,
        }
    }

    /// Add an extra static header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Override the ordinary exchange timeout (whole seconds, minimum one).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = timeout.as_secs().max(1);
        self
    }

    /// Override the server-push idle-read timeout (whole seconds, minimum one).
    #[must_use]
    pub fn with_sse_read_timeout(mut self, timeout: Duration) -> Self {
        self.sse_read_timeout_seconds = timeout.as_secs().max(1);
        self
    }

    /// Resume an existing session instead of starting without one.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Ordinary exchange timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Server-push idle-read timeout.
    #[must_use]
    pub fn sse_read_timeout(&self) -> Duration {
        Duration::from_secs(self.sse_read_timeout_seconds)
    }

    /// Check the invariants the transport relies on.
    ///
    /// Called by [`TransportConfig::from_toml_str`] and again when a
    /// transport is connected, so programmatically built configs are
    /// held to the same rules.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        match self.endpoint.scheme() {
            "http" | "https" => {}
            other => {
                return Err(AppError::Config(format!(
                    "endpoint scheme must be http or https, got {other}"
                )));
            }
        }

        if self.timeout_seconds == 0 {
            return Err(AppError::Config(
                "timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.sse_read_timeout_seconds == 0 {
            return Err(AppError::Config(
                "sse_read_timeout_seconds must be greater than zero".into(),
            ));
        }

        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| AppError::Config(format!("invalid header name {name}: {err}")))?;
            HeaderValue::from_str(value)
                .map_err(|err| AppError::Config(format!("invalid value for header {name}: {err}")))?;
        }

        if let Some(session_id) = &self.session_id {
            if session_id.is_empty() {
                return Err(AppError::Config("session_id must not be empty".into()));
            }
            HeaderValue::from_str(session_id)
                .map_err(|err| AppError::Config(format!("invalid session_id: {err}")))?;
        }

        Ok(())
    }
}
