//! Connection configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::{
    constants::{
        DEFAULT_AMI_PORT, DEFAULT_SECRET, DEFAULT_SERVER, DEFAULT_TIMEOUT_MS, DEFAULT_USERNAME,
    },
    error::{AmiError, AmiResult},
};

/// Manager connection settings.
///
/// Unset fields fall back to `localhost:5038` with `phpagi`/`phpagi`
/// credentials. Values passed directly to
/// [`AmiClient::connect`](crate::AmiClient::connect) win over these.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmiConfig {
    /// Manager host, optionally `host:port`.
    pub server: String,
    /// Manager port, ignored when `server` embeds one.
    pub port: u16,
    /// Login username.
    pub username: String,
    /// Login secret.
    pub secret: String,
    /// TCP connect and greeting timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-line read timeout in milliseconds. `None` blocks indefinitely.
    pub read_timeout_ms: Option<u64>,
}

impl Default for AmiConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            port: DEFAULT_AMI_PORT,
            username: DEFAULT_USERNAME.to_string(),
            secret: DEFAULT_SECRET.to_string(),
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
            read_timeout_ms: None,
        }
    }
}

impl fmt::Debug for AmiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmiConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .finish()
    }
}

impl AmiConfig {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the manager host (`host` or `host:port`).
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Set the manager port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the login credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, secret: impl Into<String>) -> Self {
        self.username = username.into();
        self.secret = secret.into();
        self
    }

    /// Set the connect/greeting timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the per-line read timeout. `None` blocks indefinitely.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub(crate) fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms
            .map(Duration::from_millis)
    }
}

/// Split `host:port` into its parts, falling back to `default_port`.
///
/// IPv6 literals are accepted bare (`::1`, default port) or bracketed
/// (`[::1]` or `[::1]:5038`).
pub(crate) fn resolve_endpoint(server: &str, default_port: u16) -> AmiResult<(String, u16)> {
    let invalid = || AmiError::connect_failed(format!("invalid port in server '{}'", server));

    if let Some(rest) = server.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| {
                AmiError::connect_failed(format!("unterminated IPv6 literal in server '{}'", server))
            })?;
        let port = match tail {
            "" => default_port,
            _ => tail
                .strip_prefix(':')
                .and_then(|p| p.parse::<u16>().ok())
                .ok_or_else(invalid)?,
        };
        return Ok((host.to_string(), port));
    }

    match server.rsplit_once(':') {
        // More than one colon without brackets is a bare IPv6 address.
        Some((host, _)) if host.contains(':') => Ok((server.to_string(), default_port)),
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| invalid())?;
            Ok((host.to_string(), port))
        }
        None => Ok((server.to_string(), default_port)),
    }
}
