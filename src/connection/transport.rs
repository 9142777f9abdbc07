//! Transport seam between the connection manager and the wire
//!
//! A [`Connector`] turns an [`Endpoint`] into a live [`Connection`], already
//! past its handshake. The connection is split into independent reader and
//! writer halves so the manager can wait on inbound frames and outbound sends
//! at the same time without cancelling a partial read.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::config::ConnectionConfig;
use crate::errors::{AppError, AppResult};

/// One discrete message unit received over, or sent on, the live connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lossy text rendering for log lines
    pub fn to_text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Self(text.into_bytes())
    }
}

/// Where to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix { path: PathBuf },
}

impl Endpoint {
    /// Parse `tcp://host:port` or `unix:///absolute/path`
    pub fn parse(url: &str) -> AppResult<Self> {
        let invalid = |reason: &str| AppError::InvalidEndpoint {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
        match parsed.scheme() {
            "tcp" => {
                let host = parsed.host_str().ok_or_else(|| invalid("missing host"))?;
                let port = parsed.port().ok_or_else(|| invalid("missing port"))?;
                Ok(Self::Tcp {
                    host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
                    port,
                })
            }
            "unix" => {
                let path = parsed.path();
                if path.is_empty() || path == "/" {
                    return Err(invalid("missing socket path"));
                }
                Ok(Self::Unix { path: PathBuf::from(path) })
            }
            other => Err(invalid(&format!("unsupported scheme '{}'", other))),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => write!(f, "tcp://[{}]:{}", host, port),
            Self::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            Self::Unix { path } => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Options negotiated during the handshake
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolOptions {
    /// Protocol names offered to the server; empty accepts whatever it picks
    pub protocols: Vec<String>,
    pub client_name: String,
    pub handshake_timeout: Duration,
    pub max_frame_bytes: usize,
}

impl Default for ProtocolOptions {
    fn default() -> Self {
        Self {
            protocols: Vec::new(),
            client_name: format!("live-toasts/{}", env!("CARGO_PKG_VERSION")),
            handshake_timeout: Duration::from_secs(5),
            max_frame_bytes: 1024 * 1024,
        }
    }
}

impl ProtocolOptions {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            protocols: config.protocols.clone(),
            handshake_timeout: config.handshake_timeout(),
            max_frame_bytes: config.max_frame_bytes,
            ..Self::default()
        }
    }

    /// Whether the server's choice is acceptable
    pub fn accepts(&self, protocol: &str) -> bool {
        self.protocols.is_empty() || self.protocols.iter().any(|p| p == protocol)
    }
}

/// A connection that completed its handshake
pub struct Connection {
    pub reader: Box<dyn FrameReader>,
    pub writer: Box<dyn FrameWriter>,
    /// Protocol the server selected, if the transport negotiates one
    pub protocol: Option<String>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("protocol", &self.protocol).finish_non_exhaustive()
    }
}

/// Establishes connections; called again for every reconnect attempt
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and complete the handshake
    ///
    /// Unreachable endpoints and malformed handshakes are both errors; the
    /// manager retries them identically.
    async fn connect(&self, endpoint: &Endpoint, options: &ProtocolOptions) -> AppResult<Connection>;
}

/// Inbound half of a connection
#[async_trait]
pub trait FrameReader: Send {
    /// Next frame, or `Ok(None)` once the peer closed the connection cleanly
    async fn read_frame(&mut self) -> AppResult<Option<Frame>>;
}

/// Outbound half of a connection
#[async_trait]
pub trait FrameWriter: Send {
    async fn write_frame(&mut self, frame: &Frame) -> AppResult<()>;

    /// Best-effort graceful close
    async fn close(&mut self) -> AppResult<()>;
}
