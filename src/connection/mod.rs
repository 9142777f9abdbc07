//! Live connection management
//!
//! This module provides:
//! - A transport seam (`Connector`, `FrameReader`, `FrameWriter`)
//! - A length-prefixed TCP / Unix socket transport with a protocol handshake
//! - Exponential reconnect backoff with jitter
//! - The `ConnectionManager` state machine that owns one live connection

pub mod backoff;
pub mod manager;
pub mod stream;
pub mod transport;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use backoff::ReconnectPolicy;
pub use manager::{ConnectionManager, ConnectionStats, FrameStream};
pub use stream::StreamConnector;
pub use transport::{Connection, Connector, Endpoint, Frame, FrameReader, FrameWriter, ProtocolOptions};

/// Lifecycle state of the one connection owned by a [`ConnectionManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
