//! Error types for the live-toasts pipeline
//!
//! Failures of the core surface as `AppError`. Decode failures are not part of
//! this enum: they are values reported to a sink (see `crate::decoder`).

use std::path::PathBuf;
use thiserror::Error;

use crate::connection::ConnectionState;

/// Main application error type
///
/// Organized by functional domain so that callers can branch on
/// [`AppError::category`] and [`AppError::is_retryable`].
#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid configuration value for '{key}': {value}")]
    InvalidConfigValue {
        key: String,
        value: String,
    },

    // Connection errors
    #[error("Invalid endpoint '{url}': {reason}")]
    InvalidEndpoint {
        url: String,
        reason: String,
    },

    #[error("Transport error on '{endpoint}': {message}")]
    Transport {
        endpoint: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Handshake with '{endpoint}' failed: {reason}")]
    Handshake {
        endpoint: String,
        reason: String,
    },

    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge {
        size: usize,
        limit: usize,
    },

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Cannot send while connection is {state}")]
    NotConnected {
        state: ConnectionState,
    },

    #[error("Connection manager has been shut down")]
    ShutDown,

    // I/O errors
    #[error("File I/O error for '{path}': {operation}")]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Serialization errors
    #[error("JSON serialization error: {context}")]
    JsonSerialization {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("JSON deserialization error: {context}")]
    JsonDeserialization {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("TOML parsing error: {context}")]
    TomlParsing {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Generic/catch-all errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{message}")]
    Other {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a new Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new Config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an InvalidConfigValue error
    pub fn invalid_value(key: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidConfigValue {
            key: key.into(),
            value: value.to_string(),
        }
    }

    /// Create a new Transport error
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a new Transport error with source
    pub fn transport_with_source(
        endpoint: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new Handshake error
    pub fn handshake(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handshake {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Create a new I/O error with source
    pub fn io_with_source(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Io {
            path: path.into(),
            operation: operation.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Whether the reconnect loop should try again after this error
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. }
            | Self::Handshake { .. }
            | Self::FrameTooLarge { .. }
            | Self::ConnectionClosed => true,
            Self::Io { .. } => true,
            _ => false,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } | Self::InvalidConfigValue { .. } => "config",
            Self::InvalidEndpoint { .. }
            | Self::Transport { .. }
            | Self::Handshake { .. }
            | Self::FrameTooLarge { .. }
            | Self::ConnectionClosed
            | Self::NotConnected { .. }
            | Self::ShutDown => "connection",
            Self::Io { .. } => "io",
            Self::JsonSerialization { .. } | Self::JsonDeserialization { .. } | Self::TomlParsing { .. } => {
                "serialization"
            }
            Self::Internal { .. } | Self::Other { .. } => "internal",
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        let operation = match err.kind() {
            std::io::ErrorKind::NotFound => "file not found",
            std::io::ErrorKind::PermissionDenied => "permission denied",
            std::io::ErrorKind::ConnectionRefused => "connection refused",
            std::io::ErrorKind::ConnectionAborted => "connection aborted",
            std::io::ErrorKind::UnexpectedEof => "unexpected end of stream",
            std::io::ErrorKind::TimedOut => "timeout",
            _ => "I/O operation",
        }
        .to_string();

        Self::Io {
            path: PathBuf::from("unknown"),
            operation,
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() {
            Self::JsonDeserialization {
                context: format!("JSON syntax error at line {} column {}", err.line(), err.column()),
                source: Some(Box::new(err)),
            }
        } else if err.is_data() || err.is_eof() {
            Self::JsonDeserialization {
                context: "JSON data error".to_string(),
                source: Some(Box::new(err)),
            }
        } else {
            Self::JsonSerialization {
                context: "JSON serialization error".to_string(),
                source: Some(Box::new(err)),
            }
        }
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::TomlParsing {
            context: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint {
            url: "<unparsed>".to_string(),
            reason: err.to_string(),
        }
    }
}
