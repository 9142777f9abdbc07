//! Error context enhancement utilities
//!
//! Extension methods that lift foreign errors into [`AppError`] while
//! attaching what was being attempted and where.

use std::path::PathBuf;

use super::types::AppError;

/// Extension trait for adding context to error types
pub trait ErrorContextExt<T> {
    /// Add operation context to the error
    fn with_context(self, operation: impl Into<String>) -> Result<T, AppError>;

    /// Attribute the error to a transport endpoint
    ///
    /// The resulting [`AppError::Transport`] is retryable, so the reconnect
    /// loop treats it like any other dropped connection.
    fn on_endpoint(self, endpoint: &str, operation: impl Into<String>) -> Result<T, AppError>;

    /// Add operation and file context
    fn in_file_operation(self, path: impl Into<PathBuf>, operation: impl Into<String>) -> Result<T, AppError>;
}

impl<T, E> ErrorContextExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context(self, operation: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| {
            let operation = operation.into();
            AppError::Other {
                message: format!("{}: {}", operation, e),
                source: Some(Box::new(e)),
            }
        })
    }

    fn on_endpoint(self, endpoint: &str, operation: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::transport_with_source(endpoint, operation, e))
    }

    fn in_file_operation(self, path: impl Into<PathBuf>, operation: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::io_with_source(path, operation, e))
    }
}
