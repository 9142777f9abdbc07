//! Typed domain events produced by the decoder

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Severity of a notification (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Warning,
    Error,
    Info,
}

impl NotificationKind {
    /// Parse a wire kind, case-insensitively; `None` for anything unknown
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "info" => Some(Self::Info),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification as announced by the server, before the queue mints it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingNotification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Overrides the per-kind default lifetime when present
    pub ttl: Option<Duration>,
}

impl IncomingNotification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Decoded meaning of one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    Notification(IncomingNotification),
    /// Keep-alive; carries nothing for the queue
    Heartbeat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing_is_lenient_about_case() {
        assert_eq!(NotificationKind::parse("ERROR"), Some(NotificationKind::Error));
        assert_eq!(NotificationKind::parse(" warning "), Some(NotificationKind::Warning));
        assert_eq!(NotificationKind::parse("critical"), None);
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&NotificationKind::Success).unwrap(), "\"success\"");
    }
}
