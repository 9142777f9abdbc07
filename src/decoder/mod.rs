//! Frame decoding
//!
//! Converts raw inbound frames into [`DomainEvent`]s. Decoding is a pure
//! function; [`MessageDecoder`] pairs it with a [`DecodeErrorSink`] so that
//! bad frames are reported and skipped without touching connection or queue
//! state.
//!
//! Wire format (JSON, discriminant `type`):
//!
//! ```json
//! {"type": "notification", "kind": "error", "title": "Build failed", "message": "exit 1", "ttl_ms": 10000}
//! {"type": "heartbeat"}
//! ```

pub mod events;
pub mod sink;

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::connection::Frame;

pub use events::{DomainEvent, IncomingNotification, NotificationKind};
pub use sink::{DecodeErrorSink, RecordingSink, TracingSink};

/// Why a frame did not become a domain event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not parseable as the expected structure
    #[error("malformed payload: {reason}")]
    MalformedPayload { reason: String },

    /// Well-formed, but the discriminant is not one we know
    #[error("unknown event type '{event_type}'")]
    UnknownEventType { event_type: String },
}

impl DecodeError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload { reason: reason.into() }
    }

    /// Unknown event types are expected from newer servers and are not faults
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::UnknownEventType { .. })
    }
}

#[derive(Debug, Deserialize)]
struct NotificationPayload {
    #[serde(default)]
    kind: Option<Value>,
    title: String,
    message: String,
    #[serde(default, alias = "ttlMs")]
    ttl_ms: Option<u64>,
}

/// Decode one frame
pub fn decode(frame: &[u8]) -> Result<DomainEvent, DecodeError> {
    let value: Value = serde_json::from_slice(frame).map_err(|e| DecodeError::malformed(e.to_string()))?;

    let event_type = match value.get("type") {
        Some(Value::String(event_type)) => event_type.clone(),
        Some(_) => return Err(DecodeError::malformed("field 'type' is not a string")),
        None => return Err(DecodeError::malformed("missing field 'type'")),
    };

    match event_type.as_str() {
        "notification" => {
            let payload: NotificationPayload =
                serde_json::from_value(value).map_err(|e| DecodeError::malformed(e.to_string()))?;
            Ok(DomainEvent::Notification(into_incoming(payload)))
        }
        "heartbeat" => Ok(DomainEvent::Heartbeat),
        _ => Err(DecodeError::UnknownEventType { event_type }),
    }
}

fn into_incoming(payload: NotificationPayload) -> IncomingNotification {
    let kind = match &payload.kind {
        Some(Value::String(raw)) => NotificationKind::parse(raw).unwrap_or_else(|| {
            warn!("Unknown notification kind '{}', treating as info", raw);
            NotificationKind::Info
        }),
        Some(Value::Null) | None => {
            warn!("Notification '{}' has no kind, treating as info", payload.title);
            NotificationKind::Info
        }
        Some(other) => {
            warn!("Unknown notification kind {}, treating as info", other);
            NotificationKind::Info
        }
    };

    IncomingNotification {
        kind,
        title: payload.title,
        message: payload.message,
        ttl: payload.ttl_ms.map(Duration::from_millis),
    }
}

/// Decoder bound to an error sink
#[derive(Clone)]
pub struct MessageDecoder {
    sink: Arc<dyn DecodeErrorSink>,
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl MessageDecoder {
    pub fn new(sink: Arc<dyn DecodeErrorSink>) -> Self {
        Self { sink }
    }

    /// Decode, reporting failures to the sink instead of returning them
    pub fn decode_frame(&self, frame: &Frame) -> Option<DomainEvent> {
        match decode(frame.as_bytes()) {
            Ok(event) => Some(event),
            Err(e) => {
                self.sink.report(&e, frame);
                None
            }
        }
    }
}
