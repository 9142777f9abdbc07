//! Observability sinks for frames that failed to decode
//!
//! A sink must never panic and never block ingestion: reporting happens on the
//! same execution context that mutates the queue.

use std::sync::Mutex;
use tracing::{debug, warn};

use super::DecodeError;
use crate::connection::Frame;

const PREVIEW_CHARS: usize = 200;

/// Receives `(DecodeError, raw frame)` pairs
pub trait DecodeErrorSink: Send + Sync {
    fn report(&self, error: &DecodeError, frame: &Frame);
}

/// Default sink: logs through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DecodeErrorSink for TracingSink {
    fn report(&self, error: &DecodeError, frame: &Frame) {
        let text = frame.to_text_lossy();
        let preview: String = text.chars().take(PREVIEW_CHARS).collect();
        if error.is_ignorable() {
            debug!("Ignoring frame: {} ({} bytes)", error, frame.len());
        } else {
            warn!("Dropping undecodable frame: {} | frame: {}", error, preview);
        }
    }
}

/// Keeps every report in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<(DecodeError, Frame)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(DecodeError, Frame)> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DecodeErrorSink for RecordingSink {
    fn report(&self, error: &DecodeError, frame: &Frame) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push((error.clone(), frame.clone()));
        }
    }
}
