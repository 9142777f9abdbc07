//! Live Toasts Library
//!
//! A real-time notification pipeline: a reconnecting live connection feeds
//! raw frames to a decoder, decoded notifications land in a bounded,
//! deduplicating, auto-expiring queue, and presentation code observes the
//! queue through subscriptions.

pub mod config;
pub mod connection;
pub mod decoder;
pub mod errors;
pub mod hub;
pub mod queue;
pub mod shared;
pub mod subscription;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigManager};
pub use connection::{ConnectionManager, ConnectionState};
pub use decoder::{DomainEvent, IncomingNotification, MessageDecoder, NotificationKind};
pub use errors::{AppError, AppResult};
pub use hub::{HubHandle, NotificationHub};
pub use queue::{IngestOutcome, Mutation, Notification, NotificationId, NotificationQueue, QueueUpdate};
pub use subscription::{Subscription, SubscriberRegistry};
