//! Notification records and the mutations the queue publishes

use chrono::{DateTime, Local};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::decoder::{IncomingNotification, NotificationKind};

/// Opaque identifier, unique for the lifetime of one queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NotificationId(u64);

impl NotificationId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single user-visible alert
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Monotonic ingestion time
    pub created_at: Instant,
    /// Wall-clock ingestion time, for display
    pub received_at: DateTime<Local>,
    /// `None` means the notification stays until dismissed
    pub ttl: Option<Duration>,
    /// Minted alongside the id; breaks `created_at` ties
    pub sequence: u64,
    /// Set once the notification leaves the active set; never cleared
    pub dismissed: bool,
}

impl Notification {
    pub(crate) fn mint(
        id: NotificationId,
        sequence: u64,
        incoming: IncomingNotification,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            id,
            kind: incoming.kind,
            title: incoming.title,
            message: incoming.message,
            created_at: Instant::now(),
            received_at: Local::now(),
            ttl,
            sequence,
            dismissed: false,
        }
    }

    /// Exact `(kind, title, message)` match used for deduplication
    pub fn has_signature_of(&self, incoming: &IncomingNotification) -> bool {
        self.kind == incoming.kind && self.title == incoming.title && self.message == incoming.message
    }

    /// Eviction order: oldest `created_at` first, then lowest sequence
    pub(crate) fn age_key(&self) -> (Instant, u64) {
        (self.created_at, self.sequence)
    }
}

/// What changed in the active set
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Inserted(Notification),
    Dismissed(Notification),
    Expired(Notification),
    Evicted(Notification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Inserted,
    Dismissed,
    Expired,
    Evicted,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Inserted => "inserted",
            Self::Dismissed => "dismissed",
            Self::Expired => "expired",
            Self::Evicted => "evicted",
        };
        f.write_str(label)
    }
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::Inserted(_) => MutationKind::Inserted,
            Self::Dismissed(_) => MutationKind::Dismissed,
            Self::Expired(_) => MutationKind::Expired,
            Self::Evicted(_) => MutationKind::Evicted,
        }
    }

    pub fn notification(&self) -> &Notification {
        match self {
            Self::Inserted(n) | Self::Dismissed(n) | Self::Expired(n) | Self::Evicted(n) => n,
        }
    }

    pub fn id(&self) -> NotificationId {
        self.notification().id
    }
}

/// One delivery to subscribers: the mutation and the active set right after it
#[derive(Debug, Clone, PartialEq)]
pub struct QueueUpdate {
    pub mutation: Mutation,
    pub active: Vec<Notification>,
}

