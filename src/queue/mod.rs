//! Bounded, deduplicating notification queue
//!
//! The queue exclusively owns its notification records. Every mutation is
//! applied synchronously and published to the [`SubscriberRegistry`] before the
//! call returns, so subscribers observe mutations in exactly the order they
//! were applied. The queue is owned by a single task; timers only post ids to
//! the expiry channel and never touch the active set themselves.

pub mod notification;
pub mod timer;

#[cfg(test)]
mod proptest_queue;

use flume::{Receiver, Sender};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::config::QueueConfig;
use crate::decoder::{IncomingNotification, NotificationKind};
use crate::subscription::SubscriberRegistry;

pub use notification::{Mutation, MutationKind, Notification, NotificationId, QueueUpdate};
pub use timer::ExpiryTimer;

/// Result of [`NotificationQueue::ingest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted {
        id: NotificationId,
        evicted: Option<NotificationId>,
    },
    /// An active notification with the same signature already exists
    Duplicate { existing: NotificationId },
    Closed,
}

impl IngestOutcome {
    pub fn inserted_id(&self) -> Option<NotificationId> {
        match self {
            Self::Inserted { id, .. } => Some(*id),
            _ => None,
        }
    }
}

struct Entry {
    notification: Notification,
    timer: Option<ExpiryTimer>,
}

pub struct NotificationQueue {
    policy: QueueConfig,
    active: VecDeque<Entry>,
    next_id: u64,
    next_sequence: u64,
    subscribers: Arc<SubscriberRegistry>,
    expiry_tx: Sender<NotificationId>,
    expiry_rx: Receiver<NotificationId>,
    closed: bool,
}

impl NotificationQueue {
    pub fn new(policy: QueueConfig, subscribers: Arc<SubscriberRegistry>) -> Self {
        let (expiry_tx, expiry_rx) = flume::unbounded();
        Self {
            policy,
            active: VecDeque::new(),
            next_id: 1,
            next_sequence: 0,
            subscribers,
            expiry_tx,
            expiry_rx,
            closed: false,
        }
    }

    pub fn policy(&self) -> &QueueConfig {
        &self.policy
    }

    /// Ids whose expiry deadline has passed
    ///
    /// The owner feeds these back through [`expire_now`](Self::expire_now).
    pub fn expirations(&self) -> Receiver<NotificationId> {
        self.expiry_rx.clone()
    }

    fn ttl_for(&self, incoming: &IncomingNotification) -> Option<Duration> {
        if incoming.ttl.is_some() {
            return incoming.ttl;
        }
        match incoming.kind {
            NotificationKind::Error => self.policy.error_ttl(),
            _ => Some(self.policy.default_ttl()),
        }
    }

    /// Insert a notification, collapsing exact repeats of an active one
    ///
    /// Must be called from within a Tokio runtime when the notification
    /// carries a TTL.
    pub fn ingest(&mut self, incoming: IncomingNotification) -> IngestOutcome {
        if self.closed {
            return IngestOutcome::Closed;
        }

        if self.policy.dedupe_active {
            if let Some(existing) = self
                .active
                .iter()
                .find(|entry| entry.notification.has_signature_of(&incoming))
            {
                debug!(
                    "Suppressing duplicate {} notification '{}' (active as {})",
                    incoming.kind, incoming.title, existing.notification.id
                );
                return IngestOutcome::Duplicate {
                    existing: existing.notification.id,
                };
            }
        }

        let mut evicted = None;
        while self.active.len() >= self.policy.max_active.max(1) {
            match self.evict_oldest() {
                Some(id) => evicted = Some(id),
                None => break,
            }
        }

        let id = NotificationId::from_raw(self.next_id);
        self.next_id += 1;
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let ttl = self.ttl_for(&incoming);
        let notification = Notification::mint(id, sequence, incoming, ttl);
        let timer = ttl.map(|ttl| ExpiryTimer::start(id, ttl, self.expiry_tx.clone()));

        info!(
            "Queued {} notification {}: {} (ttl: {})",
            notification.kind,
            id,
            notification.title,
            ttl.map_or_else(|| "none".to_string(), |t| format!("{}ms", t.as_millis()))
        );

        self.active.push_back(Entry {
            notification: notification.clone(),
            timer,
        });
        self.publish(Mutation::Inserted(notification));

        IngestOutcome::Inserted { id, evicted }
    }

    fn evict_oldest(&mut self) -> Option<NotificationId> {
        let index = self
            .active
            .iter()
            .enumerate()
            .min_by_key(|(_, entry)| entry.notification.age_key())
            .map(|(index, _)| index)?;
        let notification = self.remove_at(index)?;
        let id = notification.id;
        debug!("Evicting {} to stay within {} active", id, self.policy.max_active);
        self.publish(Mutation::Evicted(notification));
        Some(id)
    }

    /// Remove by user request; no-op for unknown or already removed ids
    pub fn dismiss(&mut self, id: NotificationId) -> bool {
        match self.take(id) {
            Some(notification) => {
                debug!("Dismissed {}", id);
                self.publish(Mutation::Dismissed(notification));
                true
            }
            None => {
                trace!("Dismiss of {} ignored: not active", id);
                false
            }
        }
    }

    /// Remove because the deadline passed; no-op for unknown or removed ids
    pub fn expire_now(&mut self, id: NotificationId) -> bool {
        match self.take(id) {
            Some(notification) => {
                debug!("Expired {}", id);
                self.publish(Mutation::Expired(notification));
                true
            }
            None => {
                trace!("Stale expiry for {} ignored", id);
                false
            }
        }
    }

    fn take(&mut self, id: NotificationId) -> Option<Notification> {
        if self.closed {
            return None;
        }
        let index = self
            .active
            .iter()
            .position(|entry| entry.notification.id == id)?;
        self.remove_at(index)
    }

    fn remove_at(&mut self, index: usize) -> Option<Notification> {
        let Entry {
            mut notification,
            timer,
        } = self.active.remove(index)?;
        if let Some(timer) = timer {
            timer.cancel();
        }
        notification.dismissed = true;
        Some(notification)
    }

    fn publish(&self, mutation: Mutation) {
        let update = QueueUpdate {
            mutation,
            active: self.list(),
        };
        self.subscribers.publish(&update);
    }

    /// Snapshot of the active set in insertion order
    pub fn list(&self) -> Vec<Notification> {
        self.active.iter().map(|entry| entry.notification.clone()).collect()
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.active
            .iter()
            .map(|entry| &entry.notification)
            .find(|notification| notification.id == id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Cancel all timers, detach all subscribers, and ignore later calls
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let dropped = self.active.len();
        self.active.clear();
        self.subscribers.close();
        info!("Notification queue closed ({} active dropped)", dropped);
    }
}

impl Drop for NotificationQueue {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_with(policy: QueueConfig) -> (NotificationQueue, Receiver<QueueUpdate>, crate::subscription::Subscription) {
        let registry = SubscriberRegistry::new();
        let (subscription, updates) = registry.subscribe_channel();
        (NotificationQueue::new(policy, registry), updates, subscription)
    }

    fn info(title: &str) -> IncomingNotification {
        IncomingNotification::new(NotificationKind::Info, title, "body")
    }

    fn kinds(updates: &Receiver<QueueUpdate>) -> Vec<(MutationKind, NotificationId)> {
        updates
            .try_iter()
            .map(|u| (u.mutation.kind(), u.mutation.id()))
            .collect()
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let policy = QueueConfig {
            max_active: 2,
            ..QueueConfig::default()
        };
        let (mut queue, updates, _sub) = queue_with(policy);

        let a = queue.ingest(info("A")).inserted_id().unwrap();
        let b = queue.ingest(info("B")).inserted_id().unwrap();
        let outcome = queue.ingest(info("C"));
        let c = outcome.inserted_id().unwrap();

        assert_eq!(outcome, IngestOutcome::Inserted { id: c, evicted: Some(a) });
        let titles: Vec<String> = queue.list().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["B", "C"]);

        assert_eq!(
            kinds(&updates),
            vec![
                (MutationKind::Inserted, a),
                (MutationKind::Inserted, b),
                (MutationKind::Evicted, a),
                (MutationKind::Inserted, c),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_created_at_tie_evicts_lower_sequence() {
        let policy = QueueConfig {
            max_active: 2,
            ..QueueConfig::default()
        };
        let (mut queue, updates, _sub) = queue_with(policy);

        let a = queue.ingest(info("A")).inserted_id().unwrap();
        let b = queue.ingest(info("B")).inserted_id().unwrap();
        let first = queue.get(a).unwrap().clone();
        let second = queue.get(b).unwrap().clone();
        assert_eq!(first.created_at, second.created_at);
        assert!(first.sequence < second.sequence);

        let outcome = queue.ingest(info("C"));
        assert!(matches!(outcome, IngestOutcome::Inserted { evicted: Some(id), .. } if id == a));

        let evicted = updates
            .try_iter()
            .find(|u| u.mutation.kind() == MutationKind::Evicted)
            .unwrap();
        assert_eq!(evicted.mutation.id(), a);
        assert_eq!(evicted.mutation.notification().created_at, second.created_at);
    }

    #[tokio::test]
    async fn test_evicted_update_carries_removed_record() {
        let policy = QueueConfig {
            max_active: 1,
            ..QueueConfig::default()
        };
        let (mut queue, updates, _sub) = queue_with(policy);
        queue.ingest(info("first"));
        queue.ingest(info("second"));

        let evicted = updates
            .try_iter()
            .find(|u| u.mutation.kind() == MutationKind::Evicted)
            .unwrap();
        assert_eq!(evicted.mutation.notification().title, "first");
        assert!(evicted.mutation.notification().dismissed);
        assert!(evicted.active.is_empty());
    }

    #[tokio::test]
    async fn test_identical_events_collapse() {
        let (mut queue, updates, _sub) = queue_with(QueueConfig::default());
        let event = IncomingNotification::new(NotificationKind::Error, "Build failed", "exit 1");

        let first = queue.ingest(event.clone());
        let id = first.inserted_id().unwrap();
        assert_eq!(queue.ingest(event.clone()), IngestOutcome::Duplicate { existing: id });
        assert_eq!(queue.ingest(event), IngestOutcome::Duplicate { existing: id });

        assert_eq!(queue.len(), 1);
        assert_eq!(kinds(&updates), vec![(MutationKind::Inserted, id)]);
    }

    #[tokio::test]
    async fn test_dedup_only_matches_exact_signature() {
        let (mut queue, _updates, _sub) = queue_with(QueueConfig::default());
        queue.ingest(IncomingNotification::new(NotificationKind::Error, "Build failed", "exit 1"));
        queue.ingest(IncomingNotification::new(NotificationKind::Warning, "Build failed", "exit 1"));
        queue.ingest(IncomingNotification::new(NotificationKind::Error, "Build failed", "exit 2"));
        queue.ingest(IncomingNotification::new(NotificationKind::Error, "build failed", "exit 1"));
        assert_eq!(queue.len(), 4);
    }

    #[tokio::test]
    async fn test_dedup_can_be_disabled() {
        let policy = QueueConfig {
            dedupe_active: false,
            ..QueueConfig::default()
        };
        let (mut queue, _updates, _sub) = queue_with(policy);
        queue.ingest(info("same"));
        queue.ingest(info("same"));
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_removed_signature_is_ingested_as_new() {
        let (mut queue, _updates, _sub) = queue_with(QueueConfig::default());
        let first = queue.ingest(info("again")).inserted_id().unwrap();
        assert!(queue.dismiss(first));

        let second = queue.ingest(info("again")).inserted_id().unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_double_dismiss_emits_once() {
        let (mut queue, updates, _sub) = queue_with(QueueConfig::default());
        let id = queue.ingest(info("x")).inserted_id().unwrap();

        assert!(queue.dismiss(id));
        assert!(!queue.dismiss(id));
        assert!(!queue.dismiss(NotificationId::from_raw(999)));

        let dismissed: Vec<_> = kinds(&updates)
            .into_iter()
            .filter(|(kind, _)| *kind == MutationKind::Dismissed)
            .collect();
        assert_eq!(dismissed, vec![(MutationKind::Dismissed, id)]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_removal_preserves_order_of_remaining() {
        let (mut queue, _updates, _sub) = queue_with(QueueConfig::default());
        let ids: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|t| queue.ingest(info(t)).inserted_id().unwrap())
            .collect();

        queue.dismiss(ids[1]);
        let remaining: Vec<_> = queue.list().into_iter().map(|n| n.id).collect();
        assert_eq!(remaining, vec![ids[0], ids[2], ids[3]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_info_expires_after_default_ttl() {
        let (mut queue, updates, _sub) = queue_with(QueueConfig::default());
        let expirations = queue.expirations();
        let id = queue.ingest(info("transient")).inserted_id().unwrap();

        tokio::time::sleep(Duration::from_millis(4_999)).await;
        assert!(expirations.try_recv().is_err());

        let expired = expirations.recv_async().await.unwrap();
        assert_eq!(expired, id);
        assert!(queue.expire_now(expired));
        assert!(queue.is_empty());
        assert_eq!(kinds(&updates).last(), Some(&(MutationKind::Expired, id)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_without_ttl_never_expires() {
        let (mut queue, _updates, _sub) = queue_with(QueueConfig::default());
        let expirations = queue.expirations();
        let id = queue
            .ingest(IncomingNotification::new(NotificationKind::Error, "Build failed", "exit 1"))
            .inserted_id()
            .unwrap();

        assert_eq!(queue.get(id).unwrap().ttl, None);
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert!(expirations.try_recv().is_err());
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_ttl_overrides_kind_default() {
        let (mut queue, _updates, _sub) = queue_with(QueueConfig::default());
        let expirations = queue.expirations();
        let event = IncomingNotification::new(NotificationKind::Error, "flaky", "retrying")
            .with_ttl(Duration::from_millis(250));
        let id = queue.ingest(event).inserted_id().unwrap();

        assert_eq!(expirations.recv_async().await.unwrap(), id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_cancels_expiry() {
        let (mut queue, _updates, _sub) = queue_with(QueueConfig::default());
        let expirations = queue.expirations();
        let id = queue.ingest(info("short")).inserted_id().unwrap();
        queue.dismiss(id);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(expirations.try_recv().is_err());
        assert!(!queue.expire_now(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_silences_everything() {
        let (mut queue, updates, _sub) = queue_with(QueueConfig::default());
        let expirations = queue.expirations();
        let id = queue.ingest(info("pending")).inserted_id().unwrap();
        let _ = kinds(&updates);

        queue.close();
        queue.close();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(expirations.try_recv().is_err());
        assert_eq!(queue.ingest(info("late")), IngestOutcome::Closed);
        assert!(!queue.dismiss(id));
        assert!(!queue.expire_now(id));
        assert!(updates.try_recv().is_err());
        assert!(queue.is_closed());
    }
}
