//! Property-based tests for queue capacity, eviction order and dedup.

use proptest::prelude::*;
use std::time::Duration;

use super::{IngestOutcome, MutationKind, NotificationQueue};
use crate::config::QueueConfig;
use crate::decoder::{IncomingNotification, NotificationKind};
use crate::subscription::SubscriberRegistry;

/// Small alphabets so repeats of a signature are common.
fn incoming_strategy() -> impl Strategy<Value = IncomingNotification> {
    (
        prop_oneof![
            Just(NotificationKind::Success),
            Just(NotificationKind::Warning),
            Just(NotificationKind::Error),
            Just(NotificationKind::Info),
        ],
        prop::sample::select(vec!["deploy", "build", "sync"]),
        prop::sample::select(vec!["ok", "failed"]),
    )
        .prop_map(|(kind, title, message)| IncomingNotification::new(kind, title, message))
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    /// Property: capacity holds, eviction takes the lowest sequence, and
    /// duplicates publish nothing.
    #[test]
    fn prop_ingest_sequences_respect_queue_invariants(
        max_active in 1usize..6,
        dedupe_active in any::<bool>(),
        events in prop::collection::vec(incoming_strategy(), 0..40),
    ) {
        let runtime = paused_runtime();
        let _guard = runtime.enter();

        let policy = QueueConfig {
            max_active,
            dedupe_active,
            ..QueueConfig::default()
        };
        let registry = SubscriberRegistry::new();
        let (_sub, updates) = registry.subscribe_channel();
        let mut queue = NotificationQueue::new(policy, registry);

        // (id, sequence) of the active set as seen through the mutation stream
        let mut model = Vec::new();

        for incoming in events {
            let before = queue.len();
            let already_active = queue.list().iter().any(|n| n.has_signature_of(&incoming));

            let outcome = queue.ingest(incoming);
            let published: Vec<_> = updates.try_iter().collect();

            if dedupe_active && already_active {
                prop_assert!(matches!(outcome, IngestOutcome::Duplicate { .. }), "expected Duplicate, got {:?}", outcome);
                prop_assert!(published.is_empty());
                prop_assert_eq!(queue.len(), before);
                continue;
            }

            prop_assert!(matches!(outcome, IngestOutcome::Inserted { .. }), "expected Inserted, got {:?}", outcome);
            for update in &published {
                prop_assert!(update.active.len() <= max_active);
                let notification = update.mutation.notification();
                match update.mutation.kind() {
                    MutationKind::Evicted => {
                        let oldest = model.iter().map(|(_, sequence)| *sequence).min();
                        prop_assert_eq!(Some(notification.sequence), oldest);
                        model.retain(|(id, _)| *id != notification.id);
                    }
                    MutationKind::Inserted => model.push((notification.id, notification.sequence)),
                    other => prop_assert!(false, "unexpected {} during ingest", other),
                }
            }
            let inserted = published
                .iter()
                .filter(|u| u.mutation.kind() == MutationKind::Inserted)
                .count();
            prop_assert_eq!(inserted, 1);
            prop_assert!(queue.len() <= max_active);
            prop_assert_eq!(queue.len(), model.len());
        }
    }

    /// Property: with TTLs far in the future, every ingest keeps the active
    /// set in insertion order.
    #[test]
    fn prop_active_set_stays_in_insertion_order(
        max_active in 1usize..6,
        events in prop::collection::vec(incoming_strategy(), 0..40),
    ) {
        let runtime = paused_runtime();
        let _guard = runtime.enter();

        let registry = SubscriberRegistry::new();
        let mut queue = NotificationQueue::new(
            QueueConfig {
                max_active,
                ..QueueConfig::default()
            },
            registry,
        );

        for incoming in events {
            queue.ingest(incoming.with_ttl(Duration::from_secs(3_600)));
            let sequences: Vec<u64> = queue.list().iter().map(|n| n.sequence).collect();
            prop_assert!(sequences.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }
}
