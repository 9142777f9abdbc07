//! Pipeline owner: connection → decoder → queue → subscribers
//!
//! [`NotificationHub`] is the single execution context that mutates the
//! queue. Inbound frames, dismiss requests, expiry deadlines and the shutdown
//! signal are all serialized through one `tokio::select!` loop, so a mutation
//! is never interleaved with another. Presentation code talks to the hub only
//! through a cloneable [`HubHandle`].

use flume::{Receiver, Sender};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::config::{Config, QueueConfig};
use crate::connection::{
    ConnectionManager, ConnectionState, ConnectionStats, Frame, FrameStream, ProtocolOptions, ReconnectPolicy,
    StreamConnector,
};
use crate::decoder::{DomainEvent, IncomingNotification, MessageDecoder};
use crate::errors::{AppError, AppResult};
use crate::queue::{Notification, NotificationId, NotificationQueue, QueueUpdate};
use crate::subscription::{Listener, SubscriberRegistry, Subscription};

/// Requests from handles to the hub task
#[derive(Debug)]
enum HubCommand {
    Dismiss(NotificationId),
    Inject(IncomingNotification),
}

pub struct NotificationHub {
    manager: Arc<ConnectionManager>,
    decoder: MessageDecoder,
    queue: NotificationQueue,
    commands_rx: Receiver<HubCommand>,
    shutdown_rx: Receiver<()>,
    snapshot_tx: Arc<watch::Sender<Vec<Notification>>>,
    _snapshots: Subscription,
}

impl NotificationHub {
    /// Spawn the hub task and return a handle to it
    ///
    /// The manager is not connected yet; call [`HubHandle::connect`].
    /// Must be called from within a Tokio runtime.
    pub fn start(manager: ConnectionManager, decoder: MessageDecoder, policy: QueueConfig) -> HubHandle {
        let subscribers = SubscriberRegistry::new();
        let manager = Arc::new(manager);
        let (commands_tx, commands_rx) = flume::unbounded();
        let (shutdown_tx, shutdown_rx) = flume::bounded(1);
        let (snapshot_tx, snapshot_rx) = watch::channel(Vec::new());
        let snapshot_tx = Arc::new(snapshot_tx);

        // First subscriber, so it runs ahead of every listener a handle adds
        let publisher = snapshot_tx.clone();
        let snapshots = subscribers.subscribe(move |update: &QueueUpdate| {
            publish_snapshot(&publisher, &update.active);
        });

        let hub = Self {
            manager: manager.clone(),
            decoder,
            queue: NotificationQueue::new(policy, subscribers.clone()),
            commands_rx,
            shutdown_rx,
            snapshot_tx,
            _snapshots: snapshots,
        };
        let task = tokio::spawn(hub.run());

        HubHandle {
            shared: Arc::new(HubShared {
                subscribers,
                manager,
                commands_tx,
                shutdown_tx,
                snapshot_rx,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    /// Build the whole pipeline from configuration and start connecting
    ///
    /// # Errors
    ///
    /// Fails if the configured URL is not a supported endpoint.
    pub async fn connect_from_config(config: &Config) -> AppResult<HubHandle> {
        let manager = ConnectionManager::new(
            Arc::new(StreamConnector::new()),
            ReconnectPolicy::from_config(&config.connection),
        );
        let handle = Self::start(manager, MessageDecoder::default(), config.queue.clone());

        if let Err(e) = handle
            .connect(&config.connection.url, ProtocolOptions::from_config(&config.connection))
            .await
        {
            handle.shutdown().await;
            return Err(e);
        }
        Ok(handle)
    }

    async fn run(mut self) {
        info!(
            "Notification hub started (max active: {}, default ttl: {}ms)",
            self.queue.policy().max_active,
            self.queue.policy().default_ttl_ms
        );

        let inbound: FrameStream = self.manager.inbound();
        let expirations = self.queue.expirations();
        let mut inbound_open = true;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv_async() => {
                    info!("Received shutdown signal, stopping notification hub");
                    break;
                }

                command = self.commands_rx.recv_async() => {
                    match command {
                        Ok(HubCommand::Dismiss(id)) => {
                            self.queue.dismiss(id);
                        }
                        Ok(HubCommand::Inject(incoming)) => {
                            self.queue.ingest(incoming);
                        }
                        Err(_) => {
                            debug!("All hub handles dropped");
                            break;
                        }
                    }
                }

                Ok(id) = expirations.recv_async() => {
                    self.queue.expire_now(id);
                }

                frame = inbound.next(), if inbound_open => {
                    match frame {
                        Some(frame) => self.handle_frame(&frame),
                        None => {
                            info!("Connection stopped; no more inbound frames");
                            inbound_open = false;
                        }
                    }
                }
            }
        }

        self.queue.close();
        publish_snapshot(&self.snapshot_tx, &[]);
        self.manager.shutdown().await;
        info!("Notification hub stopped");
    }

    fn handle_frame(&mut self, frame: &Frame) {
        match self.decoder.decode_frame(frame) {
            Some(DomainEvent::Notification(incoming)) => {
                self.queue.ingest(incoming);
            }
            Some(DomainEvent::Heartbeat) => trace!("Heartbeat"),
            None => {}
        }
    }

}

fn publish_snapshot(snapshot_tx: &watch::Sender<Vec<Notification>>, current: &[Notification]) {
    snapshot_tx.send_if_modified(|snapshot| {
        if snapshot.as_slice() == current {
            return false;
        }
        *snapshot = current.to_vec();
        true
    });
}

struct HubShared {
    subscribers: Arc<SubscriberRegistry>,
    manager: Arc<ConnectionManager>,
    commands_tx: Sender<HubCommand>,
    shutdown_tx: Sender<()>,
    snapshot_rx: watch::Receiver<Vec<Notification>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Subscription surface handed to presentation code
#[derive(Clone)]
pub struct HubHandle {
    shared: Arc<HubShared>,
}

impl HubHandle {
    /// Start the connection loop; see [`ConnectionManager::connect`]
    pub async fn connect(&self, url: &str, options: ProtocolOptions) -> AppResult<()> {
        self.shared.manager.connect(url, options).await
    }

    /// Register a listener for every queue mutation
    pub fn subscribe(&self, listener: impl Listener) -> Subscription {
        self.shared.subscribers.subscribe(listener)
    }

    /// Like [`subscribe`](Self::subscribe), delivering updates into a channel
    pub fn subscribe_channel(&self) -> (Subscription, Receiver<QueueUpdate>) {
        self.shared.subscribers.subscribe_channel()
    }

    /// Ask the hub to dismiss a notification
    ///
    /// Unknown or already removed ids are ignored by the queue.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ShutDown`] once the hub has stopped.
    pub fn request_dismiss(&self, id: NotificationId) -> AppResult<()> {
        self.shared
            .commands_tx
            .send(HubCommand::Dismiss(id))
            .map_err(|_| AppError::ShutDown)
    }

    /// Feed a notification that did not arrive over the connection
    pub fn inject(&self, incoming: IncomingNotification) -> AppResult<()> {
        self.shared
            .commands_tx
            .send(HubCommand::Inject(incoming))
            .map_err(|_| AppError::ShutDown)
    }

    /// Active set as of the last applied mutation
    ///
    /// Already includes the mutation being delivered when called from a
    /// listener.
    pub fn list(&self) -> Vec<Notification> {
        self.shared.snapshot_rx.borrow().clone()
    }

    /// Observe active-set snapshots
    pub fn snapshots(&self) -> watch::Receiver<Vec<Notification>> {
        self.shared.snapshot_rx.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.manager.state()
    }

    pub fn connection_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.manager.state_changes()
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        self.shared.manager.stats()
    }

    /// Queue an outbound frame on the live connection
    pub fn send(&self, frame: impl Into<Frame>) -> AppResult<()> {
        self.shared.manager.send(frame)
    }

    /// Stop the hub, the queue and the connection
    ///
    /// Safe to call from any clone, any number of times. When it returns no
    /// subscriber callback is running or will run again.
    pub async fn shutdown(&self) {
        let mut task = self.shared.task.lock().await;
        if let Some(handle) = task.take() {
            let _ = self.shared.shutdown_tx.try_send(());
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!("Notification hub panicked: {}", e);
                }
            }
        }
        // The hub task closes the registry on exit; repeat in case it never ran.
        self.shared.subscribers.close();
        self.shared.manager.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, Connector, Endpoint};
    use crate::decoder::NotificationKind;
    use crate::queue::MutationKind;
    use async_trait::async_trait;
    use std::time::Duration;

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, endpoint: &Endpoint, _options: &ProtocolOptions) -> AppResult<Connection> {
            Err(AppError::transport(endpoint.to_string(), "connection refused"))
        }
    }

    fn offline_hub(policy: QueueConfig) -> HubHandle {
        let manager = ConnectionManager::new(Arc::new(RefusingConnector), ReconnectPolicy::exponential(500, 2_000));
        NotificationHub::start(manager, MessageDecoder::default(), policy)
    }

    #[tokio::test]
    async fn test_injected_notification_reaches_subscribers_and_snapshot() {
        let hub = offline_hub(QueueConfig::default());
        let (_sub, updates) = hub.subscribe_channel();
        let mut snapshots = hub.snapshots();

        hub.inject(IncomingNotification::new(NotificationKind::Success, "Deployed", "v1.2.0"))
            .unwrap();

        let update = updates.recv_async().await.unwrap();
        assert_eq!(update.mutation.kind(), MutationKind::Inserted);
        snapshots.wait_for(|s| s.len() == 1).await.unwrap();
        assert_eq!(hub.list()[0].title, "Deployed");

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_list_is_current_inside_listener() {
        let hub = offline_hub(QueueConfig::default());
        let (seen_tx, seen_rx) = flume::unbounded();
        let inner = hub.clone();
        let _sub = hub.subscribe(move |update: &QueueUpdate| {
            let listed: Vec<NotificationId> = inner.list().iter().map(|n| n.id).collect();
            let active: Vec<NotificationId> = update.active.iter().map(|n| n.id).collect();
            let _ = seen_tx.send((update.mutation.kind(), listed, active));
        });

        hub.inject(IncomingNotification::new(NotificationKind::Info, "first", "a"))
            .unwrap();
        hub.inject(IncomingNotification::new(NotificationKind::Info, "second", "b"))
            .unwrap();
        let (_, _, after_first) = seen_rx.recv_async().await.unwrap();
        let (_, listed, active) = seen_rx.recv_async().await.unwrap();
        assert_eq!(listed, active);
        assert_eq!(active.len(), 2);

        hub.request_dismiss(after_first[0]).unwrap();
        let (kind, listed, active) = seen_rx.recv_async().await.unwrap();
        assert_eq!(kind, MutationKind::Dismissed);
        assert_eq!(listed, active);
        assert_eq!(active.len(), 1);

        hub.shutdown().await;
        assert!(hub.list().is_empty());
    }

    #[tokio::test]
    async fn test_request_dismiss_removes_notification() {
        let hub = offline_hub(QueueConfig::default());
        let (_sub, updates) = hub.subscribe_channel();

        hub.inject(IncomingNotification::new(NotificationKind::Error, "Build failed", "exit 1"))
            .unwrap();
        let id = updates.recv_async().await.unwrap().mutation.id();

        hub.request_dismiss(id).unwrap();
        hub.request_dismiss(id).unwrap();
        let update = updates.recv_async().await.unwrap();
        assert_eq!(update.mutation.kind(), MutationKind::Dismissed);
        assert!(update.active.is_empty());

        hub.shutdown().await;
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_callbacks_after_shutdown() {
        let hub = offline_hub(QueueConfig::default());
        let (_sub, updates) = hub.subscribe_channel();

        hub.inject(IncomingNotification::new(NotificationKind::Info, "soon gone", "ttl"))
            .unwrap();
        updates.recv_async().await.unwrap();

        hub.shutdown().await;
        hub.shutdown().await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(updates.try_recv().is_err());
        assert!(matches!(hub.request_dismiss(NotificationId::from_raw(1)), Err(AppError::ShutDown)));
        assert_eq!(hub.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_connect() {
        let hub = offline_hub(QueueConfig::default());
        assert!(hub.connect("gopher://x", ProtocolOptions::default()).await.is_err());
        hub.shutdown().await;
    }
}
