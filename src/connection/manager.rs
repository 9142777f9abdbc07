use flume::{Receiver, Sender};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::backoff::ReconnectPolicy;
use super::transport::{Connection, Connector, Endpoint, Frame, FrameReader, ProtocolOptions};
use super::ConnectionState;
use crate::errors::{AppError, AppResult};

/// Counters describing the connection's history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Successful connects, including the first
    pub connects: u64,
    /// Live connections that dropped without being asked to
    pub disconnects: u64,
    /// Backoff waits scheduled
    pub reconnect_attempts: u64,
    pub frames_received: u64,
    pub frames_sent: u64,
}

/// Lazy, unbounded sequence of inbound frames
///
/// Cloning yields another handle onto the same sequence; each frame is
/// delivered to exactly one handle. The sequence ends once the manager's
/// connection loop has stopped and every buffered frame was taken.
#[derive(Clone)]
pub struct FrameStream {
    receiver: Receiver<Frame>,
}

impl FrameStream {
    /// Wait for the next frame
    pub async fn next(&self) -> Option<Frame> {
        self.receiver.recv_async().await.ok()
    }
}

/// Channel ends owned by the connection loop, handed over on `connect`
struct LoopParts {
    inbound_tx: Sender<Frame>,
    outbound_rx: Receiver<Frame>,
    shutdown_rx: Receiver<()>,
}

/// Owns the lifecycle of one live connection
///
/// The manager never surfaces transport errors to its callers. Connect
/// failures, malformed handshakes and dropped connections all become state
/// transitions followed by a backoff wait and another attempt.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    inbound_rx: Receiver<Frame>,
    outbound_tx: Sender<Frame>,
    shutdown_tx: Sender<()>,
    parts: StdMutex<Option<LoopParts>>,
    task: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<StdMutex<ConnectionStats>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (inbound_tx, inbound_rx) = flume::unbounded();
        let (outbound_tx, outbound_rx) = flume::unbounded();
        let (shutdown_tx, shutdown_rx) = flume::bounded(1);

        Self {
            connector,
            policy,
            state_tx: Arc::new(state_tx),
            inbound_rx,
            outbound_tx,
            shutdown_tx,
            parts: StdMutex::new(Some(LoopParts {
                inbound_tx,
                outbound_rx,
                shutdown_rx,
            })),
            task: Mutex::new(None),
            stats: Arc::new(StdMutex::new(ConnectionStats::default())),
        }
    }

    /// Start connecting to `url` in the background
    ///
    /// Returns as soon as the connection loop is running. Whether the
    /// endpoint is reachable is reported only through state transitions.
    ///
    /// # Errors
    ///
    /// Fails immediately if the URL is not a supported endpoint, if the
    /// manager was shut down, or if `connect` was already called.
    pub async fn connect(&self, url: &str, options: ProtocolOptions) -> AppResult<()> {
        let endpoint = Endpoint::parse(url)?;

        let mut task = self.task.lock().await;
        let parts = {
            let mut guard = self
                .parts
                .lock()
                .map_err(|_| AppError::internal("connection manager lock poisoned"))?;
            match guard.take() {
                Some(parts) => parts,
                None if *self.state_tx.borrow() == ConnectionState::Disconnected && task.is_none() => {
                    return Err(AppError::ShutDown)
                }
                None => return Err(AppError::internal("connect may only be called once per manager")),
            }
        };

        info!("Connecting to {}", endpoint);
        set_state(&self.state_tx, ConnectionState::Connecting);

        let connection_loop = ConnectionLoop {
            connector: self.connector.clone(),
            endpoint,
            options,
            policy: self.policy.clone(),
            state_tx: self.state_tx.clone(),
            stats: self.stats.clone(),
            parts,
        };
        *task = Some(tokio::spawn(connection_loop.run()));
        Ok(())
    }

    /// Queue a frame for sending
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotConnected`] unless the state is `connected`, so
    /// a frame is never dropped without the caller hearing about it.
    pub fn send(&self, frame: impl Into<Frame>) -> AppResult<()> {
        let state = self.state();
        if state != ConnectionState::Connected {
            warn!("Refusing to send while {}", state);
            return Err(AppError::NotConnected { state });
        }
        self.outbound_tx.send(frame.into()).map_err(|_| AppError::ShutDown)
    }

    /// Inbound frames, in arrival order
    pub fn inbound(&self) -> FrameStream {
        FrameStream {
            receiver: self.inbound_rx.clone(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Close the transport and stop retrying
    ///
    /// Safe to call any number of times. When it returns the connection loop
    /// has exited, no retry timer is pending and the state is `disconnected`.
    pub async fn shutdown(&self) {
        let mut task = self.task.lock().await;

        // Never connected: drop the loop ends so the inbound sequence ends.
        if let Ok(mut parts) = self.parts.lock() {
            parts.take();
        }

        if let Some(handle) = task.take() {
            let _ = self.shutdown_tx.try_send(());
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!("Connection loop panicked: {}", e);
                }
            }
            info!("Connection manager shut down");
        }

        set_state(&self.state_tx, ConnectionState::Disconnected);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.try_lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

fn set_state(state_tx: &watch::Sender<ConnectionState>, next: ConnectionState) {
    state_tx.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        debug!("Connection state {} -> {}", current, next);
        *current = next;
        true
    });
}

enum PumpExit {
    Shutdown,
    Dropped(AppError),
}

struct ConnectionLoop {
    connector: Arc<dyn Connector>,
    endpoint: Endpoint,
    options: ProtocolOptions,
    policy: ReconnectPolicy,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    stats: Arc<StdMutex<ConnectionStats>>,
    parts: LoopParts,
}

impl ConnectionLoop {
    async fn run(self) {
        let mut attempt: u32 = 0;

        loop {
            let result = tokio::select! {
                result = self.connector.connect(&self.endpoint, &self.options) => result,
                _ = self.parts.shutdown_rx.recv_async() => return,
            };

            match result {
                Ok(connection) => {
                    attempt = 0;
                    self.record(|s| s.connects += 1);
                    info!(
                        "Connected to {} (protocol: {})",
                        self.endpoint,
                        connection.protocol.as_deref().unwrap_or("none")
                    );
                    set_state(&self.state_tx, ConnectionState::Connected);

                    match self.pump(connection).await {
                        PumpExit::Shutdown => return,
                        PumpExit::Dropped(e) => {
                            self.record(|s| s.disconnects += 1);
                            warn!("Connection to {} dropped: {}", self.endpoint, e);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Connect attempt to {} failed ({}): {}",
                        self.endpoint,
                        e.category(),
                        e
                    );
                }
            }

            if !self.policy.allows(attempt) {
                error!(
                    "Giving up on {} after {} reconnect attempts",
                    self.endpoint, attempt
                );
                set_state(&self.state_tx, ConnectionState::Disconnected);
                return;
            }

            set_state(&self.state_tx, ConnectionState::Reconnecting);
            let delay = self.policy.delay_for(attempt);
            attempt = attempt.saturating_add(1);
            self.record(|s| s.reconnect_attempts += 1);
            debug!("Reconnect attempt {} to {} in {:?}", attempt, self.endpoint, delay);

            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.parts.shutdown_rx.recv_async() => return,
            }
        }
    }

    /// Move frames both ways until the connection drops or shutdown is requested
    async fn pump(&self, connection: Connection) -> PumpExit {
        let Connection { reader, mut writer, .. } = connection;
        let mut reader_task = tokio::spawn(read_loop(reader, self.parts.inbound_tx.clone(), self.stats.clone()));

        let exit = loop {
            tokio::select! {
                _ = self.parts.shutdown_rx.recv_async() => {
                    if let Err(e) = writer.close().await {
                        debug!("Error closing connection to {}: {}", self.endpoint, e);
                    }
                    break PumpExit::Shutdown;
                }
                ended = &mut reader_task => {
                    let err = ended.unwrap_or_else(|e| AppError::internal(format!("reader task failed: {}", e)));
                    break PumpExit::Dropped(err);
                }
                outbound = self.parts.outbound_rx.recv_async() => {
                    let Ok(frame) = outbound else {
                        break PumpExit::Shutdown;
                    };
                    if let Err(e) = writer.write_frame(&frame).await {
                        break PumpExit::Dropped(e);
                    }
                    self.record(|s| s.frames_sent += 1);
                }
            }
        };

        reader_task.abort();

        let discarded = self.parts.outbound_rx.drain().count();
        if discarded > 0 {
            warn!("Discarded {} unsent frames for {}", discarded, self.endpoint);
        }

        exit
    }

    fn record(&self, update: impl FnOnce(&mut ConnectionStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }
}

async fn read_loop(
    mut reader: Box<dyn FrameReader>,
    inbound: Sender<Frame>,
    stats: Arc<StdMutex<ConnectionStats>>,
) -> AppError {
    loop {
        match reader.read_frame().await {
            Ok(Some(frame)) => {
                if let Ok(mut stats) = stats.lock() {
                    stats.frames_received += 1;
                }
                debug!("Received frame of {} bytes", frame.len());
                if inbound.send_async(frame).await.is_err() {
                    return AppError::ShutDown;
                }
            }
            Ok(None) => return AppError::ConnectionClosed,
            Err(e) => return e,
        }
    }
}
