//! Connection lifecycle manager.
//!
//! One `ConnectionManager` owns at most one live stream. It is cheap to clone
//! and every clone drives the same connection. Consumers `attach()` to get a
//! `Subscription`; the connection is opened on the first attach and closed
//! normally when the last subscription is dropped.
//!
//! ## State
//!
//! All bookkeeping (phase, generation, attempt counter, active handle,
//! outbound queue) lives behind one `std::sync::Mutex` that is never held
//! across an `.await`. Each opened stream gets a new generation number, and
//! callbacks from an older generation are ignored.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use yoyaku_shared::time::{Clock, timestamp_to_rfc3339};

use crate::{
    config::ClientConfig,
    domain::{Connector, Snapshot, transport::NORMAL_CLOSURE},
    infrastructure::dto::websocket::OutboundMessage,
    usecase::SnapshotStore,
};

use super::{
    domain::{is_normal_close, reconnect_delay, should_attempt_reconnect},
    session,
    subscription::Subscription,
};

/// Connection phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Open,
    /// A normal close was requested and has not completed yet
    Closing,
}

/// Result of `connect()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new stream is being opened
    Started,
    AlreadyOpen,
    /// Another caller holds the connect lock
    AlreadyConnecting,
    /// A close is in flight; the manager reopens afterwards if still attached
    Closing,
    ShutDown,
}

/// Result of `send()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Kept until the next open
    Queued,
    Dropped,
}

/// The live stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveHandle {
    pub generation: u64,
    /// Unix timestamp (ms) of the open
    pub connected_at: i64,
}

/// What the writer task sends
#[derive(Debug)]
pub(crate) enum Outgoing {
    Frame(OutboundMessage),
    Close(u16),
}

pub(crate) type OutgoingChannel = (
    mpsc::UnboundedSender<Outgoing>,
    mpsc::UnboundedReceiver<Outgoing>,
);

struct ConnectionState {
    phase: Phase,
    generation: u64,
    reconnect_attempts: u32,
    active: Option<ActiveHandle>,
    outbound: Option<mpsc::UnboundedSender<Outgoing>>,
    /// Mutations sent while no stream was open
    pending: VecDeque<OutboundMessage>,
    reconnect_task: Option<JoinHandle<()>>,
    close_requested: bool,
    /// `connect()` arrived while the stream was closing
    reopen_requested: bool,
    shut_down: bool,
    subscribers: usize,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            generation: 0,
            reconnect_attempts: 0,
            active: None,
            outbound: None,
            pending: VecDeque::new(),
            reconnect_task: None,
            close_requested: false,
            reopen_requested: false,
            shut_down: false,
            subscribers: 0,
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(task) = self.reconnect_task.take() {
            task.abort();
            tracing::debug!("Cancelled scheduled reconnect");
        }
    }

    /// Ask the live stream (if any) to close normally
    fn request_close(&mut self) {
        match self.phase {
            Phase::Open => {
                self.close_requested = true;
                self.phase = Phase::Closing;
                if let Some(tx) = &self.outbound {
                    let _ = tx.send(Outgoing::Close(NORMAL_CLOSURE));
                }
            }
            // the session closes the stream as soon as it opens
            Phase::Connecting => self.close_requested = true,
            Phase::Idle | Phase::Closing => {}
        }
    }
}

pub(crate) struct Inner {
    pub(crate) config: ClientConfig,
    pub(crate) connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
    state: Mutex<ConnectionState>,
    status_tx: watch::Sender<bool>,
    pub(crate) store: SnapshotStore,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn connect(self: &Arc<Self>) -> ConnectOutcome {
        let mut state = self.state();
        if state.shut_down {
            return ConnectOutcome::ShutDown;
        }
        match state.phase {
            Phase::Open => return ConnectOutcome::AlreadyOpen,
            Phase::Connecting => {
                tracing::debug!("Connect already in progress, attaching to it");
                // the stream is wanted again; keep it once it opens
                state.close_requested = false;
                return ConnectOutcome::AlreadyConnecting;
            }
            Phase::Closing => {
                tracing::debug!("Connection is closing, reopening once it is closed");
                state.reopen_requested = true;
                return ConnectOutcome::Closing;
            }
            Phase::Idle => {}
        }

        state.cancel_reconnect();
        state.phase = Phase::Connecting;
        state.close_requested = false;
        state.reopen_requested = false;
        state.generation += 1;
        let generation = state.generation;
        drop(state);

        tracing::info!(
            "Connecting to {} (generation {})",
            self.config.url,
            generation
        );
        tokio::spawn(session::run(Arc::clone(self), generation));
        ConnectOutcome::Started
    }

    /// The stream of `generation` is open.
    ///
    /// Returns the outbound channel of the stream. The receiver is already
    /// loaded with the baseline requests and any queued mutations. `None`
    /// means the stream is no longer wanted and must be closed.
    pub(crate) fn on_open(&self, generation: u64) -> Option<OutgoingChannel> {
        let mut state = self.state();
        if state.generation != generation || state.close_requested || state.shut_down {
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(filter) = &self.config.filter {
            let _ = tx.send(Outgoing::Frame(OutboundMessage::set_filter(filter.clone())));
        }
        let _ = tx.send(Outgoing::Frame(OutboundMessage::get_snapshot()));
        let flushed = state.pending.len();
        for message in state.pending.drain(..) {
            let _ = tx.send(Outgoing::Frame(message));
        }

        let connected_at = self.clock.now_millis();
        state.phase = Phase::Open;
        state.reconnect_attempts = 0;
        state.active = Some(ActiveHandle {
            generation,
            connected_at,
        });
        state.outbound = Some(tx.clone());
        // published under the lock so `AlreadyOpen` always comes with status `true`
        self.status_tx.send_replace(true);
        drop(state);

        tracing::info!(
            "Connected to {} at {} ({} queued messages flushed)",
            self.config.url,
            timestamp_to_rfc3339(connected_at),
            flushed
        );
        Some((tx, rx))
    }

    /// Transport error on the stream of `generation`. The close that always
    /// follows decides about reconnecting.
    pub(crate) fn on_error(&self, generation: u64, reason: &str) {
        let state = self.state();
        if state.generation == generation {
            tracing::warn!("Connection error: {}", reason);
        } else {
            tracing::debug!("Ignoring error of stale connection {}: {}", generation, reason);
        }
    }

    /// The stream of `generation` is gone
    pub(crate) fn on_close(self: &Arc<Self>, generation: u64, code: Option<u16>) {
        let mut state = self.state();
        if state.generation != generation || state.phase == Phase::Idle {
            tracing::debug!("Ignoring close of stale connection {}", generation);
            return;
        }

        state.phase = Phase::Idle;
        state.active = None;
        state.outbound = None;
        let deliberate = std::mem::take(&mut state.close_requested);
        let reopen_requested = std::mem::take(&mut state.reopen_requested);

        let mut reopen = false;
        if state.shut_down {
            tracing::info!("Connection closed after shutdown");
        } else if deliberate {
            tracing::info!("Connection closed");
            // connect() or attach() while the close was in flight
            reopen = reopen_requested || state.subscribers > 0;
        } else if is_normal_close(code) {
            tracing::info!("Server closed the connection normally, not reconnecting");
        } else {
            state.reconnect_attempts += 1;
            let attempt = state.reconnect_attempts;
            if should_attempt_reconnect(attempt, self.config.reconnect.max_attempts) {
                let delay = reconnect_delay(attempt, &self.config.reconnect);
                tracing::warn!(
                    "Connection lost (code {:?}), reconnecting in {:?} (attempt {})",
                    code,
                    delay,
                    attempt
                );
                state.reconnect_task =
                    Some(tokio::spawn(reconnect_due(Arc::downgrade(self), delay)));
            } else {
                tracing::error!(
                    "Connection lost (code {:?}), giving up after {} attempts",
                    code,
                    attempt - 1
                );
            }
        }
        self.status_tx.send_replace(false);
        drop(state);

        if reopen {
            self.connect();
        }
    }

    fn attach(&self) {
        self.state().subscribers += 1;
    }

    pub(crate) fn detach(&self) {
        let mut state = self.state();
        state.subscribers = state.subscribers.saturating_sub(1);
        if state.subscribers == 0 && !state.shut_down {
            tracing::info!("Last subscriber detached, closing connection");
            state.reopen_requested = false;
            state.cancel_reconnect();
            state.request_close();
        }
    }
}

async fn reconnect_due(inner: Weak<Inner>, delay: Duration) {
    tokio::time::sleep(delay).await;
    let Some(inner) = inner.upgrade() else {
        return;
    };
    // this task is finishing; nothing to abort any more
    inner.state().reconnect_task = None;
    let outcome = inner.connect();
    tracing::debug!("Scheduled reconnect: {:?}", outcome);
}

/// Owner of the single connection
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>, clock: Arc<dyn Clock>) -> Self {
        let (status_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                clock,
                state: Mutex::new(ConnectionState::new()),
                status_tx,
                store: SnapshotStore::new(),
            }),
        }
    }

    /// Open the connection unless it is already open or opening
    pub fn connect(&self) -> ConnectOutcome {
        self.inner.connect()
    }

    /// Register a consumer and make sure the connection is up
    pub fn attach(&self) -> Subscription {
        self.inner.attach();
        let outcome = self.connect();
        tracing::debug!("Subscriber attached: {:?}", outcome);
        Subscription::new(
            self.clone(),
            self.inner.status_tx.subscribe(),
            self.inner.store.subscribe_snapshot(),
            self.inner.store.subscribe_notifications(),
        )
    }

    pub(crate) fn detach(&self) {
        self.inner.detach();
    }

    /// Send a mutation, or queue it until the next open
    pub fn send(&self, message: OutboundMessage) -> Delivery {
        let mut state = self.inner.state();
        if state.phase == Phase::Open
            && let Some(tx) = &state.outbound
            && tx.send(Outgoing::Frame(message.clone())).is_ok()
        {
            return Delivery::Sent;
        }
        if message.is_ping() || state.shut_down {
            return Delivery::Dropped;
        }

        if state.pending.len() >= self.inner.config.max_pending_messages {
            state.pending.pop_front();
            tracing::warn!("Outbound queue full, dropped the oldest message");
        }
        tracing::debug!("Not connected, queued '{}'", message.r#type);
        state.pending.push_back(message);
        Delivery::Queued
    }

    /// Close normally and stop reconnecting for good
    pub fn shutdown(&self) {
        let mut state = self.inner.state();
        if state.shut_down {
            return;
        }
        tracing::info!("Shutting down connection manager");
        state.shut_down = true;
        state.cancel_reconnect();
        state.request_close();
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state().phase == Phase::Open
    }

    pub fn phase(&self) -> Phase {
        self.inner.state().phase
    }

    /// The live stream, cleared as soon as it closes
    pub fn active_handle(&self) -> Option<ActiveHandle> {
        self.inner.state().active
    }

    pub fn reconnect_scheduled(&self) -> bool {
        self.inner.state().reconnect_task.is_some()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state().reconnect_attempts
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state().subscribers
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state().pending.len()
    }

    /// Connection status updates
    pub fn status(&self) -> watch::Receiver<bool> {
        self.inner.status_tx.subscribe()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.store.current()
    }
}
