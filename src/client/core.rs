//! Transport client mediator.
//!
//! One [`TransportClient`] stands between any number of consumers and a
//! single transport worker. It hides the worker lifecycle and the
//! connection's backpressure from consumers:
//!
//! - The worker is created lazily on the first `connect`.
//! - Sends issued while not open are buffered and flushed in order on `open`.
//! - Inbound messages are recorded in the observable state and fanned out
//!   to subscribers in registration order, one handler panic isolated
//!   from the rest.
//! - After the last subscriber leaves, the worker is released once the
//!   idle delay passes without a new subscriber or connect.
//! - A worker that dies on its own is torn down and, if a connect was
//!   remembered, reconnected after the restart delay.
//!
//! No operation blocks or waits for the connection; progress is observed
//! through [`TransportClient::state`] or a subscription.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::codec::Inbound;
use crate::error::{Error, Result};
use crate::identifiers::{SubscriptionId, WorkerGeneration};
use crate::protocol::{LogLevel, Payload, WorkerCommand, WorkerEvent};
use crate::transport::{ConnectionConfig, SocketWorkerFactory, WorkerFactory, WorkerHandle};

use super::buffer::OutboundBuffer;
use super::options::ClientOptions;
use super::state::{ConnectionState, ConnectionStatus};

// ============================================================================
// Types
// ============================================================================

/// Subscriber callback.
pub type MessageHandler = Arc<dyn Fn(&Inbound) + Send + Sync>;

/// `tracing` target for log events forwarded from the worker.
pub const WORKER_LOG_TARGET: &str = "im_transport::worker";

// ============================================================================
// ClientDiagnostics
// ============================================================================

/// Point-in-time counters for debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDiagnostics {
    /// A worker is currently running.
    pub has_worker: bool,
    /// Registered subscribers.
    pub subscribers: usize,
    /// Payloads waiting in the outbound buffer.
    pub buffered: usize,
    /// Payloads rejected because the buffer was full.
    pub dropped: u64,
    /// An idle release timer is pending.
    pub idle_release_pending: bool,
}

// ============================================================================
// Internal State
// ============================================================================

/// A running worker as seen by the client.
struct ActiveWorker {
    generation: WorkerGeneration,
    commands: mpsc::UnboundedSender<WorkerCommand>,
    task: Option<JoinHandle<()>>,
    pump: JoinHandle<()>,
}

impl ActiveWorker {
    fn abort(self) {
        if let Some(task) = self.task {
            task.abort();
        }
        self.pump.abort();
    }
}

/// Arguments of the last `connect` call.
#[derive(Clone)]
struct ConnectArgs {
    config: ConnectionConfig,
    factory: Option<Arc<dyn WorkerFactory>>,
}

/// A spawned one-shot timer. The id guards against a stale firing.
struct Timer {
    id: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    worker: Option<ActiveWorker>,
    generation: WorkerGeneration,
    subscribers: BTreeMap<SubscriptionId, MessageHandler>,
    buffer: OutboundBuffer,
    dropped: u64,
    last_connect: Option<ConnectArgs>,
    idle_timer: Option<Timer>,
    restart_timer: Option<Timer>,
    next_timer_id: u64,
}

impl Inner {
    fn current_generation(&self) -> Option<WorkerGeneration> {
        self.worker.as_ref().map(|worker| worker.generation)
    }

    fn timer_id(&mut self) -> u64 {
        self.next_timer_id += 1;
        self.next_timer_id
    }

    fn cancel_idle_release(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.handle.abort();
            trace!("Idle release cancelled");
        }
    }

    fn cancel_restart(&mut self) {
        if let Some(timer) = self.restart_timer.take() {
            timer.handle.abort();
        }
    }

    /// Forwards a command to the worker, if one exists.
    fn post(&self, command: WorkerCommand) {
        let Some(worker) = self.worker.as_ref() else {
            return;
        };

        if worker.commands.send(command).is_err() {
            error!(generation = %worker.generation, "Worker postMessage failed");
        }
    }
}

struct Shared {
    runtime: Handle,
    factory: Arc<dyn WorkerFactory>,
    options: ClientOptions,
    state: watch::Sender<ConnectionState>,
    inner: Mutex<Inner>,
}

// ============================================================================
// TransportClient
// ============================================================================

/// Shared handle to the transport mediator.
///
/// Cloning is cheap; every clone drives the same worker and state.
///
/// # Example
///
/// ```no_run
/// use im_transport::{ClientOptions, ConnectionConfig, TransportClient};
/// use serde_json::json;
///
/// # async fn run() -> im_transport::Result<()> {
/// let client = TransportClient::tungstenite(ClientOptions::default())?;
///
/// let _subscription = client.subscribe(|message| {
///     println!("inbound: {message:?}");
/// });
///
/// client.connect(ConnectionConfig::new("wss://im.example/ws").with_payload(json!({ "code": 100 })));
/// client.send(json!({ "code": 1000, "data": { "text": "hi" } }));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TransportClient {
    shared: Arc<Shared>,
}

// ============================================================================
// TransportClient - Constructors
// ============================================================================

impl TransportClient {
    /// Creates a client on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] when called outside a tokio runtime.
    pub fn new(factory: impl WorkerFactory, options: ClientOptions) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::runtime(e.to_string()))?;
        Ok(Self::with_runtime(runtime, factory, options))
    }

    /// Creates a client that opens real WebSocket connections.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] when called outside a tokio runtime.
    pub fn tungstenite(options: ClientOptions) -> Result<Self> {
        Self::new(SocketWorkerFactory::tungstenite(), options)
    }

    /// Creates a client bound to an explicit runtime.
    ///
    /// Its methods may then be called from any thread.
    #[must_use]
    pub fn with_runtime(
        runtime: Handle,
        factory: impl WorkerFactory,
        options: ClientOptions,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::new(options.history_capacity));

        let inner = Inner {
            worker: None,
            generation: WorkerGeneration::default(),
            subscribers: BTreeMap::new(),
            buffer: OutboundBuffer::new(options.buffer_capacity),
            dropped: 0,
            last_connect: None,
            idle_timer: None,
            restart_timer: None,
            next_timer_id: 0,
        };

        Self {
            shared: Arc::new(Shared {
                runtime,
                factory: Arc::new(factory),
                options,
                state,
                inner: Mutex::new(inner),
            }),
        }
    }
}

// ============================================================================
// TransportClient - Operations
// ============================================================================

impl TransportClient {
    /// Connects with the client's worker factory.
    ///
    /// Returns immediately; the status becomes `connecting`.
    pub fn connect(&self, config: ConnectionConfig) {
        self.shared.connect(config, None);
    }

    /// Connects, creating the worker with `factory` if none is running.
    pub fn connect_with(&self, config: ConnectionConfig, factory: Arc<dyn WorkerFactory>) {
        self.shared.connect(config, Some(factory));
    }

    /// Sends a payload, or buffers it while the connection is not open.
    ///
    /// A payload that does not fit in a full buffer is dropped with a warning.
    pub fn send(&self, payload: impl Into<Payload>) {
        self.shared.send(payload.into());
    }

    /// Closes the connection without releasing the worker.
    ///
    /// Buffered payloads are kept for the next open.
    pub fn disconnect(&self) {
        let inner = self.shared.inner.lock();
        inner.post(WorkerCommand::Disconnect);
        self.shared.state.send_modify(|state| {
            state.status = ConnectionStatus::Closed;
            state.connected = false;
        });
    }

    /// Releases everything: subscribers, worker, remembered connect and history.
    pub fn destroy(&self) {
        let subscribers = {
            let mut inner = self.shared.inner.lock();
            let subscribers = std::mem::take(&mut inner.subscribers);
            inner.cancel_idle_release();
            inner.cancel_restart();
            self.shared.terminate_worker(&mut inner);
            inner.last_connect = None;
            self.shared.state.send_modify(|state| state.messages.clear());
            subscribers
        };

        debug!(subscribers = subscribers.len(), "Transport client destroyed");
    }

    /// Registers a handler for inbound messages.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// dropped or unsubscribed.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();

        let mut inner = self.shared.inner.lock();
        inner.subscribers.insert(id, Arc::new(handler));
        inner.cancel_idle_release();
        trace!(%id, count = inner.subscribers.len(), "Subscriber added");

        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }
}

// ============================================================================
// TransportClient - Observation
// ============================================================================

impl TransportClient {
    /// Returns a receiver that observes every state change.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    /// Returns the current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.shared.state.borrow().status
    }

    /// Returns debugging counters.
    #[must_use]
    pub fn diagnostics(&self) -> ClientDiagnostics {
        let inner = self.shared.inner.lock();
        ClientDiagnostics {
            has_worker: inner.worker.is_some(),
            subscribers: inner.subscribers.len(),
            buffered: inner.buffer.len(),
            dropped: inner.dropped,
            idle_release_pending: inner.idle_timer.is_some(),
        }
    }

    /// Returns the client options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.shared.options
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Keeps a handler registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: SubscriptionId,
    shared: Weak<Shared>,
}

impl Subscription {
    /// Returns the subscription id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Removes the handler now.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove_subscriber(self.id);
        }
    }
}

// ============================================================================
// Shared - Operations
// ============================================================================

impl Shared {
    fn connect(self: &Arc<Self>, config: ConnectionConfig, factory: Option<Arc<dyn WorkerFactory>>) {
        let mut inner = self.inner.lock();

        inner.last_connect = Some(ConnectArgs {
            config: config.clone(),
            factory: factory.clone(),
        });
        inner.cancel_idle_release();

        let factory = factory.unwrap_or_else(|| Arc::clone(&self.factory));
        self.ensure_worker(&mut inner, factory.as_ref());

        self.state
            .send_modify(|state| state.status = ConnectionStatus::Connecting);
        debug!(url = %config.url, protocol = %config.protocol, "Connecting");

        inner.post(WorkerCommand::Connect(config.to_command()));
    }

    fn send(&self, payload: Payload) {
        let mut inner = self.inner.lock();
        let open = self.state.borrow().is_open();

        if open && inner.worker.is_some() {
            inner.post(WorkerCommand::send(payload));
            return;
        }

        if inner.buffer.push(payload).is_err() {
            inner.dropped += 1;
            warn!(
                capacity = inner.buffer.capacity(),
                dropped = inner.dropped,
                "Buffer full, dropping message"
            );
        }
    }

    fn remove_subscriber(self: &Arc<Self>, id: SubscriptionId) {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.subscribers.remove(&id);
            if removed.is_some() {
                trace!(%id, count = inner.subscribers.len(), "Subscriber removed");
                self.schedule_idle_release(&mut inner);
            }
            removed
        };
        drop(removed);
    }

    // ========================================================================
    // Worker Lifecycle
    // ========================================================================

    fn ensure_worker(self: &Arc<Self>, inner: &mut Inner, factory: &dyn WorkerFactory) {
        if inner.worker.is_some() {
            return;
        }

        let generation = inner.generation.next();
        inner.generation = generation;

        let WorkerHandle {
            commands,
            events,
            task,
        } = {
            let _guard = self.runtime.enter();
            factory.spawn()
        };

        let pump = self
            .runtime
            .spawn(pump_events(Arc::downgrade(self), generation, events));

        inner.worker = Some(ActiveWorker {
            generation,
            commands,
            task,
            pump,
        });

        debug!(%generation, "Worker started");
    }

    /// Stops the worker and resets the connection fields of the state.
    fn terminate_worker(&self, inner: &mut Inner) {
        if let Some(worker) = inner.worker.take() {
            debug!(generation = %worker.generation, "Worker terminated");
            worker.abort();
        }

        inner.buffer.clear();
        self.state.send_modify(|state| {
            state.connected = false;
            state.status = ConnectionStatus::Closed;
        });
    }

    fn schedule_idle_release(self: &Arc<Self>, inner: &mut Inner) {
        if !inner.subscribers.is_empty() || inner.idle_timer.is_some() {
            return;
        }

        let id = inner.timer_id();
        let delay = self.options.idle_release;
        let shared = Arc::downgrade(self);

        let handle = self.runtime.spawn(async move {
            sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.idle_release_due(id);
            }
        });

        inner.idle_timer = Some(Timer { id, handle });
        trace!(delay_ms = delay.as_millis(), "Idle release scheduled");
    }

    fn idle_release_due(&self, id: u64) {
        let mut inner = self.inner.lock();
        if inner.idle_timer.as_ref().map(|timer| timer.id) != Some(id) {
            return;
        }
        inner.idle_timer = None;

        if inner.subscribers.is_empty() {
            self.terminate_worker(&mut inner);
            info!("Worker auto-released");
        }
    }

    fn schedule_restart(self: &Arc<Self>, inner: &mut Inner) {
        inner.cancel_restart();

        let id = inner.timer_id();
        let delay = self.options.restart_delay;
        let shared = Arc::downgrade(self);

        let handle = self.runtime.spawn(async move {
            sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.restart_due(id);
            }
        });

        inner.restart_timer = Some(Timer { id, handle });
        info!(delay_ms = delay.as_millis(), "Worker restart scheduled");
    }

    fn restart_due(self: &Arc<Self>, id: u64) {
        let args = {
            let mut inner = self.inner.lock();
            if inner.restart_timer.as_ref().map(|timer| timer.id) != Some(id) {
                return;
            }
            inner.restart_timer = None;
            inner.last_connect.clone()
        };

        if let Some(ConnectArgs { config, factory }) = args {
            self.connect(config, factory);
        }
    }

    // ========================================================================
    // Worker Events
    // ========================================================================

    fn handle_worker_event(&self, generation: WorkerGeneration, event: WorkerEvent) {
        if let WorkerEvent::Log { level, .. } = &event {
            forward_log(*level, &event.log_line().unwrap_or_default());
            return;
        }

        let mut inner = self.inner.lock();
        if inner.current_generation() != Some(generation) {
            trace!(%generation, kind = event.kind(), "Ignoring event from stale worker");
            return;
        }

        match event {
            WorkerEvent::Open => {
                self.state.send_modify(|state| {
                    state.status = ConnectionStatus::Open;
                    state.connected = true;
                    state.error = None;
                });

                let pending = inner.buffer.drain();
                if !pending.is_empty() {
                    debug!(count = pending.len(), "Flushing outbound buffer");
                }
                for payload in pending {
                    inner.post(WorkerCommand::send(payload));
                }
            }

            WorkerEvent::Message { data } => {
                self.state.send_modify(|state| state.record(&data));

                let handlers: Vec<MessageHandler> = inner.subscribers.values().cloned().collect();
                drop(inner);
                fan_out(&data, &handlers);
            }

            WorkerEvent::Error { error } => {
                self.state.send_modify(|state| {
                    state.error = Some(error);
                    state.status = ConnectionStatus::Error;
                });
            }

            WorkerEvent::Close { code, .. } => {
                trace!(?code, "Worker reported close");
                self.state.send_modify(|state| state.connected = false);
            }

            WorkerEvent::Log { .. } => {}
        }
    }

    /// Handles the event stream of a worker ending.
    ///
    /// Only the current generation counts; workers the client terminated
    /// itself are already detached.
    fn handle_worker_exit(self: &Arc<Self>, generation: WorkerGeneration) {
        let mut inner = self.inner.lock();
        if inner.current_generation() != Some(generation) {
            return;
        }

        error!(%generation, "Worker process error");
        self.state.send_modify(|state| {
            state.status = ConnectionStatus::Error;
            state.error = Some("transport worker exited unexpectedly".to_owned());
        });

        self.terminate_worker(&mut inner);
        if inner.last_connect.is_some() {
            self.schedule_restart(&mut inner);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(worker) = inner.worker.take() {
            worker.abort();
        }
        inner.cancel_idle_release();
        inner.cancel_restart();
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Delivers worker events to the client until the worker's stream ends.
async fn pump_events(
    shared: Weak<Shared>,
    generation: WorkerGeneration,
    mut events: mpsc::UnboundedReceiver<WorkerEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        shared.handle_worker_event(generation, event);
    }

    if let Some(shared) = shared.upgrade() {
        shared.handle_worker_exit(generation);
    }
}

/// Calls every handler in order; a panicking handler is logged and skipped.
fn fan_out(message: &Inbound, handlers: &[MessageHandler]) {
    for handler in handlers {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(message))) {
            error!(panic = panic_message(panic.as_ref()), "Subscriber error");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn forward_log(level: LogLevel, line: &str) {
    match level {
        LogLevel::Debug => debug!(target: WORKER_LOG_TARGET, "{line}"),
        LogLevel::Info => info!(target: WORKER_LOG_TARGET, "{line}"),
        LogLevel::Warn => warn!(target: WORKER_LOG_TARGET, "{line}"),
        LogLevel::Error => error!(target: WORKER_LOG_TARGET, "{line}"),
    }
}

// ============================================================================
// Tests
// ============================================================================
