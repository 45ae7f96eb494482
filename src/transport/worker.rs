//! Transport worker actor.
//!
//! The worker owns the physical socket, the heartbeat timer, the
//! reconnect timer and the codec. It runs as its own tokio task and
//! talks to its host only through two channels: [`WorkerCommand`]s in,
//! [`WorkerEvent`]s out.
//!
//! # State Machine
//!
//! ```text
//!  Idle ──connect──► Connecting ──open──► Open ──close──► Closed
//!                        ▲                                  │
//!                        └──── reconnect timer (backoff) ◄──┘
//! ```
//!
//! - `connect` stores the config, clears the explicit-disconnect flag and
//!   resets the attempt counter.
//! - On open the attempt counter resets, the protocol is negotiated, the
//!   initial payload is sent, the heartbeat starts and `open` is emitted.
//! - Every close tears down both timers and the socket, then schedules a
//!   reconnect unless the disconnect was explicit or the attempt limit
//!   was reached.
//!
//! Nothing is returned to the host as an error: failures become `log`
//! and `error` events.

// ============================================================================
// Imports
// ============================================================================

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep, interval_at, sleep};
use tracing::{debug, trace};

use crate::codec::{self, Frame};
use crate::error::{Error, Result};
use crate::protocol::{LogLevel, Payload, Protocol, SendOptions, WorkerCommand, WorkerEvent};

use super::backoff::ReconnectPolicy;
use super::config::ConnectionConfig;
use super::socket::{CLOSE_ABNORMAL, Connector, Socket, SocketEvent, TungsteniteConnector};

// ============================================================================
// Types
// ============================================================================

/// A connect attempt in flight.
type PendingConnect = BoxFuture<'static, Result<Box<dyn Socket>>>;

/// Text of the `error` event emitted for socket failures.
const SOCKET_ERROR: &str = "WebSocket connection error";

// ============================================================================
// WorkerHandle
// ============================================================================

/// The host side of a running worker.
pub struct WorkerHandle {
    /// Command channel into the worker.
    pub commands: mpsc::UnboundedSender<WorkerCommand>,
    /// Event channel out of the worker.
    pub events: mpsc::UnboundedReceiver<WorkerEvent>,
    /// The worker task, if it runs on this runtime.
    pub task: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Posts a command to the worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerUnavailable`] if the worker has exited.
    pub fn post(&self, command: WorkerCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::WorkerUnavailable)
    }
}

// ============================================================================
// WorkerFactory
// ============================================================================

/// Creates workers for a [`crate::TransportClient`].
///
/// Called from within the client's runtime context.
pub trait WorkerFactory: Send + Sync + 'static {
    /// Starts a fresh worker.
    fn spawn(&self) -> WorkerHandle;
}

/// Factory for socket-backed [`TransportWorker`]s.
#[derive(Clone)]
pub struct SocketWorkerFactory {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
}

impl SocketWorkerFactory {
    /// Creates a factory around a connector.
    #[must_use]
    pub fn new(connector: impl Connector) -> Self {
        Self {
            connector: Arc::new(connector),
            policy: ReconnectPolicy::default(),
        }
    }

    /// Creates a factory that opens real WebSocket connections.
    #[must_use]
    pub fn tungstenite() -> Self {
        Self::new(TungsteniteConnector)
    }

    /// Overrides the reconnect policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl WorkerFactory for SocketWorkerFactory {
    fn spawn(&self) -> WorkerHandle {
        TransportWorker::spawn(Arc::clone(&self.connector), self.policy)
    }
}

// ============================================================================
// TransportWorker
// ============================================================================

/// The socket-owning actor.
pub struct TransportWorker {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    events: mpsc::UnboundedSender<WorkerEvent>,

    /// Stored until an explicit disconnect; reused by every reconnect.
    config: Option<ConnectionConfig>,
    socket: Option<Box<dyn Socket>>,
    connecting: Option<PendingConnect>,

    heartbeat: Option<Interval>,
    reconnect: Option<Pin<Box<Sleep>>>,

    reconnect_attempts: u32,
    explicitly_disconnected: bool,
    active_protocol: Protocol,
}

impl TransportWorker {
    fn new(
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Self {
        Self {
            connector,
            policy,
            events,
            config: None,
            socket: None,
            connecting: None,
            heartbeat: None,
            reconnect: None,
            reconnect_attempts: 0,
            explicitly_disconnected: false,
            active_protocol: Protocol::default(),
        }
    }

    /// Spawns a worker task on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> WorkerHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let worker = Self::new(connector, policy, event_tx);
        let task = tokio::spawn(worker.run(command_rx));

        WorkerHandle {
            commands: command_tx,
            events: event_rx,
            task: Some(task),
        }
    }

    /// Worker event loop. Exits when the command channel closes.
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<WorkerCommand>) {
        self.log(LogLevel::Info, "Worker Ready");

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("Command channel closed");
                        break;
                    }
                },

                outcome = connect_outcome(&mut self.connecting) => {
                    self.handle_connect_outcome(outcome).await;
                }

                event = next_socket_event(&mut self.socket) => {
                    self.handle_socket_event(event).await;
                }

                () = heartbeat_tick(&mut self.heartbeat) => {
                    self.send_heartbeat().await;
                }

                () = reconnect_due(&mut self.reconnect) => {
                    self.fire_reconnect().await;
                }
            }
        }

        self.cleanup().await;
        debug!("Worker terminated");
    }

    // ========================================================================
    // Commands
    // ========================================================================

    async fn handle_command(&mut self, command: WorkerCommand) {
        trace!(kind = command.kind(), "Worker command");

        match command {
            WorkerCommand::Connect(connect) => {
                self.config = Some(connect.into());
                self.explicitly_disconnected = false;
                self.reconnect_attempts = 0;
                self.connect().await;
            }

            WorkerCommand::Send { payload, options } => {
                self.send(payload, options.unwrap_or_default()).await;
            }

            WorkerCommand::Disconnect => {
                self.explicitly_disconnected = true;
                self.config = None;
                self.log(LogLevel::Info, "Disconnected by user");
                self.cleanup().await;
            }
        }
    }

    // ========================================================================
    // Connection Lifecycle
    // ========================================================================

    /// Starts a connect attempt with the stored config.
    async fn connect(&mut self) {
        self.cleanup().await;

        let Some(config) = self.config.as_ref() else {
            return;
        };

        let url = config.url.clone();
        let protocol = config.protocol;
        self.log(LogLevel::Info, format!("Connecting to {url} [{protocol}]"));

        let connector = Arc::clone(&self.connector);
        self.connecting = Some(Box::pin(async move {
            connector.connect(&url, protocol).await
        }));
    }

    async fn handle_connect_outcome(&mut self, outcome: Result<Box<dyn Socket>>) {
        match outcome {
            Ok(socket) => self.handle_open(socket).await,
            Err(e) => {
                self.log_parts(
                    LogLevel::Error,
                    vec![Value::from("WebSocket Error"), Value::from(e.to_string())],
                );
                self.emit(WorkerEvent::Error {
                    error: SOCKET_ERROR.to_owned(),
                });
                self.handle_close(Some(CLOSE_ABNORMAL), String::new()).await;
            }
        }
    }

    async fn handle_open(&mut self, mut socket: Box<dyn Socket>) {
        let Some(config) = self.config.clone() else {
            socket.close().await;
            return;
        };

        self.reconnect_attempts = 0;
        self.active_protocol = Protocol::negotiate(socket.protocol(), config.protocol);
        self.socket = Some(socket);

        self.log(
            LogLevel::Info,
            format!("Connected. Protocol: {}", self.active_protocol),
        );

        if let Some(payload) = &config.payload {
            self.send_data(payload, None).await;
        }

        self.start_heartbeat(config.heartbeat_period());
        self.emit(WorkerEvent::Open);
    }

    async fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Frame(frame) => {
                trace!(len = frame.len(), "Inbound frame");
                self.emit(WorkerEvent::Message {
                    data: codec::decode(frame),
                });
            }

            SocketEvent::Error(message) => {
                self.log_parts(
                    LogLevel::Error,
                    vec![Value::from("WebSocket Error"), Value::from(message)],
                );
                self.emit(WorkerEvent::Error {
                    error: SOCKET_ERROR.to_owned(),
                });
            }

            SocketEvent::Closed { code, reason } => self.handle_close(code, reason).await,
        }
    }

    async fn handle_close(&mut self, code: Option<u16>, reason: String) {
        let shown = code.map_or_else(|| "-".to_owned(), |code| code.to_string());
        self.log(
            LogLevel::Warn,
            format!("WebSocket Closed: {shown} - {reason}"),
        );
        self.emit(WorkerEvent::Close {
            code,
            reason: Some(reason),
        });

        self.cleanup().await;
        self.schedule_reconnect();
    }

    /// Stops both timers and closes the socket without emitting events.
    async fn cleanup(&mut self) {
        self.heartbeat = None;
        self.reconnect = None;
        self.connecting = None;

        if let Some(mut socket) = self.socket.take() {
            socket.close().await;
        }
    }

    // ========================================================================
    // Reconnect
    // ========================================================================

    fn schedule_reconnect(&mut self) {
        if self.explicitly_disconnected || self.config.is_none() {
            return;
        }

        if !self.policy.allows(self.reconnect_attempts) {
            self.log(LogLevel::Error, "Max reconnect attempts reached");
            return;
        }

        let delay = self.policy.delay_for(self.reconnect_attempts);
        self.log(
            LogLevel::Info,
            format!(
                "Reconnecting in {}ms (attempt {})",
                delay.as_millis(),
                self.reconnect_attempts + 1
            ),
        );

        self.reconnect = Some(Box::pin(sleep(delay)));
    }

    async fn fire_reconnect(&mut self) {
        self.reconnect_attempts += 1;
        self.connect().await;
    }

    // ========================================================================
    // Heartbeat
    // ========================================================================

    fn start_heartbeat(&mut self, period: Option<Duration>) {
        self.heartbeat = period.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
    }

    /// Sends the heartbeat payload. No reply is expected or tracked.
    async fn send_heartbeat(&mut self) {
        if !self.is_open() {
            return;
        }

        let Some(heartbeat) = self.config.as_ref().map(|c| c.heartbeat.clone()) else {
            return;
        };
        self.send_data(&heartbeat, None).await;
    }

    // ========================================================================
    // Sending
    // ========================================================================

    fn is_open(&self) -> bool {
        self.socket.as_ref().is_some_and(|socket| socket.is_open())
    }

    async fn send(&mut self, payload: Payload, options: SendOptions) {
        if !self.is_open() {
            self.log(LogLevel::Warn, "Cannot send: WebSocket not open");
            return;
        }

        if options.send_as_raw_bytes {
            self.transmit(codec::encode_raw(&payload), "Raw send failed")
                .await;
        } else {
            self.send_data(&payload, options.protocol).await;
        }
    }

    async fn send_data(&mut self, payload: &Payload, protocol: Option<Protocol>) {
        let protocol = protocol.unwrap_or(self.active_protocol);

        match codec::encode(payload, protocol) {
            Ok(frame) => self.transmit(frame, "Send failed").await,
            Err(e) => self.log_parts(
                LogLevel::Error,
                vec![Value::from("Send failed"), Value::from(e.to_string())],
            ),
        }
    }

    async fn transmit(&mut self, frame: Frame, failure: &str) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };

        let result = socket.send(frame).await;
        if let Err(e) = result {
            self.log_parts(
                LogLevel::Error,
                vec![Value::from(failure), Value::from(e.to_string())],
            );
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    fn emit(&self, event: WorkerEvent) {
        let _ = self.events.send(event);
    }

    fn log(&self, level: LogLevel, msg: impl Into<String>) {
        self.emit(WorkerEvent::log(level, msg));
    }

    fn log_parts(&self, level: LogLevel, msg: Vec<Value>) {
        self.emit(WorkerEvent::Log { level, msg });
    }
}

// ============================================================================
// Select Helpers
// ============================================================================

// Each helper pends forever when its resource is absent.

async fn connect_outcome(connecting: &mut Option<PendingConnect>) -> Result<Box<dyn Socket>> {
    match connecting.as_mut() {
        Some(future) => {
            let outcome = future.await;
            *connecting = None;
            outcome
        }
        None => pending().await,
    }
}

async fn next_socket_event(socket: &mut Option<Box<dyn Socket>>) -> SocketEvent {
    match socket.as_mut() {
        Some(socket) => socket.next_event().await,
        None => pending().await,
    }
}

async fn heartbeat_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat.as_mut() {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending().await,
    }
}

async fn reconnect_due(reconnect: &mut Option<Pin<Box<Sleep>>>) {
    match reconnect.as_mut() {
        Some(timer) => {
            timer.as_mut().await;
            *reconnect = None;
        }
        None => pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use prost::Message;
    use serde_json::json;

    use crate::codec::{Envelope, Inbound};

    // ------------------------------------------------------------------------
    // In-memory sockets
    // ------------------------------------------------------------------------

    struct MockLink {
        url: String,
        requested: Protocol,
        sent: mpsc::UnboundedReceiver<Frame>,
        inject: mpsc::UnboundedSender<SocketEvent>,
    }

    struct MockSocket {
        protocol: Option<String>,
        sent: mpsc::UnboundedSender<Frame>,
        incoming: mpsc::UnboundedReceiver<SocketEvent>,
        open: bool,
    }

    #[async_trait]
    impl Socket for MockSocket {
        fn protocol(&self) -> Option<&str> {
            self.protocol.as_deref()
        }

        fn is_open(&self) -> bool {
            self.open
        }

        async fn send(&mut self, frame: Frame) -> Result<()> {
            self.sent.send(frame).map_err(|_| Error::ConnectionClosed)
        }

        async fn next_event(&mut self) -> SocketEvent {
            match self.incoming.recv().await {
                Some(event) => {
                    if matches!(event, SocketEvent::Closed { .. }) {
                        self.open = false;
                    }
                    event
                }
                None => pending().await,
            }
        }

        async fn close(&mut self) {
            self.open = false;
        }
    }

    struct MockConnector {
        negotiated: Option<String>,
        refuse: bool,
        links: mpsc::UnboundedSender<MockLink>,
        attempts: Arc<Mutex<Vec<Instant>>>,
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, url: &str, protocol: Protocol) -> Result<Box<dyn Socket>> {
            self.attempts.lock().push(Instant::now());
            if self.refuse {
                return Err(Error::connection("connection refused"));
            }

            let (sent_tx, sent_rx) = mpsc::unbounded_channel();
            let (inject_tx, inject_rx) = mpsc::unbounded_channel();
            let _ = self.links.send(MockLink {
                url: url.to_owned(),
                requested: protocol,
                sent: sent_rx,
                inject: inject_tx,
            });

            Ok(Box::new(MockSocket {
                protocol: self.negotiated.clone(),
                sent: sent_tx,
                incoming: inject_rx,
                open: true,
            }))
        }
    }

    struct Harness {
        connector: Arc<dyn Connector>,
        links: mpsc::UnboundedReceiver<MockLink>,
        attempts: Arc<Mutex<Vec<Instant>>>,
    }

    fn harness(negotiated: Option<&str>, refuse: bool) -> Harness {
        let (links_tx, links) = mpsc::unbounded_channel();
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let connector = MockConnector {
            negotiated: negotiated.map(str::to_owned),
            refuse,
            links: links_tx,
            attempts: Arc::clone(&attempts),
        };

        Harness {
            connector: Arc::new(connector),
            links,
            attempts,
        }
    }

    fn connect_command(config: ConnectionConfig) -> WorkerCommand {
        WorkerCommand::Connect(config.to_command())
    }

    fn decode_envelope(frame: Frame) -> Envelope {
        match frame {
            Frame::Binary(bytes) => Envelope::decode(bytes.as_slice()).unwrap(),
            Frame::Text(text) => panic!("expected binary frame, got text {text:?}"),
        }
    }

    async fn next_non_log(events: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> WorkerEvent {
        loop {
            let event = events.recv().await.unwrap();
            if !matches!(event, WorkerEvent::Log { .. }) {
                return event;
            }
        }
    }

    async fn wait_for_log(events: &mut mpsc::UnboundedReceiver<WorkerEvent>, line: &str) {
        loop {
            let event = events.recv().await.unwrap();
            if event.log_line().as_deref() == Some(line) {
                return;
            }
        }
    }

    fn drain_logs(events: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let Some(line) = event.log_line() {
                lines.push(line);
            }
        }
        lines
    }

    /// Builds an unspawned worker and drives it to the open state.
    async fn open_worker(
        negotiated: Option<&str>,
        config: ConnectionConfig,
    ) -> (TransportWorker, mpsc::UnboundedReceiver<WorkerEvent>, MockLink) {
        let mut harness = harness(negotiated, false);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut worker = TransportWorker::new(
            Arc::clone(&harness.connector),
            ReconnectPolicy::default(),
            event_tx,
        );

        worker.handle_command(connect_command(config)).await;
        let outcome = connect_outcome(&mut worker.connecting).await;
        worker.handle_connect_outcome(outcome).await;

        let link = harness.links.recv().await.unwrap();
        (worker, event_rx, link)
    }

    // ------------------------------------------------------------------------
    // Open and heartbeat
    // ------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_initial_payload_precedes_first_heartbeat() {
        let mut harness = harness(Some("proto"), false);
        let mut handle =
            TransportWorker::spawn(Arc::clone(&harness.connector), ReconnectPolicy::default());

        let config = ConnectionConfig::new("wss://x")
            .with_payload(json!({ "hello": 1 }))
            .with_interval(Duration::from_millis(1000));
        handle.post(connect_command(config)).unwrap();

        let mut link = harness.links.recv().await.unwrap();
        assert_eq!(link.requested, Protocol::Proto);
        let opened = Instant::now();

        let first = decode_envelope(link.sent.recv().await.unwrap());
        assert!(opened.elapsed() < Duration::from_millis(1000));
        let data = crate::codec::DecodedEnvelope::from(first).data.unwrap();
        assert_eq!(data.to_json(), Some(json!({ "hello": 1 })));

        assert_eq!(next_non_log(&mut handle.events).await, WorkerEvent::Open);

        let heartbeat = decode_envelope(link.sent.recv().await.unwrap());
        assert!(opened.elapsed() >= Duration::from_millis(1000));
        assert!(heartbeat.data.is_none());
        assert!(link.sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_negotiated_protocol_overrides_preferred() {
        let config = ConnectionConfig::new("ws://h")
            .with_payload(json!({ "a": 1 }))
            .with_interval(Duration::ZERO);
        let (worker, _events, mut link) = open_worker(Some("im.json.v1"), config).await;

        assert_eq!(worker.active_protocol, Protocol::Json);
        assert_eq!(link.sent.recv().await, Some(Frame::Text(r#"{"a":1}"#.into())));
    }

    #[tokio::test]
    async fn test_missing_sub_protocol_uses_preferred() {
        let config = ConnectionConfig::new("ws://h")
            .with_protocol(Protocol::Json)
            .with_interval(Duration::ZERO);
        let (worker, _events, _link) = open_worker(None, config).await;

        assert_eq!(worker.active_protocol, Protocol::Json);
        assert!(worker.heartbeat.is_none());
    }

    #[tokio::test]
    async fn test_open_resets_attempt_counter() {
        let config = ConnectionConfig::new("ws://h").with_interval(Duration::ZERO);
        let (mut worker, _events, _link) = open_worker(None, config).await;

        worker.reconnect_attempts = 4;
        worker.fire_reconnect().await;
        assert_eq!(worker.reconnect_attempts, 5);

        let outcome = connect_outcome(&mut worker.connecting).await;
        worker.handle_connect_outcome(outcome).await;
        assert_eq!(worker.reconnect_attempts, 0);
    }

    // ------------------------------------------------------------------------
    // Close and reconnect
    // ------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_abnormal_close_schedules_first_reconnect() {
        let config = ConnectionConfig::new("ws://h").with_interval(Duration::from_secs(5));
        let (mut worker, mut events, _link) = open_worker(None, config).await;
        assert!(worker.heartbeat.is_some());

        worker
            .handle_socket_event(SocketEvent::Closed {
                code: Some(1006),
                reason: String::new(),
            })
            .await;

        assert!(worker.socket.is_none());
        assert!(worker.heartbeat.is_none());
        assert_eq!(worker.reconnect_attempts, 0);

        let started = Instant::now();
        let deadline = worker.reconnect.as_ref().unwrap().deadline();
        assert_eq!(deadline - started, Duration::from_millis(1000));

        reconnect_due(&mut worker.reconnect).await;
        assert!(started.elapsed() >= Duration::from_millis(1000));

        worker.fire_reconnect().await;
        assert_eq!(worker.reconnect_attempts, 1);
        assert!(worker.connecting.is_some());

        let lines = drain_logs(&mut events);
        assert!(lines.contains(&"WebSocket Closed: 1006 - ".to_owned()));
        assert!(lines.contains(&"Reconnecting in 1000ms (attempt 1)".to_owned()));
    }

    #[tokio::test]
    async fn test_close_after_disconnect_does_not_reconnect() {
        let config = ConnectionConfig::new("ws://h").with_interval(Duration::ZERO);
        let (mut worker, mut events, _link) = open_worker(None, config).await;

        worker.handle_command(WorkerCommand::Disconnect).await;
        assert!(worker.explicitly_disconnected);
        assert!(worker.socket.is_none());

        worker
            .handle_socket_event(SocketEvent::Closed {
                code: Some(1000),
                reason: "bye".into(),
            })
            .await;

        assert!(worker.reconnect.is_none());
        let lines = drain_logs(&mut events);
        assert!(lines.contains(&"Disconnected by user".to_owned()));
        assert!(!lines.iter().any(|line| line.starts_with("Reconnecting")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_reuses_stored_config() {
        let mut harness = harness(Some("proto"), false);
        let mut handle =
            TransportWorker::spawn(Arc::clone(&harness.connector), ReconnectPolicy::default());

        let config = ConnectionConfig::new("ws://h/im")
            .with_payload(json!({ "code": 100, "token": "t" }))
            .with_interval(Duration::ZERO);
        handle.post(connect_command(config)).unwrap();

        let mut first = harness.links.recv().await.unwrap();
        assert_eq!(decode_envelope(first.sent.recv().await.unwrap()).token, "t");
        assert_eq!(next_non_log(&mut handle.events).await, WorkerEvent::Open);

        let closed_at = Instant::now();
        first
            .inject
            .send(SocketEvent::Closed {
                code: Some(1006),
                reason: String::new(),
            })
            .unwrap();
        assert_eq!(
            next_non_log(&mut handle.events).await,
            WorkerEvent::Close {
                code: Some(1006),
                reason: Some(String::new())
            }
        );

        let mut second = harness.links.recv().await.unwrap();
        assert!(closed_at.elapsed() >= Duration::from_millis(1000));
        assert_eq!(second.url, "ws://h/im");
        let resent = decode_envelope(second.sent.recv().await.unwrap());
        assert_eq!((resent.code, resent.token.as_str()), (100, "t"));
        assert_eq!(next_non_log(&mut handle.events).await, WorkerEvent::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_connections_back_off_and_stop_after_ten() {
        let harness = harness(None, true);
        let mut handle =
            TransportWorker::spawn(Arc::clone(&harness.connector), ReconnectPolicy::default());

        handle
            .post(connect_command(ConnectionConfig::new("ws://down")))
            .unwrap();
        wait_for_log(&mut handle.events, "Max reconnect attempts reached").await;

        let attempts = harness.attempts.lock().clone();
        assert_eq!(attempts.len(), 11);

        let policy = ReconnectPolicy::default();
        for (n, pair) in attempts.windows(2).enumerate() {
            let gap = pair[1] - pair[0];
            let expected = policy.delay_for(u32::try_from(n).unwrap());
            assert!(gap >= expected, "attempt {} came after {gap:?}", n + 1);
        }

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(harness.attempts.lock().len(), 11);

        let fresh_at = Instant::now();
        handle
            .post(connect_command(ConnectionConfig::new("ws://down")))
            .unwrap();
        wait_for_log(&mut handle.events, "Reconnecting in 1000ms (attempt 1)").await;

        let attempts = harness.attempts.lock().clone();
        assert_eq!(attempts.len(), 12);
        assert!(attempts[11] - fresh_at < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_connect_replaces_config() {
        let mut harness = harness(Some("proto"), false);
        let mut handle =
            TransportWorker::spawn(Arc::clone(&harness.connector), ReconnectPolicy::default());

        let first_config = ConnectionConfig::new("ws://a/im")
            .with_payload(json!({ "token": "a" }))
            .with_interval(Duration::from_secs(1));
        handle.post(connect_command(first_config)).unwrap();

        let mut first = harness.links.recv().await.unwrap();
        assert_eq!(decode_envelope(first.sent.recv().await.unwrap()).token, "a");
        assert_eq!(next_non_log(&mut handle.events).await, WorkerEvent::Open);

        let second_config = ConnectionConfig::new("ws://b/im")
            .with_payload(json!({ "token": "b" }))
            .with_heartbeat(json!({ "code": 101 }))
            .with_interval(Duration::from_secs(2));
        handle.post(connect_command(second_config)).unwrap();

        let mut second = harness.links.recv().await.unwrap();
        assert_eq!(second.url, "ws://b/im");
        let opened = Instant::now();
        assert_eq!(decode_envelope(second.sent.recv().await.unwrap()).token, "b");
        assert_eq!(next_non_log(&mut handle.events).await, WorkerEvent::Open);

        // The old socket is dropped; its channel ends.
        while first.sent.recv().await.is_some() {}

        let heartbeat = decode_envelope(second.sent.recv().await.unwrap());
        assert_eq!(heartbeat.code, 101);
        assert!(opened.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_reconnect_scheduled_cancels_timer() {
        let config = ConnectionConfig::new("ws://a").with_interval(Duration::ZERO);
        let (mut worker, _events, _link) = open_worker(None, config).await;

        worker
            .handle_socket_event(SocketEvent::Closed {
                code: Some(1006),
                reason: String::new(),
            })
            .await;
        assert!(worker.reconnect.is_some());
        worker.reconnect_attempts = 3;

        worker
            .handle_command(connect_command(ConnectionConfig::new("ws://b")))
            .await;

        assert!(worker.reconnect.is_none());
        assert!(worker.connecting.is_some());
        assert_eq!(worker.reconnect_attempts, 0);
        assert_eq!(worker.config.as_ref().map(|c| c.url.as_str()), Some("ws://b"));
    }

    #[tokio::test]
    async fn test_connect_failure_reports_error_then_close() {
        let harness = harness(None, true);
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let mut worker = TransportWorker::new(
            Arc::clone(&harness.connector),
            ReconnectPolicy::default(),
            event_tx,
        );

        worker
            .handle_command(connect_command(ConnectionConfig::new("ws://down")))
            .await;
        let outcome = connect_outcome(&mut worker.connecting).await;
        worker.handle_connect_outcome(outcome).await;

        assert_eq!(
            next_non_log(&mut events).await,
            WorkerEvent::Error {
                error: SOCKET_ERROR.to_owned()
            }
        );
        assert_eq!(
            next_non_log(&mut events).await,
            WorkerEvent::Close {
                code: Some(CLOSE_ABNORMAL),
                reason: Some(String::new())
            }
        );
        assert!(worker.reconnect.is_some());
    }

    // ------------------------------------------------------------------------
    // Sending and receiving
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_send_while_closed_logs_warning() {
        let harness = harness(None, false);
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let mut worker =
            TransportWorker::new(Arc::clone(&harness.connector), ReconnectPolicy::default(), event_tx);

        worker.handle_command(WorkerCommand::send("hello")).await;
        assert_eq!(drain_logs(&mut events), vec!["Cannot send: WebSocket not open"]);
    }

    #[tokio::test]
    async fn test_send_options() {
        let config = ConnectionConfig::new("ws://h").with_interval(Duration::ZERO);
        let (mut worker, _events, mut link) = open_worker(Some("proto"), config).await;

        worker
            .handle_command(WorkerCommand::Send {
                payload: json!({ "a": 1 }).into(),
                options: Some(SendOptions::raw()),
            })
            .await;
        assert_eq!(link.sent.recv().await, Some(Frame::Text(r#"{"a":1}"#.into())));

        worker
            .handle_command(WorkerCommand::Send {
                payload: vec![1u8, 2].into(),
                options: Some(SendOptions::raw()),
            })
            .await;
        assert_eq!(link.sent.recv().await, Some(Frame::Binary(vec![1, 2])));

        worker
            .handle_command(WorkerCommand::Send {
                payload: json!({ "b": 2 }).into(),
                options: Some(SendOptions::with_protocol(Protocol::Json)),
            })
            .await;
        assert_eq!(link.sent.recv().await, Some(Frame::Text(r#"{"b":2}"#.into())));

        worker
            .handle_command(WorkerCommand::send(json!({ "requestId": "r" })))
            .await;
        assert_eq!(decode_envelope(link.sent.recv().await.unwrap()).request_id, "r");
    }

    #[tokio::test]
    async fn test_inbound_frames_and_errors() {
        let config = ConnectionConfig::new("ws://h").with_interval(Duration::ZERO);
        let (mut worker, mut events, _link) = open_worker(None, config).await;
        assert_eq!(next_non_log(&mut events).await, WorkerEvent::Open);

        worker
            .handle_socket_event(SocketEvent::Frame(Frame::Text(r#"{"code":1000}"#.into())))
            .await;
        assert_eq!(
            next_non_log(&mut events).await,
            WorkerEvent::Message {
                data: Inbound::Json(json!({ "code": 1000 }))
            }
        );

        worker
            .handle_socket_event(SocketEvent::Error("reset by peer".into()))
            .await;
        assert_eq!(
            next_non_log(&mut events).await,
            WorkerEvent::Error {
                error: SOCKET_ERROR.to_owned()
            }
        );
    }
}
