//! The upstream connection state machine.
//!
//! One [`StreamTransport`] owns at most one socket. Each `connect()` spawns a
//! session driver task that dials, performs the subscribe handshake, reads
//! frames, and — when a session dies retriably — sleeps out the backoff
//! schedule and dials again. Inbound data frames are delivered to the
//! pipeline over an `mpsc` channel in receipt order; transport failures after
//! the initial handshake are reported on a broadcast error channel, never by
//! re-failing `connect()`.
//!
//! # Example
//!
//! ```no_run
//! use alpha_stream::ws::transport::{StreamTransport, TransportConfig};
//! use alpha_stream::types::subscription::SubscriptionState;
//! use alpha_stream::types::subscription::Channel;
//!
//! # #[tokio::main]
//! # async fn main() -> alpha_stream::error::Result<()> {
//! let config = TransportConfig::new("wss://stream.example.com", "your-token");
//! let initial = SubscriptionState::from_config(&[Channel::All], &[]);
//! let transport = StreamTransport::new(config, initial);
//!
//! let mut frames = transport.frames().expect("frame receiver already taken");
//! transport.connect().await?;
//!
//! while let Some(frame) = frames.recv().await {
//!     println!("{}: {}", frame.event_type, frame.data);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::config::{ReconnectConfig, ShutdownRecovery};
use crate::constants;
use crate::error::{ErrorFrameBody, Result, StreamError};
use crate::health::HealthProbe;
use crate::types::frame::{ControlFrame, ServerFrame, SubscribeRequest, SubscribedData};
use crate::types::subscription::SubscriptionState;
use crate::ws::backoff::BackoffPolicy;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WriterHalf = SplitSink<WsStream, Message>;
type ReaderHalf = SplitStream<WsStream>;

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Lifecycle state of the transport. Initial state is `Disconnected`; every
/// transition is observable through [`StreamTransport::state_watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket, no retry scheduled.
    Disconnected,
    /// First dial of a `connect()` call in progress.
    Connecting,
    /// Handshake confirmed; frames are flowing.
    Connected,
    /// A retry is scheduled or a re-dial is in progress.
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a [`StreamTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upstream endpoint. `http`/`https` schemes are rewritten to `ws`/`wss`.
    pub base_url: String,
    /// Bearer token, attached as the `token` query parameter.
    pub token: String,
    /// How long to wait for the `subscribed` confirmation before closing the
    /// socket and letting the close handler reschedule.
    pub confirm_timeout: Duration,
    /// Reconnect backoff settings.
    pub reconnect: ReconnectConfig,
    /// Recovery strategy after a server-announced shutdown.
    pub shutdown_recovery: ShutdownRecovery,
    /// Whether inbound frames should also be broadcast verbatim as bytes.
    pub enable_raw_frames: bool,
}

impl TransportConfig {
    /// Create a config with default timers and backoff for the given
    /// endpoint and token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            confirm_timeout: constants::CONFIRM_TIMEOUT,
            reconnect: ReconnectConfig::default(),
            shutdown_recovery: ShutdownRecovery::default(),
            enable_raw_frames: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Pending subscribe slot
// ---------------------------------------------------------------------------

/// A runtime subscribe request awaiting its `subscribed`/`error` response.
/// At most one exists at a time; the slot is the capacity-one mailbox.
pub(crate) struct PendingSubscribe {
    pub(crate) request_id: String,
    pub(crate) respond: oneshot::Sender<Result<SubscribedData>>,
}

// ---------------------------------------------------------------------------
// Shared transport state
// ---------------------------------------------------------------------------

/// State shared between the public handle, the session driver task, and the
/// subscription manager.
pub(crate) struct TransportShared {
    pub(crate) config: TransportConfig,
    policy: BackoffPolicy,
    /// The committed subscription every (re-)connect subscribes with.
    /// Written only by the subscription manager; read as a snapshot.
    subscription: StdMutex<SubscriptionState>,
    /// Write half of the live socket, if any.
    writer: TokioMutex<Option<WriterHalf>>,
    /// The in-flight runtime subscribe request, if any.
    pending: StdMutex<Option<PendingSubscribe>>,
    state_tx: watch::Sender<ConnectionState>,
    reconnect_enabled: AtomicBool,
    expected_shutdown: AtomicBool,
    reconnect_attempts: AtomicU32,
    request_counter: AtomicU64,
    frame_tx: mpsc::Sender<ServerFrame>,
    error_tx: broadcast::Sender<Arc<StreamError>>,
    raw_tx: Option<broadcast::Sender<Bytes>>,
}

impl TransportShared {
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let prev = self.state_tx.send_replace(state);
        if prev != state {
            tracing::debug!(from = %prev, to = %state, "connection state change");
        }
    }

    /// Generate a process-unique request correlator.
    pub(crate) fn next_request_id(&self) -> String {
        let n = self.request_counter.fetch_add(1, Ordering::Relaxed);
        format!("req-{n}")
    }

    /// Copy-on-read snapshot of the committed subscription.
    pub(crate) fn subscription_snapshot(&self) -> SubscriptionState {
        self.subscription
            .lock()
            .expect("subscription lock poisoned")
            .clone()
    }

    /// Commit a confirmed runtime update. Called only by the manager, only
    /// on the success path.
    pub(crate) fn commit_subscription(
        &self,
        channels: Vec<crate::types::subscription::Channel>,
        users: Vec<String>,
    ) {
        self.subscription
            .lock()
            .expect("subscription lock poisoned")
            .commit_runtime(channels, users);
    }

    /// Serialize and send a client → server frame over the live socket.
    pub(crate) async fn send_frame<T: Serialize>(&self, frame: &T) -> Result<()> {
        let json = serde_json::to_string(frame)?;
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(w) => {
                w.send(Message::Text(json.into())).await?;
                Ok(())
            }
            None => Err(StreamError::Transport("socket writer not available".into())),
        }
    }

    /// Install a pending runtime subscribe. Fails if one is already in flight.
    pub(crate) fn register_pending(&self, pending: PendingSubscribe) -> Result<()> {
        let mut slot = self.pending.lock().expect("pending lock poisoned");
        if slot.is_some() {
            return Err(StreamError::InvalidArgument(
                "another subscription update is already in progress".into(),
            ));
        }
        *slot = Some(pending);
        Ok(())
    }

    /// Drop the pending request with the given id without responding
    /// (the caller's receiver is gone, e.g. its timeout fired).
    pub(crate) fn clear_pending(&self, request_id: &str) {
        let mut slot = self.pending.lock().expect("pending lock poisoned");
        if slot.as_ref().is_some_and(|p| p.request_id == request_id) {
            *slot = None;
        }
    }

    /// Resolve the pending request if `data` correlates to it: the ids must
    /// match exactly, or the response may omit the id (older servers) while a
    /// request is outstanding.
    fn resolve_pending_ok(&self, data: SubscribedData) {
        let mut slot = self.pending.lock().expect("pending lock poisoned");
        let matches = match (&*slot, data.request_id.as_deref()) {
            (Some(p), Some(rid)) => p.request_id == rid,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if matches {
            let pending = slot.take().expect("checked above");
            let _ = pending.respond.send(Ok(data));
        } else if let Some(rid) = data.request_id.as_deref() {
            tracing::debug!(request_id = rid, "subscribed frame for a different request; ignoring");
        }
    }

    /// Reject the pending request if the server error frame correlates to it.
    fn resolve_pending_err(&self, body: &ErrorFrameBody) {
        let mut slot = self.pending.lock().expect("pending lock poisoned");
        let matches = match (&*slot, body.request_id.as_deref()) {
            (Some(p), Some(rid)) => p.request_id == rid,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if matches {
            let pending = slot.take().expect("checked above");
            let _ = pending.respond.send(Err(StreamError::Subscription(body.clone())));
        }
    }

    /// Fail the pending request unconditionally (socket gone).
    fn fail_pending(&self, reason: impl Fn() -> StreamError) {
        let pending = self.pending.lock().expect("pending lock poisoned").take();
        if let Some(p) = pending {
            let _ = p.respond.send(Err(reason()));
        }
    }

    fn emit_error(&self, err: StreamError) {
        // Nobody listening is fine; errors are also logged where they occur.
        let _ = self.error_tx.send(Arc::new(err));
    }

    /// Best-effort close: send a close frame and drop the writer.
    async fn close_socket(&self) {
        let mut guard = self.writer.lock().await;
        if let Some(mut w) = guard.take() {
            let _ = w.send(Message::Close(None)).await;
        }
    }
}

// ---------------------------------------------------------------------------
// StreamTransport
// ---------------------------------------------------------------------------

/// Framed client for the upstream subscription stream.
///
/// Owns the socket, the handshake, the reconnect schedule, and the inbound
/// frame channel. Runtime subscription changes go through
/// [`SubscriptionManager`](crate::ws::manager::SubscriptionManager), which
/// shares this transport's committed subscription state.
pub struct StreamTransport {
    shared: Arc<TransportShared>,
    frames_rx: StdMutex<Option<mpsc::Receiver<ServerFrame>>>,
    driver: StdMutex<Option<JoinHandle<()>>>,
}

impl StreamTransport {
    /// Create a transport for the given endpoint, seeded with the initial
    /// subscription. No network activity happens until [`connect`](Self::connect).
    pub fn new(config: TransportConfig, initial_subscription: SubscriptionState) -> Self {
        let (frame_tx, frame_rx) = mpsc::channel(constants::FRAME_CHANNEL_CAPACITY);
        let (error_tx, _) = broadcast::channel(constants::ERROR_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let raw_tx = config.enable_raw_frames.then(|| {
            let (tx, _) = broadcast::channel(constants::RAW_CHANNEL_CAPACITY);
            tx
        });
        let policy = BackoffPolicy::new(&config.reconnect);

        Self {
            shared: Arc::new(TransportShared {
                config,
                policy,
                subscription: StdMutex::new(initial_subscription),
                writer: TokioMutex::new(None),
                pending: StdMutex::new(None),
                state_tx,
                reconnect_enabled: AtomicBool::new(true),
                expected_shutdown: AtomicBool::new(false),
                reconnect_attempts: AtomicU32::new(0),
                request_counter: AtomicU64::new(0),
                frame_tx,
                error_tx,
                raw_tx,
            }),
            frames_rx: StdMutex::new(Some(frame_rx)),
            driver: StdMutex::new(None),
        }
    }

    /// Dial the upstream, perform the subscribe handshake, and start the
    /// session driver.
    ///
    /// The returned future settles exactly once: `Ok` on the first
    /// `subscribed` confirmation, `Err` on an authentication failure, on the
    /// confirmation timeout, on a close before confirmation, or on a
    /// caller-initiated `disconnect()`. Failures after that point are
    /// reported through [`errors`](Self::errors). A dial failure is not
    /// terminal — the driver keeps retrying on the backoff schedule and the
    /// future stays pending until one of the listed events.
    pub async fn connect(&self) -> Result<()> {
        if self.shared.config.token.trim().is_empty() {
            return Err(StreamError::Auth("token is empty or whitespace".into()));
        }

        let first_rx = {
            let mut driver = self.driver.lock().expect("driver lock poisoned");
            if driver.as_ref().is_some_and(|t| !t.is_finished()) {
                return Err(StreamError::InvalidArgument(
                    "transport is already connected or connecting".into(),
                ));
            }
            // connect() after disconnect() re-enables reconnection
            self.shared.reconnect_enabled.store(true, Ordering::Relaxed);
            self.shared.expected_shutdown.store(false, Ordering::Relaxed);
            self.shared.reconnect_attempts.store(0, Ordering::Relaxed);

            let (first_tx, first_rx) = oneshot::channel();
            let shared = self.shared.clone();
            *driver = Some(tokio::spawn(async move {
                session_driver(shared, first_tx).await;
            }));
            first_rx
        };

        first_rx.await.map_err(|_| {
            StreamError::ClosedDuringRequest("disconnected before confirmation".into())
        })?
    }

    /// Tear the connection down immediately.
    ///
    /// Disables reconnection (until the next `connect()`), fails any pending
    /// subscribe request with a closed reason, sends a best-effort close
    /// frame, and stops the driver.
    pub async fn disconnect(&self) {
        self.shared.reconnect_enabled.store(false, Ordering::Relaxed);
        self.shared
            .fail_pending(|| StreamError::ClosedDuringRequest("caller disconnected".into()));
        self.shared.close_socket().await;
        if let Some(task) = self.driver.lock().expect("driver lock poisoned").take() {
            task.abort();
        }
        self.shared.set_state(ConnectionState::Disconnected);
        tracing::info!("transport disconnected");
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// A watch receiver observing every state transition.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Take the inbound frame receiver. Yields frames in receipt order.
    /// Returns `None` after the first call.
    pub fn frames(&self) -> Option<mpsc::Receiver<ServerFrame>> {
        self.frames_rx.lock().expect("frames lock poisoned").take()
    }

    /// Subscribe to transport failures reported after `connect()` resolved.
    pub fn errors(&self) -> broadcast::Receiver<Arc<StreamError>> {
        self.shared.error_tx.subscribe()
    }

    /// Subscribe to the raw-frame tap, if it was enabled in the config.
    pub fn raw_frames(&self) -> Option<broadcast::Receiver<Bytes>> {
        self.shared.raw_tx.as_ref().map(|tx| tx.subscribe())
    }

    /// Number of reconnect attempts fired since the last confirmation.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Frames sitting in the pipeline channel, not yet consumed.
    pub fn buffered_frames(&self) -> usize {
        self.shared.frame_tx.max_capacity() - self.shared.frame_tx.capacity()
    }

    /// Snapshot of the committed subscription.
    pub fn subscription(&self) -> SubscriptionState {
        self.shared.subscription_snapshot()
    }

    pub(crate) fn shared(&self) -> Arc<TransportShared> {
        self.shared.clone()
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        if let Some(task) = self.driver.lock().expect("driver lock poisoned").take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Rewrite the base URL onto a WebSocket scheme and attach the token.
fn build_ws_url(base_url: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(StreamError::InvalidArgument(format!(
                "unsupported scheme {other:?}; expected ws, wss, http, or https"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| StreamError::InvalidArgument(format!("cannot use scheme {scheme:?}")))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

// ---------------------------------------------------------------------------
// Session driver
// ---------------------------------------------------------------------------

/// Why a session ended.
enum SessionEnd {
    /// Close code 1000. No reconnect.
    NormalClose,
    /// Close code 1008 or 4401. Terminal.
    AuthFailure(String),
    /// Server sent a `shutdown` control frame. Recover per strategy.
    ExpectedShutdown,
    /// Anything else. Retry on the backoff schedule if still enabled.
    Retriable(StreamError),
}

/// Drives sessions until the transport reaches a terminal state: dial,
/// handshake, read; on retriable death, sleep out the backoff and go again.
async fn session_driver(shared: Arc<TransportShared>, first_tx: oneshot::Sender<Result<()>>) {
    let mut first = Some(first_tx);

    loop {
        let end = run_session(&shared, &mut first).await;
        *shared.writer.lock().await = None;

        match end {
            SessionEnd::NormalClose => {
                tracing::info!("connection closed normally by server");
                shared.set_state(ConnectionState::Disconnected);
                break;
            }
            SessionEnd::AuthFailure(msg) => {
                tracing::error!(reason = %msg, "authentication rejected; reconnect disabled");
                shared.reconnect_enabled.store(false, Ordering::Relaxed);
                shared.set_state(ConnectionState::Disconnected);
                shared.emit_error(StreamError::Auth(msg));
                break;
            }
            SessionEnd::ExpectedShutdown => {
                // State is already Disconnected and no error was emitted.
                wait_out_shutdown(&shared).await;
                shared.reconnect_attempts.store(0, Ordering::Relaxed);
                shared.expected_shutdown.store(false, Ordering::Relaxed);
                if !shared.reconnect_enabled.load(Ordering::Relaxed) {
                    break;
                }
                tracing::info!("shutdown grace elapsed; dialing fresh");
                continue;
            }
            SessionEnd::Retriable(err) => {
                tracing::warn!(error = %err, "session ended");
                if !shared.reconnect_enabled.load(Ordering::Relaxed) {
                    if let Some(tx) = first.take() {
                        let _ = tx.send(Err(err));
                    } else {
                        shared.emit_error(err);
                    }
                    shared.set_state(ConnectionState::Disconnected);
                    break;
                }
                shared.emit_error(err);

                let fired = shared.reconnect_attempts.load(Ordering::Relaxed);
                if shared.policy.exhausted(fired) {
                    tracing::error!(attempts = fired, "reconnect attempts exhausted");
                    shared.reconnect_enabled.store(false, Ordering::Relaxed);
                    shared.set_state(ConnectionState::Disconnected);
                    if let Some(tx) = first.take() {
                        let _ = tx.send(Err(StreamError::ReconnectExhausted(fired)));
                    }
                    shared.emit_error(StreamError::ReconnectExhausted(fired));
                    break;
                }

                shared.set_state(ConnectionState::Reconnecting);
                let delay = shared.policy.delay(fired);
                tracing::info!(attempt = fired + 1, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
                tokio::time::sleep(delay).await;
                // The counter tracks fired retries, so it moves here, not at
                // scheduling time.
                shared.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
                if !shared.reconnect_enabled.load(Ordering::Relaxed) {
                    shared.set_state(ConnectionState::Disconnected);
                    break;
                }
                continue;
            }
        }
    }
}

/// Post-shutdown recovery: fixed grace wait, or the legacy readiness poll.
async fn wait_out_shutdown(shared: &TransportShared) {
    match shared.config.shutdown_recovery {
        ShutdownRecovery::FixedDelay { delay_ms } => {
            tracing::info!(delay_ms, "waiting out server shutdown");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        ShutdownRecovery::HealthPoll { deadline_ms } => {
            let probe = match HealthProbe::for_stream_endpoint(
                &shared.config.base_url,
                &shared.config.token,
            ) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot build health probe; falling back to fixed wait");
                    tokio::time::sleep(constants::SHUTDOWN_GRACE).await;
                    return;
                }
            };
            let deadline = tokio::time::Instant::now() + Duration::from_millis(deadline_ms);
            loop {
                match probe.check().await {
                    Ok(true) => {
                        tracing::info!("upstream reports ready");
                        return;
                    }
                    Ok(false) => tracing::debug!("upstream not ready yet"),
                    Err(e) => tracing::debug!(error = %e, "health probe failed"),
                }
                if tokio::time::Instant::now() + constants::HEALTH_POLL_INTERVAL >= deadline {
                    tracing::warn!("readiness poll deadline reached; dialing anyway");
                    return;
                }
                tokio::time::sleep(constants::HEALTH_POLL_INTERVAL).await;
            }
        }
    }
}

/// Run a single connection session to completion.
///
/// `first` is the unresolved `connect()` future, if any. It is resolved `Ok`
/// on handshake confirmation and `Err` on the confirmation timeout, an
/// authentication close, or any close before confirmation. Dial failures
/// leave it pending for the next session.
async fn run_session(
    shared: &Arc<TransportShared>,
    first: &mut Option<oneshot::Sender<Result<()>>>,
) -> SessionEnd {
    if shared.state() == ConnectionState::Disconnected {
        shared.set_state(ConnectionState::Connecting);
    }

    let url = match build_ws_url(&shared.config.base_url, &shared.config.token) {
        Ok(u) => u,
        Err(e) => return SessionEnd::Retriable(e),
    };

    tracing::debug!(endpoint = %shared.config.base_url, "dialing upstream");
    let (ws, _resp) = match connect_async(url.as_str()).await {
        Ok(v) => v,
        Err(e) => {
            return SessionEnd::Retriable(StreamError::Transport(format!("dial failed: {e}")));
        }
    };
    let (write, read) = ws.split();
    *shared.writer.lock().await = Some(write);

    // Handshake: subscribe with the committed state. `users` is omitted when
    // the set is empty.
    let request_id = shared.next_request_id();
    let snapshot = shared.subscription_snapshot();
    let subscribe = SubscribeRequest::new(snapshot.channels, snapshot.users, request_id.clone());
    if let Err(e) = shared.send_frame(&subscribe).await {
        return SessionEnd::Retriable(e);
    }
    tracing::debug!(request_id = %request_id, "handshake subscribe sent");

    read_loop(shared, read, request_id, first).await
}

/// Read frames until the session dies. Owns the confirmation timer while the
/// handshake is outstanding.
async fn read_loop(
    shared: &Arc<TransportShared>,
    mut read: ReaderHalf,
    handshake_id: String,
    first: &mut Option<oneshot::Sender<Result<()>>>,
) -> SessionEnd {
    let confirm_deadline = tokio::time::Instant::now() + shared.config.confirm_timeout;
    let mut handshake = Some(handshake_id);

    loop {
        // While unconfirmed, reads race the confirmation timer. On expiry the
        // socket is closed but the reconnect flag is left alone — the close
        // handler path below is what reschedules.
        let msg = if handshake.is_some() {
            match tokio::time::timeout_at(confirm_deadline, read.next()).await {
                Ok(msg) => msg,
                Err(_) => {
                    tracing::warn!("no subscription confirmation within deadline; closing socket");
                    shared.close_socket().await;
                    if let Some(tx) = first.take() {
                        let _ = tx.send(Err(StreamError::Timeout("subscription confirmation")));
                    }
                    return SessionEnd::Retriable(StreamError::Timeout(
                        "subscription confirmation",
                    ));
                }
            }
        } else {
            read.next().await
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                if let Some(raw_tx) = &shared.raw_tx {
                    let _ = raw_tx.send(Bytes::copy_from_slice(text.as_bytes()));
                }
                let frame: ServerFrame = match serde_json::from_str(&text) {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::debug!(error = %e, "dropping malformed frame");
                        continue;
                    }
                };
                match frame.control() {
                    Some(ControlFrame::Connected) => {
                        tracing::debug!("transport-open acknowledged");
                    }
                    Some(ControlFrame::Subscribed(data)) => {
                        if handshake.is_some() {
                            // Exact match required when both sides carry an
                            // id; an absent id is accepted for older servers.
                            let foreign = matches!(
                                (handshake.as_deref(), data.request_id.as_deref()),
                                (Some(hid), Some(rid)) if rid != hid
                            );
                            if foreign {
                                tracing::debug!(
                                    request_id = ?data.request_id,
                                    "subscribed frame for a different request; still waiting"
                                );
                            } else {
                                handshake = None;
                                shared.reconnect_attempts.store(0, Ordering::Relaxed);
                                shared.set_state(ConnectionState::Connected);
                                tracing::info!(
                                    channels = ?data.channels,
                                    "subscription confirmed"
                                );
                                if let Some(tx) = first.take() {
                                    let _ = tx.send(Ok(()));
                                }
                            }
                        } else {
                            shared.resolve_pending_ok(data);
                        }
                    }
                    Some(ControlFrame::Shutdown) => {
                        tracing::info!("server announced shutdown");
                        shared.expected_shutdown.store(true, Ordering::Relaxed);
                        shared.fail_pending(|| {
                            StreamError::ClosedDuringRequest("server shutting down".into())
                        });
                        shared.set_state(ConnectionState::Disconnected);
                        shared.close_socket().await;
                        if let Some(tx) = first.take() {
                            let _ = tx.send(Err(StreamError::ClosedDuringRequest(
                                "server shut down before confirmation".into(),
                            )));
                        }
                        return SessionEnd::ExpectedShutdown;
                    }
                    Some(ControlFrame::Error(body)) => {
                        tracing::warn!(error = %body, "server error frame");
                        if handshake.is_none() {
                            shared.resolve_pending_err(&body);
                        }
                        shared.emit_error(StreamError::Subscription(body));
                    }
                    None => {
                        // Data frame: hand to the pipeline in receipt order.
                        if shared.frame_tx.send(frame).await.is_err() {
                            tracing::debug!("frame channel closed; dropping event");
                        }
                    }
                }
            }
            Some(Ok(Message::Close(close))) => {
                let code = close.as_ref().map(|c| u16::from(c.code));
                let reason = close
                    .as_ref()
                    .map(|c| c.reason.to_string())
                    .unwrap_or_default();
                return close_end(shared, first, code, reason);
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(_)) => {
                // Binary frames are not part of this protocol.
                tracing::debug!("ignoring non-text frame");
            }
            Some(Err(e)) => {
                if let Some(tx) = first.take() {
                    let _ = tx.send(Err(StreamError::Transport(format!("read error: {e}"))));
                }
                shared.fail_pending(|| {
                    StreamError::ClosedDuringRequest("connection lost".into())
                });
                return SessionEnd::Retriable(StreamError::Transport(format!("read error: {e}")));
            }
            None => {
                if let Some(tx) = first.take() {
                    let _ = tx.send(Err(StreamError::Transport(
                        "stream ended before confirmation".into(),
                    )));
                }
                shared.fail_pending(|| {
                    StreamError::ClosedDuringRequest("connection lost".into())
                });
                return SessionEnd::Retriable(StreamError::Transport("stream ended".into()));
            }
        }
    }
}

/// Map a server close frame to a session outcome.
fn close_end(
    shared: &TransportShared,
    first: &mut Option<oneshot::Sender<Result<()>>>,
    code: Option<u16>,
    reason: String,
) -> SessionEnd {
    tracing::info!(code = ?code, reason = %reason, "server closed connection");
    match code {
        Some(1000) => {
            shared.fail_pending(|| StreamError::ClosedDuringRequest("connection closed".into()));
            if let Some(tx) = first.take() {
                let _ = tx.send(Err(StreamError::ClosedDuringRequest(
                    "closed before confirmation".into(),
                )));
            }
            SessionEnd::NormalClose
        }
        Some(code @ (1008 | 4401)) => {
            let msg = if reason.is_empty() {
                format!("close code {code}")
            } else {
                format!("close code {code}: {reason}")
            };
            shared.fail_pending(|| StreamError::Auth(msg.clone()));
            if let Some(tx) = first.take() {
                let _ = tx.send(Err(StreamError::Auth(msg.clone())));
            }
            SessionEnd::AuthFailure(msg)
        }
        other => {
            shared.fail_pending(|| StreamError::ClosedDuringRequest("connection closed".into()));
            if let Some(tx) = first.take() {
                let _ = tx.send(Err(StreamError::ClosedDuringRequest(
                    "closed before confirmation".into(),
                )));
            }
            if shared.expected_shutdown.load(Ordering::Relaxed) {
                // The server already announced this close; recover on the
                // shutdown grace path instead of the backoff schedule.
                shared.set_state(ConnectionState::Disconnected);
                return SessionEnd::ExpectedShutdown;
            }
            let msg = match other {
                Some(c) => format!("unexpected close, code {c}"),
                None => "unexpected close without code".into(),
            };
            SessionEnd::Retriable(StreamError::Transport(msg))
        }
    }
}
