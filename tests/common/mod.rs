//! A scriptable in-process mock of the upstream actor, for integration
//! tests.
//!
//! Binds to port 0 (random) and exposes the actual bound address. Each test
//! spins up its own isolated instance. The server accepts any number of
//! sequential connections; frames can be injected into, and the connection
//! torn down under, whichever connection is currently live.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Commands a test can issue against the live connection.
enum Outbound {
    /// Send a text frame.
    Text(String),
    /// Send a close frame with the given code, then stop the handler.
    Close(u16),
    /// Drop the TCP connection without a close frame.
    Abort,
}

struct MockShared {
    /// Whether subscribe frames are acknowledged automatically.
    auto_ack: AtomicBool,
    /// Every subscribe frame received, across all connections, in order.
    subscribes: Mutex<Vec<Value>>,
    /// Signalled whenever a subscribe frame is recorded.
    subscribe_seen: Notify,
    /// Total connections accepted so far.
    connections: AtomicUsize,
    /// Command channel to the currently live connection, if any.
    outbound: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
}

/// The mock upstream server.
pub struct MockUpstream {
    addr: SocketAddr,
    shared: Arc<MockShared>,
    _task: tokio::task::JoinHandle<()>,
}

impl MockUpstream {
    /// Start the server on a random port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock upstream");
        let addr = listener.local_addr().expect("local addr");

        let shared = Arc::new(MockShared {
            auto_ack: AtomicBool::new(true),
            subscribes: Mutex::new(Vec::new()),
            subscribe_seen: Notify::new(),
            connections: AtomicUsize::new(0),
            outbound: Mutex::new(None),
        });

        let accept_shared = shared.clone();
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _peer)) => {
                        accept_shared.connections.fetch_add(1, Ordering::SeqCst);
                        let conn_shared = accept_shared.clone();
                        tokio::spawn(async move {
                            let _ = handle_connection(stream, conn_shared).await;
                        });
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            addr,
            shared,
            _task: task,
        }
    }

    /// The `ws://` URL clients should dial.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Total connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Toggle automatic `subscribed` acknowledgements.
    pub fn set_auto_ack(&self, on: bool) {
        self.shared.auto_ack.store(on, Ordering::SeqCst);
    }

    /// Every subscribe frame received so far, in arrival order.
    pub fn subscribes(&self) -> Vec<Value> {
        self.shared.subscribes.lock().unwrap().clone()
    }

    /// Wait until at least `n` subscribe frames have arrived, then return
    /// the `n`-th (1-based). Panics after 5 seconds.
    pub async fn wait_for_subscribe(&self, n: usize) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            {
                let subs = self.shared.subscribes.lock().unwrap();
                if subs.len() >= n {
                    return subs[n - 1].clone();
                }
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for subscribe #{n}");
            }
            // A notification can land between the check above and waiter
            // registration, so bound the wait and re-check.
            let notified = self.shared.subscribe_seen.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
        }
    }

    /// Send an arbitrary JSON frame to the live connection.
    pub fn send_json(&self, frame: Value) {
        self.send_text(frame.to_string());
    }

    /// Send raw text to the live connection.
    pub fn send_text(&self, text: String) {
        let guard = self.shared.outbound.lock().unwrap();
        let tx = guard.as_ref().expect("no live connection");
        tx.send(Outbound::Text(text)).expect("connection handler gone");
    }

    /// Send a `subscribed` confirmation, optionally echoing a request id.
    pub fn send_subscribed(&self, request_id: Option<&str>) {
        let mut data = json!({ "channels": ["all"], "filter": null });
        if let Some(rid) = request_id {
            data["requestId"] = json!(rid);
        }
        self.send_json(json!({ "event_type": "subscribed", "data": data }));
    }

    /// Send an `error` control frame.
    pub fn send_error(&self, code: &str, message: &str, request_id: Option<&str>) {
        let mut data = json!({ "code": code, "message": message });
        if let Some(rid) = request_id {
            data["requestId"] = json!(rid);
        }
        self.send_json(json!({ "event_type": "error", "data": data }));
    }

    /// Send a `shutdown` control frame.
    pub fn send_shutdown(&self) {
        self.send_json(json!({ "event_type": "shutdown", "data": {} }));
    }

    /// Close the live connection with the given close code.
    pub fn close_current(&self, code: u16) {
        let guard = self.shared.outbound.lock().unwrap();
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(Outbound::Close(code));
        }
    }

    /// Drop the live connection abruptly, without a close frame.
    pub fn abort_current(&self) {
        let guard = self.shared.outbound.lock().unwrap();
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(Outbound::Abort);
        }
    }
}

/// Drive one WebSocket connection: record subscribes, ack them when enabled,
/// and execute test-injected commands.
async fn handle_connection(
    stream: tokio::net::TcpStream,
    shared: Arc<MockShared>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws.split();

    let (tx, mut commands) = mpsc::unbounded_channel();
    *shared.outbound.lock().unwrap() = Some(tx);

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Outbound::Text(text)) => {
                    write.send(Message::Text(text.into())).await?;
                }
                Some(Outbound::Close(code)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: "".into(),
                    };
                    write.send(Message::Close(Some(frame))).await?;
                    break;
                }
                Some(Outbound::Abort) | None => break,
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(&text)?;
                    if value.get("op").and_then(Value::as_str) == Some("subscribe") {
                        let request_id = value
                            .get("requestId")
                            .and_then(Value::as_str)
                            .map(str::to_owned);
                        shared.subscribes.lock().unwrap().push(value);
                        shared.subscribe_seen.notify_waiters();

                        if shared.auto_ack.load(Ordering::SeqCst) {
                            let mut data = serde_json::json!({
                                "channels": ["all"],
                                "filter": null,
                            });
                            if let Some(rid) = request_id {
                                data["requestId"] = serde_json::json!(rid);
                            }
                            let ack = serde_json::json!({
                                "event_type": "subscribed",
                                "data": data,
                            })
                            .to_string();
                            write.send(Message::Text(ack.into())).await?;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(data))) => {
                    write.send(Message::Pong(data)).await?;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    Ok(())
}
