//! Error types for the `alpha-stream` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, StreamError>`.
//!
//! [`StreamError`] covers:
//! - **Auth errors** — invalid/missing token; terminal for the session
//! - **Transport errors** — dial failure, unexpected close; retriable via backoff
//! - **Protocol errors** — malformed frames, invalid channel names
//! - **Subscription errors** — server-side `error` frames correlated to a request
//! - **Timeouts** — handshake confirmation or runtime-update deadline
//! - **WebSocket / JSON / URL / HTTP errors** — wrapped library failures
//! - **Invalid arguments** — client-side validation failures

use std::fmt;

/// Body of a server-side `error` control frame.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFrameBody {
    /// Machine-readable error code (e.g. `"SUBSCRIPTION_FAILED"`).
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable description of the error.
    #[serde(default)]
    pub message: Option<String>,
    /// Correlator echoed from the offending `subscribe` request, if any.
    #[serde(default)]
    pub request_id: Option<String>,
}

impl fmt::Display for ErrorFrameBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.code.as_deref().unwrap_or("UNKNOWN"),
            self.message.as_deref().unwrap_or("no message"),
        )
    }
}

/// All possible errors produced by the streaming client.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The token was rejected (or missing). Terminal: the session will not
    /// reconnect after this.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A transport-level failure: dial error, read/write error, or an
    /// unexpected close. Retriable via the backoff schedule.
    #[error("transport error: {0}")]
    Transport(String),

    /// A frame that could not be interpreted: malformed JSON envelope,
    /// missing required fields, or an invalid channel name. The offending
    /// frame is dropped; processing continues.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A server-side `error` frame correlated to a pending subscribe request.
    #[error("subscription rejected: {0}")]
    Subscription(ErrorFrameBody),

    /// A handshake-confirmation or runtime-update deadline expired.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The connection closed while a subscribe request was outstanding.
    #[error("connection closed during request: {0}")]
    ClosedDuringRequest(String),

    /// The reconnect budget (`max_attempts`) is exhausted.
    #[error("reconnect attempts exhausted after {0} tries")]
    ReconnectExhausted(u32),

    /// A WebSocket-level error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to serialize or deserialize a JSON frame.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error building or parsing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// An HTTP error from the health probe.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The caller provided an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl StreamError {
    /// Whether this error is terminal for the session (no reconnect).
    pub fn is_fatal(&self) -> bool {
        matches!(self, StreamError::Auth(_) | StreamError::ReconnectExhausted(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StreamError>;
