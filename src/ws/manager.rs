//! Runtime subscription updates.
//!
//! The [`SubscriptionManager`] changes what the live connection is subscribed
//! to without dropping the transport, and persists the accepted values so the
//! next (re-)connect subscribes with them instead of the seed configuration.
//!
//! At most one update is in flight at a time; overlapping calls are rejected
//! immediately. The committed state only changes on the success path — a
//! server error, a timeout, or a mid-update close leaves it untouched.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use alpha_stream::ws::manager::SubscriptionManager;
//! use alpha_stream::ws::transport::{StreamTransport, TransportConfig};
//! use alpha_stream::types::subscription::{Channel, SubscriptionState};
//!
//! # #[tokio::main]
//! # async fn main() -> alpha_stream::error::Result<()> {
//! let transport = StreamTransport::new(
//!     TransportConfig::new("wss://stream.example.com", "your-token"),
//!     SubscriptionState::from_config(&[Channel::All], &[]),
//! );
//! transport.connect().await?;
//!
//! let manager = SubscriptionManager::new(&transport);
//! let state = manager
//!     .update(
//!         &[Channel::Tweets, Channel::Following],
//!         &["carol".to_owned()],
//!         Duration::from_secs(10),
//!     )
//!     .await?;
//! println!("now subscribed: {:?}", state.channels);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{Result, StreamError};
use crate::types::frame::SubscribeRequest;
use crate::types::subscription::{
    Channel, SubscriptionState, normalize_channels, normalize_users,
};
use crate::ws::transport::{ConnectionState, PendingSubscribe, StreamTransport, TransportShared};

/// Changes the live subscription atomically, with request-id correlation.
pub struct SubscriptionManager {
    shared: Arc<TransportShared>,
}

impl SubscriptionManager {
    /// Create a manager bound to the given transport's committed state.
    pub fn new(transport: &StreamTransport) -> Self {
        Self {
            shared: transport.shared(),
        }
    }

    /// Snapshot of the currently committed subscription.
    pub fn current(&self) -> SubscriptionState {
        self.shared.subscription_snapshot()
    }

    /// Re-subscribe the live connection to `channels` (and optionally a
    /// `users` handle filter), waiting up to `timeout` for the server's
    /// confirmation.
    ///
    /// Inputs are normalized first: `all` collapses to the sole channel,
    /// duplicates are removed and the rest sorted; users are trimmed,
    /// lowercased, deduplicated, sorted, and empties dropped.
    ///
    /// On success the new values are committed, so a later reconnect carries
    /// them. Every failure path — server `error` frame, timeout, connection
    /// close, transport not connected, another update in flight — leaves the
    /// committed state unchanged.
    pub async fn update(
        &self,
        channels: &[Channel],
        users: &[String],
        timeout: Duration,
    ) -> Result<SubscriptionState> {
        let channels = normalize_channels(channels);
        let users = normalize_users(users);

        if self.shared.state() != ConnectionState::Connected {
            return Err(StreamError::InvalidArgument(
                "cannot update subscription: transport is not connected".into(),
            ));
        }

        let request_id = self.shared.next_request_id();
        let (respond, response) = oneshot::channel();
        self.shared.register_pending(PendingSubscribe {
            request_id: request_id.clone(),
            respond,
        })?;

        let request = SubscribeRequest::new(channels.clone(), users.clone(), request_id.clone());
        if let Err(e) = self.shared.send_frame(&request).await {
            self.shared.clear_pending(&request_id);
            return Err(e);
        }
        tracing::debug!(
            request_id = %request_id,
            channels = ?channels,
            users = users.len(),
            "subscription update sent"
        );

        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(Ok(ack))) => {
                self.shared.commit_subscription(channels, users);
                let state = self.shared.subscription_snapshot();
                tracing::info!(
                    request_id = %request_id,
                    channels = ?ack.channels,
                    "subscription update confirmed"
                );
                Ok(state)
            }
            Ok(Ok(Err(e))) => Err(e),
            // The transport dropped the resolver without responding.
            Ok(Err(_)) => Err(StreamError::ClosedDuringRequest(
                "connection closed during update".into(),
            )),
            Err(_) => {
                self.shared.clear_pending(&request_id);
                Err(StreamError::Timeout("subscription update"))
            }
        }
    }
}
