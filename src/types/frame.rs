//! Wire-level frames exchanged with the upstream actor.
//!
//! Every frame is a JSON object. Server → client frames carry `event_type`
//! and `data`; client → server frames carry `op`. Control frames are the
//! protocol-level subset (`connected`, `subscribed`, `shutdown`, `error`);
//! everything else is a data frame handed to the normalizer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorFrameBody;
use crate::types::subscription::Channel;

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// A raw frame received from the upstream actor.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerFrame {
    /// Protocol event name (`subscribed`, `error`, …) or a data-event kind.
    pub event_type: String,
    /// Opaque payload. For data frames this is the subtree the normalizer
    /// consumes; for control frames it carries the typed bodies below.
    #[serde(default)]
    pub data: Value,
}

impl ServerFrame {
    /// Interpret this frame as a control frame, if its `event_type` names a
    /// protocol event. Returns `None` for data frames.
    pub fn control(&self) -> Option<ControlFrame> {
        match self.event_type.as_str() {
            "connected" => Some(ControlFrame::Connected),
            "subscribed" => {
                let data = serde_json::from_value(self.data.clone()).unwrap_or_default();
                Some(ControlFrame::Subscribed(data))
            }
            "shutdown" => Some(ControlFrame::Shutdown),
            "error" => {
                let body = serde_json::from_value(self.data.clone()).unwrap_or(ErrorFrameBody {
                    code: None,
                    message: None,
                    request_id: None,
                });
                Some(ControlFrame::Error(body))
            }
            _ => None,
        }
    }
}

/// A protocol-level frame, as opposed to a data event.
#[derive(Debug, Clone)]
pub enum ControlFrame {
    /// Informational; sent once on transport open. Ignored.
    Connected,
    /// Confirms a `subscribe` request (handshake or runtime update).
    Subscribed(SubscribedData),
    /// The server is going away; expect the connection to drop without error.
    Shutdown,
    /// Server-side error, possibly correlated to a pending request.
    Error(ErrorFrameBody),
}

/// Body of a `subscribed` confirmation frame.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedData {
    /// Channels the server acknowledges.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Server-side echo of the active filter, if any.
    #[serde(default)]
    pub filter: Option<Value>,
    /// Correlator echoed from the request. Absent on older servers.
    #[serde(default)]
    pub request_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// The `subscribe` command sent on transport open and on runtime updates.
///
/// `users` is omitted from the JSON entirely when the user set is empty.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    /// Always `"subscribe"`.
    pub op: &'static str,
    /// Subscription channels, already normalized.
    pub channels: Vec<Channel>,
    /// Client-generated correlator, echoed by the server.
    pub request_id: String,
    /// Handle filter; omitted when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,
}

impl SubscribeRequest {
    /// Build a subscribe frame for the given normalized state. An empty user
    /// set maps to an absent `users` field, not an empty array.
    pub fn new(channels: Vec<Channel>, users: Vec<String>, request_id: String) -> Self {
        Self {
            op: "subscribe",
            channels,
            request_id,
            users: if users.is_empty() { None } else { Some(users) },
        }
    }
}
