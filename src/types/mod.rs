//! Shared data types for the streaming pipeline.
//!
//! - [`event`] — the canonical internal event record and its identity parts
//! - [`frame`] — wire-level frames exchanged with the upstream actor
//! - [`subscription`] — channels and the committed subscription state
//!
//! The most commonly used items are re-exported at the module root.

pub mod event;
pub mod frame;
pub mod subscription;

pub use event::{Actor, EventKind, InternalEvent};
pub use frame::{ControlFrame, ServerFrame, SubscribeRequest, SubscribedData};
pub use subscription::{Channel, SubscriptionMode, SubscriptionSource, SubscriptionState};

/// Current wall-clock time as an ISO-8601 UTC string with millisecond
/// precision, the timestamp format used on every internal event and on
/// subscription-state changes.
pub(crate) fn now_millis_iso() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
