//! The event pipeline: normalize → filter → dedup.
//!
//! - [`normalizer`] — upstream frames to [`InternalEvent`](crate::types::event::InternalEvent)s.
//! - [`filter`] — user / keyword / kind predicates, applied in order.
//! - [`dedup`] — TTL-bounded fingerprint suppression.
//!
//! All stages are synchronous and non-blocking; the orchestrator drives them
//! from a single task so events flow in receipt order.

pub mod dedup;
pub mod filter;
pub mod normalizer;

pub use dedup::DedupCache;
pub use filter::{EventFilter, FilterChain, KeywordFilter, KindFilter, UserFilter};
pub use normalizer::Normalizer;
