//! Shared caching primitives for tether.
//!
//! This crate holds the three keyed, process-shareable structures that the
//! cache plugin wires into a request engine:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CacheStore                           │
//! │  - key → { data, params, time }                             │
//! │  - one expiry task per key, rescheduled on every write      │
//! └─────────────────────────────────────────────────────────────┘
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         CacheBus                            │
//! │  - key → listeners, notified synchronously on trigger       │
//! └─────────────────────────────────────────────────────────────┘
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     InFlightRegistry                        │
//! │  - key → shared handle of the outstanding request           │
//! │  - entries remove themselves when the request settles       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every structure is a cheap `Clone` handle over shared state. Construct
//! one set per process (or per test) and hand clones to every engine that
//! should observe the same cache keys.

mod bus;
mod entry;
mod inflight;
mod lifetime;
mod store;

pub use bus::{CacheBus, Subscription};
pub use entry::CacheEntry;
pub use inflight::{InFlightRegistry, SharedRequest};
pub use lifetime::{DEFAULT_CACHE_TIME, Lifetime};
pub use store::CacheStore;
