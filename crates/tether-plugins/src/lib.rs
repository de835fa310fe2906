//! Tether Plugins
//!
//! The two plugins every request carries by default:
//!
//! - [`AutoRunPlugin`]: gates runs on `ready`, runs automatically when
//!   `ready` flips on, refreshes when `refresh_deps` change.
//! - [`CachePlugin`]: serves fresh cached data without calling the service,
//!   shares one outstanding request between instances with the same cache
//!   key, and keeps those instances in sync through the cache bus.
//!
//! Caching state that must be shared across requests lives in a
//! [`SharedCache`]; build one per process and pass clones to each request.

mod autorun;
mod cache;

pub use autorun::{AutoRunPlugin, deps_changed};
pub use cache::{CachePlugin, SharedCache};
