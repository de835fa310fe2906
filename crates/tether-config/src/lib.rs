//! Tether Config
//!
//! Serializable configuration types for tether. These mirror the engine's
//! options in a form that can be written by hand:
//!
//! - [`RequestConfig`] describes one request (manual/ready gating, default
//!   params, refresh dependencies, cache key and windows).
//! - [`ScenarioDef`] describes a timed script of request instances and the
//!   actions applied to them, replayed by the `tether simulate` command.
//!
//! Durations are plain milliseconds; `-1` means "forever" for
//! `cache_time_ms` and `stale_time_ms`.

mod error;
mod request;
mod scenario;

pub use error::ConfigError;
pub use request::{DEFAULT_CACHE_TIME_MS, RequestConfig};
pub use scenario::{InstanceDef, ScenarioDef, ServiceDef, StepAction, StepDef};
