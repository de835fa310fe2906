//! Tether Request
//!
//! The entry point for consumers. A [`Request`] owns an engine and its
//! plugins and drives them through a component-style lifecycle:
//!
//! ```text
//!   builder(service)
//!     .options(..).cache(shared).plugin(..)
//!     .build()          on_init patches → engine → hooks installed
//!        │
//!        ▼
//!   mount()             auto-run with cached or default params
//!   update(options)     options swapped, hooks rebuilt, change effects
//!   run / refresh / cancel / mutate ...
//!   unmount()           cancel, plugins torn down
//! ```
//!
//! Built-in plugins run in a fixed order, auto-run first and cache second,
//! followed by any plugins added on the builder.

mod config;
mod request;

pub use config::{JsonParams, options_from_config};
pub use request::{Request, RequestBuilder, RequestResult};

pub use tether_cache::Lifetime;
pub use tether_engine::{Options, RunOutcome, Service, ServiceError, VoidReason};
pub use tether_plugins::SharedCache;
