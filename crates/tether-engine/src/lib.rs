//! Tether Engine
//!
//! This crate manages the lifecycle of one asynchronous operation: loading,
//! params, data and error state, overlapping runs, cancellation and direct
//! mutation. Behaviour beyond the core lifecycle (caching, automatic runs,
//! readiness gating) lives in plugins that hook into each stage.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │  - version counter: a result applies only if still current  │
//! │  - state: { loading, params, data, error }                  │
//! │  - subscriber notified after every state change             │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Plugin hooks                         │
//! │  on_before → on_request → on_success / on_error             │
//! │  → on_finally          (plus on_cancel, on_mutate)          │
//! │  outputs merged in registration order, later ones winning   │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Service                            │
//! │  - async fn(params) -> Result<data, ServiceError>           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A run that is stopped by a plugin, or superseded by a later run or a
//! cancel, resolves to [`RunOutcome::Voided`] rather than hanging.

mod engine;
mod error;
mod options;
mod plugin;
mod service;
mod state;

pub use engine::{Engine, RunOutcome, Subscriber, VoidReason, WeakEngine};
pub use error::ServiceError;
pub use options::{
  BeforeCallback, Callback, ErrorCallback, FinallyCallback, GetCache, Options, SetCache,
  SuccessCallback,
};
pub use plugin::{BeforeOutcome, NoopHooks, Plugin, PluginHooks};
pub use service::{Service, ServiceFuture};
pub use state::{EngineState, StatePatch};
