//! Plugin contract and hook dispatch.
//!
//! A [`Plugin`] is a factory: every time the engine's options change it is
//! asked for a fresh set of [`PluginHooks`] built against the engine and the
//! new options. Hooks are all optional; the engine calls every installed
//! plugin's hook for an event with identical arguments and merges whatever
//! they return in registration order, later plugins overriding earlier ones.

use crate::engine::Engine;
use crate::error::ServiceError;
use crate::options::Options;
use crate::service::{Service, ServiceFuture};
use crate::state::StatePatch;

/// What a plugin wants to happen before a run starts.
#[derive(Debug, Clone)]
pub struct BeforeOutcome<D, P> {
  /// State overrides applied together with the loading transition.
  pub patch: StatePatch<D, P>,
  /// Void the run before it touches state.
  pub stop_now: bool,
  /// Skip the service and resolve with the data in `patch`.
  pub return_now: bool,
}

impl<D, P> Default for BeforeOutcome<D, P> {
  fn default() -> Self {
    Self {
      patch: StatePatch::default(),
      stop_now: false,
      return_now: false,
    }
  }
}

impl<D, P> BeforeOutcome<D, P> {
  /// Void the run.
  pub fn stop() -> Self {
    Self {
      stop_now: true,
      ..Self::default()
    }
  }

  /// Let the run proceed with extra state overrides.
  pub fn patch(patch: StatePatch<D, P>) -> Self {
    Self {
      patch,
      ..Self::default()
    }
  }

  /// Resolve immediately with the data carried by `patch`.
  pub fn return_now(patch: StatePatch<D, P>) -> Self {
    Self {
      patch,
      return_now: true,
      ..Self::default()
    }
  }

  /// Combine with the outcome of a later plugin.
  ///
  /// Patches merge field by field with the later plugin winning; the flags
  /// stay set once any plugin sets them.
  #[must_use]
  pub fn merge(self, later: Self) -> Self {
    Self {
      patch: self.patch.merge(later.patch),
      stop_now: self.stop_now || later.stop_now,
      return_now: self.return_now || later.return_now,
    }
  }
}

/// Optional callbacks a plugin installs into an engine.
pub trait PluginHooks<D, P>: Send + Sync {
  /// Called first in every run. Returning `None` means "no opinion".
  fn on_before(&self, _params: &P) -> Option<BeforeOutcome<D, P>> {
    None
  }

  /// Substitute the future awaited for this run (for sharing or caching).
  fn on_request(&self, _service: &dyn Service<D, P>, _params: &P) -> Option<ServiceFuture<D>> {
    None
  }

  fn on_success(&self, _data: &D, _params: &P) {}

  fn on_error(&self, _error: &ServiceError, _params: &P) {}

  fn on_finally(&self, _params: &P, _data: Option<&D>, _error: Option<&ServiceError>) {}

  fn on_cancel(&self) {}

  fn on_mutate(&self, _data: Option<&D>) {}
}

/// Hooks that do nothing; what a plugin installs when it is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl<D, P> PluginHooks<D, P> for NoopHooks {}

/// A composable extension of the engine.
pub trait Plugin<D, P>: Send + Sync {
  /// Name used in logs.
  fn name(&self) -> &'static str;

  /// Seed initial state; called once before the engine is constructed.
  fn on_init(&self, _options: &Options<D, P>) -> StatePatch<D, P> {
    StatePatch::default()
  }

  /// Build this plugin's hooks for the given options.
  ///
  /// Called once at construction and again on every options update.
  fn hooks(&self, engine: &Engine<D, P>, options: &Options<D, P>) -> Box<dyn PluginHooks<D, P>>;

  /// Called after freshly built hooks of every plugin are installed.
  fn on_update(&self, _engine: &Engine<D, P>, _options: &Options<D, P>) {}

  /// Release resources when the owning request is torn down.
  fn teardown(&self) {}
}

/// Installed hooks in registration order.
pub(crate) struct HookSet<D, P> {
  hooks: Vec<Box<dyn PluginHooks<D, P>>>,
}

impl<D, P> HookSet<D, P> {
  pub(crate) fn new(hooks: Vec<Box<dyn PluginHooks<D, P>>>) -> Self {
    Self { hooks }
  }

  pub(crate) fn len(&self) -> usize {
    self.hooks.len()
  }

  pub(crate) fn before(&self, params: &P) -> BeforeOutcome<D, P> {
    self
      .hooks
      .iter()
      .filter_map(|h| h.on_before(params))
      .fold(BeforeOutcome::default(), BeforeOutcome::merge)
  }

  /// The last plugin supplying a future wins.
  pub(crate) fn request(&self, service: &dyn Service<D, P>, params: &P) -> Option<ServiceFuture<D>> {
    self
      .hooks
      .iter()
      .filter_map(|h| h.on_request(service, params))
      .last()
  }

  pub(crate) fn success(&self, data: &D, params: &P) {
    for h in &self.hooks {
      h.on_success(data, params);
    }
  }

  pub(crate) fn error(&self, error: &ServiceError, params: &P) {
    for h in &self.hooks {
      h.on_error(error, params);
    }
  }

  pub(crate) fn finally(&self, params: &P, data: Option<&D>, error: Option<&ServiceError>) {
    for h in &self.hooks {
      h.on_finally(params, data, error);
    }
  }

  pub(crate) fn cancel(&self) {
    for h in &self.hooks {
      h.on_cancel();
    }
  }

  pub(crate) fn mutate(&self, data: Option<&D>) {
    for h in &self.hooks {
      h.on_mutate(data);
    }
  }
}

impl<D, P> Default for HookSet<D, P> {
  fn default() -> Self {
    Self { hooks: Vec::new() }
  }
}
