//! The request engine.
//!
//! An [`Engine`] owns the lifecycle of one logical operation. Each run bumps
//! a version counter; a result is applied only if no later run or cancel has
//! bumped it again by the time the result arrives. That single check is what
//! lets any number of runs and cancels overlap without a queue.
//!
//! The counter is only bumped while the state lock is held, and a result is
//! checked and written under that same lock, so a cancel that has returned
//! can never be followed by the write of a run it voided.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use tracing::{debug, error, trace, warn};

use crate::error::ServiceError;
use crate::options::Options;
use crate::plugin::{BeforeOutcome, HookSet, PluginHooks};
use crate::service::{Service, ServiceFuture};
use crate::state::{EngineState, StatePatch};

/// Called after every state change. Read [`Engine::state`] to observe it.
pub type Subscriber = Arc<dyn Fn() + Send + Sync>;

/// Why a run produced no observable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoidReason {
  /// A plugin stopped the run before it started.
  Stopped,
  /// A later run or a cancel superseded this run while it was in flight.
  Superseded,
}

/// Outcome of a run that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<D> {
  /// The run's result was applied to state.
  Completed(D),
  /// The run was voided; its result (if any) was discarded.
  Voided(VoidReason),
}

impl<D> RunOutcome<D> {
  /// The completed data, if the run was not voided.
  pub fn data(self) -> Option<D> {
    match self {
      Self::Completed(data) => Some(data),
      Self::Voided(_) => None,
    }
  }

  pub fn is_voided(&self) -> bool {
    matches!(self, Self::Voided(_))
  }
}

/// A run after its synchronous prefix.
enum Launch<D, P> {
  Voided(VoidReason),
  Ready(D),
  Pending {
    version: u64,
    params: P,
    request: ServiceFuture<D>,
  },
}

struct Inner<D, P> {
  state: Mutex<EngineState<D, P>>,
  version: AtomicU64,
  service: RwLock<Arc<dyn Service<D, P>>>,
  options: RwLock<Arc<Options<D, P>>>,
  hooks: RwLock<Arc<HookSet<D, P>>>,
  subscriber: Subscriber,
}

/// Handle to a request engine. Clones share the same engine.
pub struct Engine<D, P> {
  inner: Arc<Inner<D, P>>,
}

impl<D, P> Clone for Engine<D, P> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

/// Non-owning handle, for listeners that must not keep an engine alive.
pub struct WeakEngine<D, P> {
  inner: Weak<Inner<D, P>>,
}

impl<D, P> Clone for WeakEngine<D, P> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<D, P> WeakEngine<D, P> {
  pub fn upgrade(&self) -> Option<Engine<D, P>> {
    self.inner.upgrade().map(|inner| Engine { inner })
  }
}

impl<D, P> Engine<D, P>
where
  D: Clone + Send + Sync + 'static,
  P: Clone + Default + Send + Sync + 'static,
{
  /// Create an engine.
  ///
  /// The initial state is `loading = !options.manual` with `init` applied on
  /// top. No hooks are installed; see [`Engine::install_hooks`].
  pub fn new(
    service: impl Service<D, P> + 'static,
    options: Options<D, P>,
    subscriber: Subscriber,
    init: StatePatch<D, P>,
  ) -> Self {
    let mut state = EngineState {
      loading: !options.manual,
      ..EngineState::default()
    };
    init.apply(&mut state);
    let service: Arc<dyn Service<D, P>> = Arc::new(service);

    Self {
      inner: Arc::new(Inner {
        state: Mutex::new(state),
        version: AtomicU64::new(0),
        service: RwLock::new(service),
        options: RwLock::new(Arc::new(options)),
        hooks: RwLock::new(Arc::new(HookSet::default())),
        subscriber,
      }),
    }
  }

  /// Snapshot of the current state.
  pub fn state(&self) -> EngineState<D, P> {
    self.lock_state().clone()
  }

  /// Current value of the version counter.
  pub fn version(&self) -> u64 {
    self.inner.version.load(Ordering::SeqCst)
  }

  /// Options currently in effect.
  pub fn options(&self) -> Arc<Options<D, P>> {
    self
      .inner
      .options
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .clone()
  }

  /// Replace the options. Callers normally rebuild hooks right after.
  pub fn update_options(&self, options: Options<D, P>) {
    *self
      .inner
      .options
      .write()
      .unwrap_or_else(|e| e.into_inner()) = Arc::new(options);
  }

  /// Swap the underlying service. Runs started afterwards use the new one.
  pub fn set_service(&self, service: impl Service<D, P> + 'static) {
    let service: Arc<dyn Service<D, P>> = Arc::new(service);
    *self
      .inner
      .service
      .write()
      .unwrap_or_else(|e| e.into_inner()) = service;
  }

  /// Replace the installed plugin hooks, in registration order.
  pub fn install_hooks(&self, hooks: Vec<Box<dyn PluginHooks<D, P>>>) {
    let hooks = HookSet::new(hooks);
    trace!(plugins = hooks.len(), "plugin hooks installed");
    *self.inner.hooks.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(hooks);
  }

  /// Apply a patch to state and notify the subscriber.
  ///
  /// This is the only way state changes, for plugins included.
  pub fn set_state(&self, patch: StatePatch<D, P>) {
    patch.apply(&mut self.lock_state());
    (self.inner.subscriber)();
  }

  /// Apply a patch only if `version` is still the latest run.
  ///
  /// Returns whether the patch was applied. The subscriber is notified after
  /// the state lock is released.
  pub fn set_state_if_current(&self, version: u64, patch: StatePatch<D, P>) -> bool {
    {
      let mut state = self.lock_state();
      if !self.is_current(version) {
        return false;
      }
      patch.apply(&mut state);
    }
    (self.inner.subscriber)();
    true
  }

  pub fn downgrade(&self) -> WeakEngine<D, P> {
    WeakEngine {
      inner: Arc::downgrade(&self.inner),
    }
  }

  /// Run the service and wait for the outcome.
  ///
  /// Returns `Voided` when a plugin stopped the run or when a later run or
  /// cancel superseded it; a voided run never touches state after it was
  /// superseded. Service failures are stored in state and returned as `Err`.
  pub async fn run_async(&self, params: P) -> Result<RunOutcome<D>, ServiceError> {
    match self.launch(params) {
      Launch::Voided(reason) => Ok(RunOutcome::Voided(reason)),
      Launch::Ready(data) => Ok(RunOutcome::Completed(data)),
      Launch::Pending {
        version,
        params,
        request,
      } => self.settle(version, params, request).await,
    }
  }

  /// Start a run without waiting for it.
  ///
  /// Everything up to the service call happens before this returns; the wait
  /// is spawned on the current tokio runtime. A failure goes to the
  /// `on_error` option when one is set and is logged otherwise.
  pub fn run(&self, params: P) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
      error!("run called outside a tokio runtime; request not started");
      return;
    };

    if let Launch::Pending {
      version,
      params,
      request,
    } = self.launch(params)
    {
      let engine = self.clone();
      runtime.spawn(async move {
        if let Err(error) = engine.settle(version, params, request).await {
          if engine.options().on_error.is_none() {
            error!(error = %error, version, "request failed");
          }
        }
      });
    }
  }

  /// Void any run in flight and clear the loading flag.
  ///
  /// The underlying operation keeps going; only its effect is suppressed.
  pub fn cancel(&self) {
    let version = {
      let mut state = self.lock_state();
      StatePatch::new().loading(false).apply(&mut state);
      self.inner.version.fetch_add(1, Ordering::SeqCst) + 1
    };
    debug!(version, "request cancelled");
    (self.inner.subscriber)();
    self.hooks().cancel();
  }

  /// Run again with the latest params.
  pub fn refresh(&self) {
    self.run(self.last_params());
  }

  /// Run again with the latest params and wait for the outcome.
  pub async fn refresh_async(&self) -> Result<RunOutcome<D>, ServiceError> {
    self.run_async(self.last_params()).await
  }

  /// Overwrite `data` directly, bypassing the service.
  pub fn mutate(&self, data: impl Into<Option<D>>) {
    let data = data.into();
    self.hooks().mutate(data.as_ref());
    self.set_state(StatePatch::new().data_opt(data));
  }

  /// Overwrite `data` with a value computed from the current data.
  pub fn mutate_with(&self, update: impl FnOnce(Option<&D>) -> Option<D>) {
    let current = self.lock_state().data.clone();
    self.mutate(update(current.as_ref()));
  }

  fn launch(&self, params: P) -> Launch<D, P> {
    let version = self.next_version();
    let hooks = self.hooks();

    let BeforeOutcome {
      patch,
      stop_now,
      return_now,
    } = hooks.before(&params);

    if stop_now {
      debug!(version, "run stopped by plugin");
      return Launch::Voided(VoidReason::Stopped);
    }

    debug!(version, "run started");
    self.set_state(
      StatePatch::new()
        .loading(true)
        .params(params.clone())
        .merge(patch),
    );

    if return_now {
      let data = self.lock_state().data.clone();
      match data {
        Some(data) => {
          debug!(version, "run resolved by plugin without calling the service");
          return Launch::Ready(data);
        }
        None => {
          warn!(version, "plugin asked to return early without data; calling the service");
          self.set_state(StatePatch::new().loading(true));
        }
      }
    }

    if let Some(on_before) = &self.options().on_before {
      on_before(&params);
    }

    let service = self.service();
    let request = hooks
      .request(service.as_ref(), &params)
      .unwrap_or_else(|| service.call(params.clone()));

    Launch::Pending {
      version,
      params,
      request,
    }
  }

  async fn settle(
    &self,
    version: u64,
    params: P,
    request: ServiceFuture<D>,
  ) -> Result<RunOutcome<D>, ServiceError> {
    let result = request.await;
    let options = self.options();
    match result {
      Ok(data) => {
        let patch = StatePatch::new()
          .data(data.clone())
          .clear_error()
          .loading(false);
        if !self.set_state_if_current(version, patch) {
          return Ok(self.superseded(version));
        }
        debug!(version, "run succeeded");

        if let Some(on_success) = &options.on_success {
          on_success(&data, &params);
        }
        self.hooks().success(&data, &params);

        if let Some(on_finally) = &options.on_finally {
          on_finally(&params, Some(&data), None);
        }
        if self.is_current(version) {
          self.hooks().finally(&params, Some(&data), None);
        }

        Ok(RunOutcome::Completed(data))
      }
      Err(error) => {
        let patch = StatePatch::new().error(error.clone()).loading(false);
        if !self.set_state_if_current(version, patch) {
          return Ok(self.superseded(version));
        }
        debug!(version, error = %error, "run failed");

        if let Some(on_error) = &options.on_error {
          on_error(&error, &params);
        }
        self.hooks().error(&error, &params);

        if let Some(on_finally) = &options.on_finally {
          on_finally(&params, None, Some(&error));
        }
        if self.is_current(version) {
          self.hooks().finally(&params, None, Some(&error));
        }

        Err(error)
      }
    }
  }

  fn superseded(&self, version: u64) -> RunOutcome<D> {
    debug!(version, current = self.version(), "run superseded; result discarded");
    RunOutcome::Voided(VoidReason::Superseded)
  }

  /// Bump the version under the state lock.
  fn next_version(&self) -> u64 {
    let _state = self.lock_state();
    self.inner.version.fetch_add(1, Ordering::SeqCst) + 1
  }

  fn is_current(&self, version: u64) -> bool {
    self.version() == version
  }

  fn last_params(&self) -> P {
    self.lock_state().params.clone().unwrap_or_default()
  }

  fn hooks(&self) -> Arc<HookSet<D, P>> {
    self
      .inner
      .hooks
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .clone()
  }

  fn service(&self) -> Arc<dyn Service<D, P>> {
    self
      .inner
      .service
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .clone()
  }

  fn lock_state(&self) -> MutexGuard<'_, EngineState<D, P>> {
    self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
  }
}
