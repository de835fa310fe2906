//! Request options.

use std::fmt;
use std::sync::Arc;

use tether_cache::{CacheEntry, DEFAULT_CACHE_TIME, Lifetime};

use crate::error::ServiceError;

pub type Callback = Arc<dyn Fn() + Send + Sync>;
pub type BeforeCallback<P> = Arc<dyn Fn(&P) + Send + Sync>;
pub type SuccessCallback<D, P> = Arc<dyn Fn(&D, &P) + Send + Sync>;
pub type ErrorCallback<P> = Arc<dyn Fn(&ServiceError, &P) + Send + Sync>;
pub type FinallyCallback<D, P> = Arc<dyn Fn(&P, Option<&D>, Option<&ServiceError>) + Send + Sync>;
pub type GetCache<D, P> = Arc<dyn Fn(&P) -> Option<CacheEntry<D, P>> + Send + Sync>;
pub type SetCache<D, P> = Arc<dyn Fn(CacheEntry<D, P>) + Send + Sync>;

/// Options recognised by the engine and the built-in plugins.
///
/// Options are immutable once handed to an engine; updating them means
/// installing a new `Options` value (which also rebuilds plugin hooks).
pub struct Options<D, P> {
  /// Suppress automatic runs.
  pub manual: bool,
  /// Gate for every run; while false, runs are stopped before they start.
  pub ready: bool,
  /// Parameters for automatic runs.
  pub default_params: Option<P>,
  /// Changing this sequence triggers an automatic refresh.
  pub refresh_deps: Vec<serde_json::Value>,
  /// Replaces the refresh triggered by a `refresh_deps` change.
  pub refresh_deps_action: Option<Callback>,
  /// Enables caching and request sharing under this key.
  pub cache_key: Option<String>,
  /// Time-to-live of cache entries.
  pub cache_time: Lifetime,
  /// Window during which cached data is fresh enough to skip the service.
  pub stale_time: Lifetime,
  /// Custom cache write, replacing the shared store.
  pub set_cache: Option<SetCache<D, P>>,
  /// Custom cache read, replacing the shared store.
  pub get_cache: Option<GetCache<D, P>>,
  pub on_before: Option<BeforeCallback<P>>,
  pub on_success: Option<SuccessCallback<D, P>>,
  pub on_error: Option<ErrorCallback<P>>,
  pub on_finally: Option<FinallyCallback<D, P>>,
}

impl<D, P> Default for Options<D, P> {
  fn default() -> Self {
    Self {
      manual: false,
      ready: true,
      default_params: None,
      refresh_deps: Vec::new(),
      refresh_deps_action: None,
      cache_key: None,
      cache_time: DEFAULT_CACHE_TIME,
      stale_time: Lifetime::default(),
      set_cache: None,
      get_cache: None,
      on_before: None,
      on_success: None,
      on_error: None,
      on_finally: None,
    }
  }
}

impl<D, P: Clone> Clone for Options<D, P> {
  fn clone(&self) -> Self {
    Self {
      manual: self.manual,
      ready: self.ready,
      default_params: self.default_params.clone(),
      refresh_deps: self.refresh_deps.clone(),
      refresh_deps_action: self.refresh_deps_action.clone(),
      cache_key: self.cache_key.clone(),
      cache_time: self.cache_time,
      stale_time: self.stale_time,
      set_cache: self.set_cache.clone(),
      get_cache: self.get_cache.clone(),
      on_before: self.on_before.clone(),
      on_success: self.on_success.clone(),
      on_error: self.on_error.clone(),
      on_finally: self.on_finally.clone(),
    }
  }
}

impl<D, P: fmt::Debug> fmt::Debug for Options<D, P> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Options")
      .field("manual", &self.manual)
      .field("ready", &self.ready)
      .field("default_params", &self.default_params)
      .field("refresh_deps", &self.refresh_deps)
      .field("refresh_deps_action", &self.refresh_deps_action.is_some())
      .field("cache_key", &self.cache_key)
      .field("cache_time", &self.cache_time)
      .field("stale_time", &self.stale_time)
      .field("custom_cache", &(self.get_cache.is_some() || self.set_cache.is_some()))
      .finish_non_exhaustive()
  }
}

impl<D, P> Options<D, P> {
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn manual(mut self, manual: bool) -> Self {
    self.manual = manual;
    self
  }

  #[must_use]
  pub fn ready(mut self, ready: bool) -> Self {
    self.ready = ready;
    self
  }

  #[must_use]
  pub fn default_params(mut self, params: P) -> Self {
    self.default_params = Some(params);
    self
  }

  #[must_use]
  pub fn refresh_deps(mut self, deps: Vec<serde_json::Value>) -> Self {
    self.refresh_deps = deps;
    self
  }

  #[must_use]
  pub fn refresh_deps_action(mut self, action: impl Fn() + Send + Sync + 'static) -> Self {
    self.refresh_deps_action = Some(Arc::new(action));
    self
  }

  #[must_use]
  pub fn cache_key(mut self, key: impl Into<String>) -> Self {
    self.cache_key = Some(key.into());
    self
  }

  #[must_use]
  pub fn cache_time(mut self, cache_time: impl Into<Lifetime>) -> Self {
    self.cache_time = cache_time.into();
    self
  }

  #[must_use]
  pub fn stale_time(mut self, stale_time: impl Into<Lifetime>) -> Self {
    self.stale_time = stale_time.into();
    self
  }

  #[must_use]
  pub fn set_cache(mut self, f: impl Fn(CacheEntry<D, P>) + Send + Sync + 'static) -> Self {
    self.set_cache = Some(Arc::new(f));
    self
  }

  #[must_use]
  pub fn get_cache(
    mut self,
    f: impl Fn(&P) -> Option<CacheEntry<D, P>> + Send + Sync + 'static,
  ) -> Self {
    self.get_cache = Some(Arc::new(f));
    self
  }

  #[must_use]
  pub fn on_before(mut self, f: impl Fn(&P) + Send + Sync + 'static) -> Self {
    self.on_before = Some(Arc::new(f));
    self
  }

  #[must_use]
  pub fn on_success(mut self, f: impl Fn(&D, &P) + Send + Sync + 'static) -> Self {
    self.on_success = Some(Arc::new(f));
    self
  }

  #[must_use]
  pub fn on_error(mut self, f: impl Fn(&ServiceError, &P) + Send + Sync + 'static) -> Self {
    self.on_error = Some(Arc::new(f));
    self
  }

  #[must_use]
  pub fn on_finally(
    mut self,
    f: impl Fn(&P, Option<&D>, Option<&ServiceError>) + Send + Sync + 'static,
  ) -> Self {
    self.on_finally = Some(Arc::new(f));
    self
  }
}
