//! Caching, request sharing and cross-instance sync.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use tether_cache::{
  CacheBus, CacheEntry, CacheStore, InFlightRegistry, Lifetime, SharedRequest, Subscription,
};
use tether_engine::{
  BeforeOutcome, Engine, GetCache, NoopHooks, Options, Plugin, PluginHooks, Service, ServiceError,
  ServiceFuture, SetCache, StatePatch, WeakEngine,
};
use tracing::{debug, trace};

type ServiceResult<D> = Result<D, ServiceError>;

/// Cache state shared by every request that should see the same keys.
pub struct SharedCache<D, P> {
  pub store: CacheStore<D, P>,
  pub bus: CacheBus<D>,
  pub requests: InFlightRegistry<ServiceResult<D>>,
}

impl<D, P> Clone for SharedCache<D, P> {
  fn clone(&self) -> Self {
    Self {
      store: self.store.clone(),
      bus: self.bus.clone(),
      requests: self.requests.clone(),
    }
  }
}

impl<D, P> SharedCache<D, P>
where
  D: Clone + Send + Sync + 'static,
  P: Clone + Send + 'static,
{
  pub fn new() -> Self {
    Self {
      store: CacheStore::new(),
      bus: CacheBus::new(),
      requests: InFlightRegistry::new(),
    }
  }

  /// Drop cached entries: the given keys, or everything when `keys` is `None`.
  pub fn clear(&self, keys: Option<&[&str]>) {
    match keys {
      Some(keys) => {
        for key in keys {
          self.store.remove(key);
        }
      }
      None => self.store.clear(),
    }
  }
}

impl<D, P> Default for SharedCache<D, P>
where
  D: Clone + Send + Sync + 'static,
  P: Clone + Send + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

/// Per-request bookkeeping that survives hook rebuilds.
struct Slot<D> {
  subscription: Option<Subscription<D>>,
  /// The last request this instance started itself.
  current: Option<SharedRequest<ServiceResult<D>>>,
  subscribed: bool,
}

/// Serves cached data, shares in-flight requests and syncs instances.
///
/// Does nothing unless the options carry a `cache_key`.
pub struct CachePlugin<D, P> {
  cache: SharedCache<D, P>,
  slot: Arc<Mutex<Slot<D>>>,
}

impl<D, P> CachePlugin<D, P>
where
  D: Clone + Send + Sync + 'static,
  P: Clone + Default + Send + Sync + 'static,
{
  pub fn new(cache: SharedCache<D, P>) -> Self {
    Self {
      cache,
      slot: Arc::new(Mutex::new(Slot {
        subscription: None,
        current: None,
        subscribed: false,
      })),
    }
  }

  fn cache_for(&self, key: &str, options: &Options<D, P>) -> KeyedCache<D, P> {
    KeyedCache {
      key: key.to_string(),
      cache_time: options.cache_time,
      get_cache: options.get_cache.clone(),
      set_cache: options.set_cache.clone(),
      shared: self.cache.clone(),
    }
  }
}

impl<D, P> Plugin<D, P> for CachePlugin<D, P>
where
  D: Clone + Send + Sync + 'static,
  P: Clone + Default + Send + Sync + 'static,
{
  fn name(&self) -> &'static str {
    "cache"
  }

  fn on_init(&self, options: &Options<D, P>) -> StatePatch<D, P> {
    let Some(key) = options.cache_key.as_deref() else {
      return StatePatch::new();
    };
    let Some(entry) = self.cache_for(key, options).read(&P::default()) else {
      return StatePatch::new();
    };

    let fresh = options.stale_time.covers(entry.age());
    debug!(key, fresh, "seeding state from cache");
    let patch = StatePatch::new().data(entry.data).params(entry.params);
    if fresh {
      patch.loading(false)
    } else {
      patch
    }
  }

  fn hooks(&self, engine: &Engine<D, P>, options: &Options<D, P>) -> Box<dyn PluginHooks<D, P>> {
    let Some(key) = options.cache_key.as_deref() else {
      return Box::new(NoopHooks);
    };
    let cache = self.cache_for(key, options);
    let engine = engine.downgrade();

    {
      let mut slot = lock(&self.slot);
      if !slot.subscribed {
        slot.subscription = Some(cache.subscribe(&engine));
        slot.subscribed = true;
      }
    }

    Box::new(CacheHooks {
      cache,
      stale_time: options.stale_time,
      slot: self.slot.clone(),
      engine,
    })
  }

  fn teardown(&self) {
    let mut slot = lock(&self.slot);
    slot.subscribed = false;
    if let Some(subscription) = slot.subscription.take() {
      trace!(key = subscription.key(), "cache subscription released");
    }
  }
}

/// Cache access for one key under one set of options.
struct KeyedCache<D, P> {
  key: String,
  cache_time: Lifetime,
  get_cache: Option<GetCache<D, P>>,
  set_cache: Option<SetCache<D, P>>,
  shared: SharedCache<D, P>,
}

impl<D, P> KeyedCache<D, P>
where
  D: Clone + Send + Sync + 'static,
  P: Clone + Default + Send + Sync + 'static,
{
  fn read(&self, params: &P) -> Option<CacheEntry<D, P>> {
    match &self.get_cache {
      Some(get_cache) => get_cache(params),
      None => self.shared.store.get(&self.key),
    }
  }

  /// Persist an entry and broadcast its data to the key's listeners.
  fn write(&self, data: D, params: P) {
    let entry = CacheEntry::new(data.clone(), params);
    match &self.set_cache {
      Some(set_cache) => set_cache(entry),
      None => self.shared.store.set(&self.key, self.cache_time, entry),
    }
    let notified = self.shared.bus.trigger(&self.key, &data);
    trace!(key = %self.key, notified, "cache written");
  }

  fn subscribe(&self, engine: &WeakEngine<D, P>) -> Subscription<D> {
    let engine = engine.clone();
    self.shared.bus.subscribe(&self.key, move |data: &D| {
      if let Some(engine) = engine.upgrade() {
        engine.set_state(StatePatch::new().data(data.clone()));
      }
    })
  }
}

struct CacheHooks<D, P> {
  cache: KeyedCache<D, P>,
  stale_time: Lifetime,
  slot: Arc<Mutex<Slot<D>>>,
  engine: WeakEngine<D, P>,
}

impl<D, P> CacheHooks<D, P>
where
  D: Clone + Send + Sync + 'static,
  P: Clone + Default + Send + Sync + 'static,
{
  /// Write without hearing our own broadcast.
  ///
  /// Only re-subscribes while the plugin is attached.
  fn write_quietly(&self, data: D, params: P) {
    let attached = {
      let mut slot = lock(&self.slot);
      drop(slot.subscription.take());
      slot.subscribed
    };
    self.cache.write(data, params);
    if !attached {
      return;
    }
    let subscription = self.cache.subscribe(&self.engine);
    let mut slot = lock(&self.slot);
    if slot.subscribed {
      slot.subscription = Some(subscription);
    }
  }
}

impl<D, P> PluginHooks<D, P> for CacheHooks<D, P>
where
  D: Clone + Send + Sync + 'static,
  P: Clone + Default + Send + Sync + 'static,
{
  fn on_before(&self, params: &P) -> Option<BeforeOutcome<D, P>> {
    let entry = self.cache.read(params)?;
    let patch = StatePatch::new().data(entry.data.clone()).clear_error();

    if self.stale_time.covers(entry.age()) {
      debug!(key = %self.cache.key, "serving fresh cache entry");
      Some(BeforeOutcome::return_now(patch.loading(false)))
    } else {
      Some(BeforeOutcome::patch(patch))
    }
  }

  fn on_request(&self, service: &dyn Service<D, P>, params: &P) -> Option<ServiceFuture<D>> {
    let registry = &self.cache.shared.requests;

    if let Some(outstanding) = registry.get(&self.cache.key) {
      let ours = lock(&self.slot)
        .current
        .as_ref()
        .is_some_and(|current| current.ptr_eq(&outstanding));
      if !ours {
        debug!(key = %self.cache.key, "joining in-flight request");
        return Some(outstanding.boxed());
      }
    }

    // slot lock released: the service may call back into mutate
    let request = registry.track(&self.cache.key, service.call(params.clone()));
    lock(&self.slot).current = Some(request.clone());
    Some(request.boxed())
  }

  fn on_success(&self, data: &D, params: &P) {
    self.write_quietly(data.clone(), params.clone());
  }

  fn on_mutate(&self, data: Option<&D>) {
    let Some(data) = data else {
      return;
    };
    let params = self
      .engine
      .upgrade()
      .and_then(|engine| engine.state().params)
      .unwrap_or_default();
    self.write_quietly(data.clone(), params);
  }
}

fn lock<D>(slot: &Mutex<Slot<D>>) -> MutexGuard<'_, Slot<D>> {
  slot.lock().unwrap_or_else(|e| e.into_inner())
}
