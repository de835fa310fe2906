//! Keyed publish/subscribe for cache updates.
//!
//! Engines sharing a cache key subscribe to the key's channel. When one of
//! them writes a new value it triggers the channel, and every other
//! subscriber receives the value synchronously.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::trace;

type Listener<D> = Arc<dyn Fn(&D) + Send + Sync>;

struct BusInner<D> {
  listeners: HashMap<String, Vec<(u64, Listener<D>)>>,
  next_id: u64,
}

/// Process-shareable keyed listener registry.
pub struct CacheBus<D> {
  inner: Arc<Mutex<BusInner<D>>>,
}

impl<D> Clone for CacheBus<D> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<D> CacheBus<D> {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Mutex::new(BusInner {
        listeners: HashMap::new(),
        next_id: 0,
      })),
    }
  }

  /// Register a listener for `key`.
  ///
  /// The listener stays registered until the returned [`Subscription`] is
  /// unsubscribed or dropped.
  #[must_use = "dropping the subscription unsubscribes immediately"]
  pub fn subscribe(
    &self,
    key: &str,
    listener: impl Fn(&D) + Send + Sync + 'static,
  ) -> Subscription<D> {
    let mut inner = self.lock();
    inner.next_id += 1;
    let id = inner.next_id;
    inner
      .listeners
      .entry(key.to_string())
      .or_default()
      .push((id, Arc::new(listener)));

    trace!(key, subscription_id = id, "cache bus subscribed");

    Subscription {
      bus: Arc::downgrade(&self.inner),
      key: key.to_string(),
      id,
    }
  }

  /// Deliver `data` to every listener of `key`. Returns how many were notified.
  ///
  /// Listeners run after the registry lock is released, so a listener may
  /// subscribe or unsubscribe without deadlocking.
  pub fn trigger(&self, key: &str, data: &D) -> usize {
    let listeners: Vec<Listener<D>> = self
      .lock()
      .listeners
      .get(key)
      .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
      .unwrap_or_default();

    trace!(key, listeners = listeners.len(), "cache bus triggered");

    for listener in &listeners {
      listener(data);
    }
    listeners.len()
  }

  /// Number of listeners currently registered for `key`.
  pub fn listener_count(&self, key: &str) -> usize {
    self.lock().listeners.get(key).map_or(0, Vec::len)
  }

  fn lock(&self) -> MutexGuard<'_, BusInner<D>> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl<D> Default for CacheBus<D> {
  fn default() -> Self {
    Self::new()
  }
}

/// Registration handle returned by [`CacheBus::subscribe`].
pub struct Subscription<D> {
  bus: Weak<Mutex<BusInner<D>>>,
  key: String,
  id: u64,
}

impl<D> Subscription<D> {
  /// Cache key this subscription listens on.
  pub fn key(&self) -> &str {
    &self.key
  }

  /// Remove the listener. Equivalent to dropping the handle.
  pub fn unsubscribe(self) {}

  fn detach(&self) {
    let Some(bus) = self.bus.upgrade() else {
      return;
    };
    let mut inner = bus.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(list) = inner.listeners.get_mut(&self.key) {
      list.retain(|(id, _)| *id != self.id);
      if list.is_empty() {
        inner.listeners.remove(&self.key);
      }
    }
    trace!(key = %self.key, subscription_id = self.id, "cache bus unsubscribed");
  }
}

impl<D> Drop for Subscription<D> {
  fn drop(&mut self) {
    self.detach();
  }
}

impl<D> std::fmt::Debug for Subscription<D> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.key)
      .field("id", &self.id)
      .finish()
  }
}
