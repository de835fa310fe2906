//! Keyed cache storage with per-entry expiry.
//!
//! Each write replaces the entry for its key and reschedules a single expiry
//! task on the ambient tokio runtime. Reads also check the deadline, so an
//! entry is never observable after it expires even if the runtime has not
//! yet polled the expiry task (or no runtime was available to spawn it).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::entry::CacheEntry;
use crate::lifetime::Lifetime;

struct Slot<D, P> {
  entry: CacheEntry<D, P>,
  expires_at: Option<Instant>,
  generation: u64,
  expiry: Option<AbortHandle>,
}

impl<D, P> Slot<D, P> {
  fn is_expired(&self, now: Instant) -> bool {
    self.expires_at.is_some_and(|at| now >= at)
  }

  fn cancel_expiry(&self) {
    if let Some(handle) = &self.expiry {
      handle.abort();
    }
  }
}

struct StoreInner<D, P> {
  slots: HashMap<String, Slot<D, P>>,
  next_generation: u64,
}

/// Process-shareable keyed storage of cache entries.
///
/// Concurrent writers to one key are last-write-wins.
pub struct CacheStore<D, P> {
  inner: Arc<Mutex<StoreInner<D, P>>>,
}

impl<D, P> Clone for CacheStore<D, P> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<D, P> CacheStore<D, P>
where
  D: Clone + Send + 'static,
  P: Clone + Send + 'static,
{
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Mutex::new(StoreInner {
        slots: HashMap::new(),
        next_generation: 0,
      })),
    }
  }

  /// Write an entry, replacing any previous one and rescheduling expiry.
  ///
  /// With `Lifetime::Forever` the entry stays until removed or overwritten.
  pub fn set(&self, key: &str, cache_time: Lifetime, entry: CacheEntry<D, P>) {
    let mut inner = self.lock();
    inner.next_generation += 1;
    let generation = inner.next_generation;

    if let Some(previous) = inner.slots.remove(key) {
      previous.cancel_expiry();
    }

    let expires_at = cache_time.duration().map(|ttl| Instant::now() + ttl);
    let expiry = expires_at.and_then(|at| self.schedule_expiry(key, generation, at));

    trace!(key, generation, cache_time_ms = cache_time.as_millis(), "cache entry written");

    inner.slots.insert(
      key.to_string(),
      Slot {
        entry,
        expires_at,
        generation,
        expiry,
      },
    );
  }

  /// Read the live entry for a key.
  pub fn get(&self, key: &str) -> Option<CacheEntry<D, P>> {
    let mut inner = self.lock();
    let now = Instant::now();

    if inner.slots.get(key)?.is_expired(now) {
      if let Some(slot) = inner.slots.remove(key) {
        slot.cancel_expiry();
      }
      debug!(key, "cache entry expired on read");
      return None;
    }

    inner.slots.get(key).map(|slot| slot.entry.clone())
  }

  /// Remove the entry for a key. Returns `true` if a live entry was removed.
  pub fn remove(&self, key: &str) -> bool {
    let now = Instant::now();
    match self.lock().slots.remove(key) {
      Some(slot) => {
        slot.cancel_expiry();
        !slot.is_expired(now)
      }
      None => false,
    }
  }

  /// Remove every entry.
  pub fn clear(&self) {
    let mut inner = self.lock();
    for (_, slot) in inner.slots.drain() {
      slot.cancel_expiry();
    }
  }

  /// Keys of all live entries.
  pub fn keys(&self) -> Vec<String> {
    let now = Instant::now();
    self
      .lock()
      .slots
      .iter()
      .filter(|(_, slot)| !slot.is_expired(now))
      .map(|(key, _)| key.clone())
      .collect()
  }

  /// Number of live entries.
  pub fn len(&self) -> usize {
    let now = Instant::now();
    self
      .lock()
      .slots
      .values()
      .filter(|slot| !slot.is_expired(now))
      .count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn schedule_expiry(&self, key: &str, generation: u64, at: Instant) -> Option<AbortHandle> {
    let handle = tokio::runtime::Handle::try_current().ok()?;
    let store = Arc::downgrade(&self.inner);
    let key = key.to_string();

    let task = handle.spawn(async move {
      tokio::time::sleep_until(at).await;
      expire(&store, &key, generation);
    });

    Some(task.abort_handle())
  }

  fn lock(&self) -> MutexGuard<'_, StoreInner<D, P>> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl<D, P> Default for CacheStore<D, P>
where
  D: Clone + Send + 'static,
  P: Clone + Send + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

/// Delete the entry for `key` if it still belongs to `generation`.
fn expire<D, P>(store: &Weak<Mutex<StoreInner<D, P>>>, key: &str, generation: u64) {
  let Some(store) = store.upgrade() else {
    return;
  };
  let mut inner = store.lock().unwrap_or_else(|e| e.into_inner());
  if inner
    .slots
    .get(key)
    .is_some_and(|slot| slot.generation == generation)
  {
    inner.slots.remove(key);
    debug!(key, generation, "cache entry expired");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn entry(data: &str) -> CacheEntry<String, Vec<u32>> {
    CacheEntry::new(data.to_string(), vec![1])
  }

  #[tokio::test(start_paused = true)]
  async fn test_set_and_get() {
    let store = CacheStore::new();
    store.set("users", Lifetime::For(Duration::from_secs(1)), entry("a"));

    let cached = store.get("users").expect("entry should be cached");
    assert_eq!(cached.data, "a");
    assert_eq!(cached.params, vec![1]);
    assert!(store.get("missing").is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_expiry_after_cache_time() {
    let store = CacheStore::new();
    store.set("users", Lifetime::For(Duration::from_millis(100)), entry("a"));

    tokio::time::sleep(Duration::from_millis(99)).await;
    assert!(store.get("users").is_some());

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert!(store.get("users").is_none());
    assert!(store.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_rewrite_reschedules_expiry() {
    let store = CacheStore::new();
    store.set("users", Lifetime::For(Duration::from_millis(100)), entry("a"));

    tokio::time::sleep(Duration::from_millis(80)).await;
    store.set("users", Lifetime::For(Duration::from_millis(100)), entry("b"));

    // The first write's deadline has passed but the entry was rescheduled.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.get("users").unwrap().data, "b");

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(store.get("users").is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_forever_never_expires() {
    let store = CacheStore::new();
    store.set("users", Lifetime::Forever, entry("a"));

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(store.get("users").unwrap().data, "a");
  }

  #[tokio::test(start_paused = true)]
  async fn test_last_write_wins() {
    let store = CacheStore::new();
    let other = store.clone();
    store.set("k", Lifetime::Forever, entry("first"));
    other.set("k", Lifetime::Forever, entry("second"));

    assert_eq!(store.get("k").unwrap().data, "second");
    assert_eq!(store.len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_remove_and_clear() {
    let store = CacheStore::new();
    store.set("a", Lifetime::Forever, entry("1"));
    store.set("b", Lifetime::Forever, entry("2"));

    assert!(store.remove("a"));
    assert!(!store.remove("a"));

    let mut keys = store.keys();
    keys.sort();
    assert_eq!(keys, vec!["b".to_string()]);

    store.clear();
    assert!(store.is_empty());
  }

  #[test]
  fn test_lazy_expiry_without_runtime() {
    let store: CacheStore<String, Vec<u32>> = CacheStore::new();
    store.set("k", Lifetime::For(Duration::ZERO), entry("a"));

    // No runtime to run the expiry task; the read-side check still applies.
    assert!(store.get("k").is_none());
  }
}
