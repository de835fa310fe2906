//! Registry of outstanding requests, keyed by cache key.
//!
//! A request tracked here is wrapped in a [`Shared`] future so any number of
//! callers can await the same underlying work. When the work settles the
//! entry removes itself, and lookups never hand out a settled handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::trace;

/// Cloneable handle to an outstanding request.
pub type SharedRequest<T> = Shared<BoxFuture<'static, T>>;

struct Tracked<T> {
  id: u64,
  request: SharedRequest<T>,
}

struct RegistryInner<T> {
  requests: HashMap<String, Tracked<T>>,
  next_id: u64,
}

/// Process-shareable map from cache key to the request in flight for it.
pub struct InFlightRegistry<T> {
  inner: Arc<Mutex<RegistryInner<T>>>,
}

impl<T> Clone for InFlightRegistry<T> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<T> InFlightRegistry<T>
where
  T: Clone + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Mutex::new(RegistryInner {
        requests: HashMap::new(),
        next_id: 0,
      })),
    }
  }

  /// The outstanding request for `key`, if one exists and has not settled.
  pub fn get(&self, key: &str) -> Option<SharedRequest<T>> {
    let inner = self.lock();
    let tracked = inner.requests.get(key)?;
    if tracked.request.peek().is_some() {
      return None;
    }
    Some(tracked.request.clone())
  }

  /// Track `request` as the outstanding request for `key`.
  ///
  /// Replaces any previous entry for the key. The returned handle is the one
  /// stored in the registry; await it (or a clone) to drive the request.
  pub fn track(&self, key: &str, request: BoxFuture<'static, T>) -> SharedRequest<T> {
    let mut inner = self.lock();
    inner.next_id += 1;
    let id = inner.next_id;

    let registry = Arc::downgrade(&self.inner);
    let owned_key = key.to_string();
    let shared = async move {
      let output = request.await;
      settle(&registry, &owned_key, id);
      output
    }
    .boxed()
    .shared();

    inner.requests.insert(
      key.to_string(),
      Tracked {
        id,
        request: shared.clone(),
      },
    );
    trace!(key, request_id = id, "in-flight request tracked");

    shared
  }

  /// Whether an unsettled request is tracked for `key`.
  pub fn contains(&self, key: &str) -> bool {
    self.get(key).is_some()
  }

  /// Number of tracked entries.
  pub fn len(&self) -> usize {
    self.lock().requests.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn lock(&self) -> MutexGuard<'_, RegistryInner<T>> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl<T> Default for InFlightRegistry<T>
where
  T: Clone + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

fn settle<T>(registry: &Weak<Mutex<RegistryInner<T>>>, key: &str, id: u64) {
  let Some(registry) = registry.upgrade() else {
    return;
  };
  let mut inner = registry.lock().unwrap_or_else(|e| e.into_inner());
  if inner.requests.get(key).is_some_and(|t| t.id == id) {
    inner.requests.remove(key);
    trace!(key, request_id = id, "in-flight request settled");
  }
}
