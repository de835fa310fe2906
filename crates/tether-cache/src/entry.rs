use std::time::Duration;

use tokio::time::Instant;

/// A cached request result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<D, P> {
  /// Result of the request.
  pub data: D,
  /// Parameters the request was issued with.
  pub params: P,
  /// When the entry was written.
  pub time: Instant,
}

impl<D, P> CacheEntry<D, P> {
  /// Create an entry stamped with the current time.
  pub fn new(data: D, params: P) -> Self {
    Self {
      data,
      params,
      time: Instant::now(),
    }
  }

  /// Time elapsed since the entry was written.
  pub fn age(&self) -> Duration {
    Instant::now().saturating_duration_since(self.time)
  }
}
