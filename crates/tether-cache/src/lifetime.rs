//! Durations for cache expiry and freshness windows.

use std::time::Duration;

/// Default time-to-live of a cache entry (five minutes).
pub const DEFAULT_CACHE_TIME: Lifetime = Lifetime::For(Duration::from_secs(5 * 60));

/// How long something lasts: a finite duration or forever.
///
/// Configuration files express `Forever` as `-1` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
  /// Lasts for the given duration.
  For(Duration),
  /// Never runs out.
  Forever,
}

impl Lifetime {
  /// Build a lifetime from milliseconds, where any negative value means forever.
  pub fn from_millis(ms: i64) -> Self {
    if ms < 0 {
      Self::Forever
    } else {
      Self::For(Duration::from_millis(ms as u64))
    }
  }

  /// The lifetime in milliseconds, `-1` for forever.
  pub fn as_millis(&self) -> i64 {
    match self {
      Self::For(d) => d.as_millis().min(i64::MAX as u128) as i64,
      Self::Forever => -1,
    }
  }

  /// Finite duration, if any.
  pub fn duration(&self) -> Option<Duration> {
    match self {
      Self::For(d) => Some(*d),
      Self::Forever => None,
    }
  }

  /// Whether something of the given age is still inside this window.
  ///
  /// A zero-length window contains nothing, so data with a zero staleness
  /// window is always considered stale.
  pub fn covers(&self, age: Duration) -> bool {
    match self {
      Self::Forever => true,
      Self::For(d) => !d.is_zero() && age <= *d,
    }
  }
}

impl Default for Lifetime {
  fn default() -> Self {
    Self::For(Duration::ZERO)
  }
}

impl From<Duration> for Lifetime {
  fn from(d: Duration) -> Self {
    Self::For(d)
  }
}
