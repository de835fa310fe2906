use serde::{Deserialize, Serialize};

/// Default `cache_time_ms`: five minutes.
pub const DEFAULT_CACHE_TIME_MS: i64 = 5 * 60 * 1000;

/// Declarative options for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
  /// Suppress automatic runs on mount and on dependency changes.
  #[serde(default)]
  pub manual: bool,

  /// While false, every run is stopped before it starts.
  #[serde(default = "default_ready")]
  pub ready: bool,

  /// Positional parameters for automatic runs. Expected to be an array.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_params: Option<serde_json::Value>,

  /// Changing any element triggers a refresh.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub refresh_deps: Vec<serde_json::Value>,

  /// Enables caching and request sharing under this key.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cache_key: Option<String>,

  /// Cache entry time-to-live in milliseconds, `-1` to never expire.
  #[serde(default = "default_cache_time_ms")]
  pub cache_time_ms: i64,

  /// Freshness window in milliseconds, `-1` for always fresh.
  #[serde(default)]
  pub stale_time_ms: i64,
}

fn default_ready() -> bool {
  true
}

fn default_cache_time_ms() -> i64 {
  DEFAULT_CACHE_TIME_MS
}

impl Default for RequestConfig {
  fn default() -> Self {
    Self {
      manual: false,
      ready: true,
      default_params: None,
      refresh_deps: Vec::new(),
      cache_key: None,
      cache_time_ms: DEFAULT_CACHE_TIME_MS,
      stale_time_ms: 0,
    }
  }
}

impl RequestConfig {
  /// Parse a request config from JSON.
  pub fn from_json_str(s: &str) -> Result<Self, crate::ConfigError> {
    Ok(serde_json::from_str(s)?)
  }
}
