//! Building engine options from declarative config.

use serde_json::Value;
use tether_cache::Lifetime;
use tether_config::RequestConfig;
use tether_engine::Options;
use tracing::warn;

/// Positional parameters, as written in config files.
pub type JsonParams = Vec<Value>;

/// Convert a [`RequestConfig`] into engine options.
///
/// `default_params` should be an array of positional parameters; any other
/// value is used as the single parameter (and warned about in debug builds).
pub fn options_from_config<D>(config: &RequestConfig) -> Options<D, JsonParams> {
  let default_params = config.default_params.as_ref().map(|value| match value {
    Value::Array(items) => items.clone(),
    other => {
      if cfg!(debug_assertions) {
        warn!(
          kind = json_kind(other),
          "expected default_params to be an array; using it as the only parameter"
        );
      }
      vec![other.clone()]
    }
  });

  Options {
    manual: config.manual,
    ready: config.ready,
    default_params,
    refresh_deps: config.refresh_deps.clone(),
    cache_key: config.cache_key.clone(),
    cache_time: Lifetime::from_millis(config.cache_time_ms),
    stale_time: Lifetime::from_millis(config.stale_time_ms),
    ..Options::default()
  }
}

fn json_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
