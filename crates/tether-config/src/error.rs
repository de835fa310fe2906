use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// The document is not valid JSON for the expected type.
  #[error("failed to parse configuration: {0}")]
  Parse(#[from] serde_json::Error),

  /// Two instances share an id.
  #[error("duplicate instance '{instance_id}'")]
  DuplicateInstance { instance_id: String },

  /// A step refers to an instance that is not declared.
  #[error("step at {at_ms}ms refers to unknown instance '{instance_id}'")]
  UnknownInstance { instance_id: String, at_ms: u64 },
}
