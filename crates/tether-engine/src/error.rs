//! Error types for request execution.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Failure reported by the underlying service.
///
/// Cloneable so it can live in engine state, be handed to every callback and
/// be shared between callers awaiting the same deduplicated request.
#[derive(Debug, Clone, Error)]
#[error("{inner}")]
pub struct ServiceError {
  inner: Arc<dyn StdError + Send + Sync + 'static>,
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

impl ServiceError {
  /// Wrap any error.
  pub fn new(error: impl StdError + Send + Sync + 'static) -> Self {
    Self {
      inner: Arc::new(error),
    }
  }

  /// Create an error from a message.
  pub fn msg(message: impl Into<String>) -> Self {
    Self::new(Message(message.into()))
  }

  /// Borrow the wrapped error as a concrete type.
  pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
    self.inner.downcast_ref::<E>()
  }

  /// Whether two handles wrap the same error instance.
  pub fn ptr_eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }
}

impl From<std::io::Error> for ServiceError {
  fn from(error: std::io::Error) -> Self {
    Self::new(error)
  }
}

impl From<serde_json::Error> for ServiceError {
  fn from(error: serde_json::Error) -> Self {
    Self::new(error)
  }
}
