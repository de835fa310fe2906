//! Engine state and partial updates.

use crate::error::ServiceError;

/// Observable state of one request.
#[derive(Debug, Clone)]
pub struct EngineState<D, P> {
  /// A run is in progress.
  pub loading: bool,
  /// Parameters of the latest started run.
  pub params: Option<P>,
  /// Latest successful result (or mutated value).
  pub data: Option<D>,
  /// Latest failure.
  pub error: Option<ServiceError>,
}

impl<D, P> Default for EngineState<D, P> {
  fn default() -> Self {
    Self {
      loading: false,
      params: None,
      data: None,
      error: None,
    }
  }
}

/// A shallow, field-by-field update to [`EngineState`].
///
/// An outer `None` leaves the field untouched; `Some(value)` overwrites it,
/// so `error: Some(None)` clears the error.
#[derive(Debug, Clone)]
pub struct StatePatch<D, P> {
  pub loading: Option<bool>,
  pub params: Option<Option<P>>,
  pub data: Option<Option<D>>,
  pub error: Option<Option<ServiceError>>,
}

impl<D, P> Default for StatePatch<D, P> {
  fn default() -> Self {
    Self {
      loading: None,
      params: None,
      data: None,
      error: None,
    }
  }
}

impl<D, P> StatePatch<D, P> {
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn loading(mut self, loading: bool) -> Self {
    self.loading = Some(loading);
    self
  }

  #[must_use]
  pub fn params(mut self, params: P) -> Self {
    self.params = Some(Some(params));
    self
  }

  #[must_use]
  pub fn data(mut self, data: D) -> Self {
    self.data = Some(Some(data));
    self
  }

  /// Set `data` to the given value, including absent.
  #[must_use]
  pub fn data_opt(mut self, data: Option<D>) -> Self {
    self.data = Some(data);
    self
  }

  #[must_use]
  pub fn error(mut self, error: ServiceError) -> Self {
    self.error = Some(Some(error));
    self
  }

  #[must_use]
  pub fn clear_error(mut self) -> Self {
    self.error = Some(None);
    self
  }

  /// True when the patch changes nothing.
  pub fn is_empty(&self) -> bool {
    self.loading.is_none() && self.params.is_none() && self.data.is_none() && self.error.is_none()
  }

  /// Combine with a later patch; fields set in `later` win.
  #[must_use]
  pub fn merge(self, later: Self) -> Self {
    Self {
      loading: later.loading.or(self.loading),
      params: later.params.or(self.params),
      data: later.data.or(self.data),
      error: later.error.or(self.error),
    }
  }

  /// Apply the patch to a state.
  pub fn apply(self, state: &mut EngineState<D, P>) {
    if let Some(loading) = self.loading {
      state.loading = loading;
    }
    if let Some(params) = self.params {
      state.params = params;
    }
    if let Some(data) = self.data {
      state.data = data;
    }
    if let Some(error) = self.error {
      state.error = error;
    }
  }
}
