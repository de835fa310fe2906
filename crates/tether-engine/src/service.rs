//! The underlying operation an engine manages.

use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::ServiceError;

/// Boxed future of one service call.
pub type ServiceFuture<D> = BoxFuture<'static, Result<D, ServiceError>>;

/// An asynchronous operation taking the engine's parameters.
///
/// Implemented for any `Fn(P) -> impl Future<Output = Result<D, ServiceError>>`,
/// so plain async closures work:
///
/// ```ignore
/// let service = |id: u32| async move { fetch_user(id).await.map_err(ServiceError::new) };
/// ```
pub trait Service<D, P>: Send + Sync {
  fn call(&self, params: P) -> ServiceFuture<D>;
}

impl<D, P, F, Fut> Service<D, P> for F
where
  F: Fn(P) -> Fut + Send + Sync,
  Fut: Future<Output = Result<D, ServiceError>> + Send + 'static,
{
  fn call(&self, params: P) -> ServiceFuture<D> {
    (self)(params).boxed()
  }
}
