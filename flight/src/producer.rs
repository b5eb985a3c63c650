use crate::TaskSpawner;

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

pub(crate) type SyncProduceFn<V, E> = Arc<dyn Fn() -> Result<V, E> + Send + Sync>;
pub(crate) type AsyncProduceFn<V, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<V, E>> + Send + Sync>;

/// The producer as configured on the builder, before a spawner is resolved.
pub(crate) enum ProducerFn<V, E> {
  Sync(SyncProduceFn<V, E>),
  Async(AsyncProduceFn<V, E>),
}

impl<V, E> ProducerFn<V, E> {
  pub(crate) fn from_sync<F>(f: F) -> Self
  where
    F: Fn() -> Result<V, E> + Send + Sync + 'static,
  {
    ProducerFn::Sync(Arc::new(f))
  }

  pub(crate) fn from_async<F, Fut>(f: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
  {
    let produce_fn = move || Box::pin(f()) as BoxFuture<'static, Result<V, E>>;
    ProducerFn::Async(Arc::new(produce_fn))
  }
}

/// A producer bound to the context it runs on.
///
/// Sync producers get a dedicated thread per attempt; async producers are
/// handed to the spawner. Either way, the cache only ever holds one attempt
/// outstanding at a time.
pub(crate) enum Producer<V, E> {
  Sync(SyncProduceFn<V, E>),
  Async {
    produce: AsyncProduceFn<V, E>,
    spawner: Arc<dyn TaskSpawner>,
  },
}

impl<V, E> Producer<V, E> {
  pub(crate) fn is_async(&self) -> bool {
    matches!(self, Producer::Async { .. })
  }
}
