use crate::error::BuildError;
use crate::handles::FlightCache;
use crate::producer::{Producer, ProducerFn};
use crate::shared::FlightShared;
use crate::task::notifier::Notifier;
use crate::{FlightListener, TaskSpawner};

use core::fmt;
use std::future::Future;
use std::sync::Arc;

/// A builder for creating `FlightCache` instances.
///
/// ```no_run
/// use fibre_flight::FlightCache;
///
/// # async fn fetch_config() -> Result<String, std::io::Error> { Ok(String::new()) }
/// # #[tokio::main]
/// # async fn main() {
/// let cache = FlightCache::builder()
///   .name("config")
///   .producer(|| fetch_config())
///   .build()
///   .unwrap();
///
/// let config = cache.get().await;
/// # }
/// ```
pub struct FlightCacheBuilder<V, E> {
  producer: Option<ProducerFn<V, E>>,
  spawner: Option<Arc<dyn TaskSpawner>>,
  listener: Option<Arc<dyn FlightListener<V, E>>>,
  name: Option<String>,
}

impl<V, E> fmt::Debug for FlightCacheBuilder<V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FlightCacheBuilder")
      .field("name", &self.name)
      .field("has_producer", &self.producer.is_some())
      .field("has_spawner", &self.spawner.is_some())
      .field("has_listener", &self.listener.is_some())
      .finish()
  }
}

impl<V, E> Default for FlightCacheBuilder<V, E> {
  fn default() -> Self {
    Self {
      producer: None,
      spawner: None,
      listener: None,
      name: None,
    }
  }
}

impl<V, E> FlightCacheBuilder<V, E> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets an asynchronous producer.
  ///
  /// The closure is invoked once per production and the future it returns is
  /// driven by the configured `TaskSpawner`. Replaces any producer set before.
  ///
  /// If the future panics, or is dropped because its runtime shut down, the
  /// production never completes and the cache stays `Producing`. The runtime
  /// captured by default is the one current at `build()`, so it must outlive
  /// the cache.
  pub fn producer<F, Fut>(mut self, f: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
  {
    self.producer = Some(ProducerFn::from_async(f));
    self
  }

  /// Sets a synchronous producer.
  ///
  /// Each production runs the closure on its own thread, so callers of
  /// `preload()` and `value()` never block on it. Replaces any producer set before.
  ///
  /// # Panics
  ///
  /// A panic in the closure unwinds only the production thread. That
  /// production never completes, so the cache stays `Producing` and later
  /// `value()` calls wait on it indefinitely.
  pub fn sync_producer<F>(mut self, f: F) -> Self
  where
    F: Fn() -> Result<V, E> + Send + Sync + 'static,
  {
    self.producer = Some(ProducerFn::from_sync(f));
    self
  }

  /// Sets the runtime used to drive an asynchronous producer.
  ///
  /// With the `tokio` feature enabled this defaults to the tokio runtime the
  /// cache is built in.
  pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self
  }

  /// Registers a listener for the cache's lifecycle events.
  pub fn listener<Listener>(mut self, listener: Listener) -> Self
  where
    Listener: FlightListener<V, E> + 'static,
  {
    self.listener = Some(Arc::new(listener));
    self
  }

  /// Names the cache. The name is attached to every log record.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }
}

impl<V, E> FlightCacheBuilder<V, E>
where
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  /// Builds the cache. It starts out empty; nothing is produced until the
  /// first `preload()` or `value()`.
  pub fn build(self) -> Result<FlightCache<V, E>, BuildError> {
    let Self {
      producer,
      spawner,
      listener,
      name,
    } = self;

    let producer = match producer.ok_or(BuildError::MissingProducer)? {
      ProducerFn::Sync(produce) => Producer::Sync(produce),
      ProducerFn::Async(produce) => Producer::Async {
        produce,
        spawner: spawner
          .or_else(default_spawner)
          .ok_or(BuildError::SpawnerRequired)?,
      },
    };
    let notifier = listener.map(Notifier::spawn);

    Ok(FlightCache {
      shared: Arc::new(FlightShared::new(producer, notifier, name)),
    })
  }
}

#[cfg(feature = "tokio")]
fn default_spawner() -> Option<Arc<dyn TaskSpawner>> {
  crate::runtime::TokioSpawner::try_current().map(|spawner| Arc::new(spawner) as Arc<dyn TaskSpawner>)
}

#[cfg(not(feature = "tokio"))]
fn default_spawner() -> Option<Arc<dyn TaskSpawner>> {
  None
}
