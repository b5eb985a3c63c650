use crate::broadcast::{Outcome, Subscription};
use crate::builder::FlightCacheBuilder;
use crate::listener::Trigger;
use crate::metrics::MetricsSnapshot;
use crate::shared::{Acquired, FlightShared};
use crate::state::{State, StateKind};

use std::fmt;
use std::sync::Arc;

/// A thread-safe, single-slot, single-flight cache.
///
/// `FlightCache` wraps a producer and makes sure it runs at most once at a
/// time: every caller arriving while a production is in flight shares that
/// production's outcome. A successful value is kept for the lifetime of the
/// cache. A failure is handed to every subscriber of that attempt and then
/// forgotten, so the next `preload()` or `value()` starts a fresh attempt.
///
/// Handles are cheap to clone and all clones share the same slot. The cache
/// is destroyed when the last handle is dropped; a production still running
/// at that point finishes and delivers to the subscriptions that remain.
///
/// # Stuck productions
///
/// A production only ends when the producer returns. If a producer panics,
/// or an async producer's future is dropped because its runtime shut down,
/// the cache stays `Producing` for good: every later `value()` joins that
/// production and never resolves. Keep producers panic-free and make sure
/// the runtime behind the spawner outlives the cache.
pub struct FlightCache<V: Send + Sync, E: Send + Sync> {
  pub(crate) shared: Arc<FlightShared<V, E>>,
}

impl<V: Send + Sync, E: Send + Sync> Clone for FlightCache<V, E> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<V: Send + Sync, E: Send + Sync> fmt::Debug for FlightCache<V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FlightCache").field("shared", &self.shared).finish()
  }
}

impl<V, E> FlightCache<V, E>
where
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  /// Creates a builder for configuring a new cache.
  pub fn builder() -> FlightCacheBuilder<V, E> {
    FlightCacheBuilder::new()
  }

  /// Starts production unless a value is already cached or a production is
  /// already in flight.
  ///
  /// Never waits for the producer; the call only takes the state lock.
  pub fn preload(&self) {
    let _ = self.shared.acquire(Trigger::Preload);
  }

  /// Requests the value.
  ///
  /// - If a value is cached, the returned subscription is already resolved.
  /// - If a production is in flight, the subscription joins it.
  /// - Otherwise a new production is started and the subscription attaches to it.
  ///
  /// The producer is never invoked more than once per production, however
  /// many callers arrive while it runs.
  pub fn value(&self) -> Subscription<V, E> {
    match self.shared.acquire(Trigger::Value) {
      Acquired::Ready(value) => Subscription::resolved(Ok(value)),
      Acquired::Joined(broadcaster) | Acquired::Started(broadcaster) => Subscription::attached(broadcaster),
    }
  }

  /// Asynchronously requests the value. Equivalent to `self.value().await`.
  pub async fn get(&self) -> Outcome<V, E> {
    self.value().await
  }

  /// Requests the value, blocking the current thread until it is available.
  ///
  /// Do not call this from inside an async runtime that is also responsible
  /// for driving the producer, such as a current-thread tokio runtime running
  /// an async producer; it will never return. Use `get().await` there instead.
  pub fn get_blocking(&self) -> Outcome<V, E> {
    self.value().wait()
  }

  /// Returns the cached value without ever starting a production.
  pub fn peek(&self) -> Option<Arc<V>> {
    match &self.shared.slot.lock().state {
      State::Ready(value) => Some(Arc::clone(value)),
      _ => None,
    }
  }

  /// Returns the error of the last production if it failed and no retry
  /// has been started since.
  pub fn last_error(&self) -> Option<Arc<E>> {
    match &self.shared.slot.lock().state {
      State::Failed(error) => Some(Arc::clone(error)),
      _ => None,
    }
  }

  /// Returns the current state.
  pub fn state(&self) -> StateKind {
    self.shared.slot.lock().state.kind()
  }

  /// Returns `true` once a value is cached.
  pub fn is_ready(&self) -> bool {
    self.state() == StateKind::Ready
  }

  /// Returns the name the cache was built with, if any.
  pub fn name(&self) -> Option<&str> {
    self.shared.name.as_deref()
  }

  /// Returns a snapshot of the cache's metrics.
  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }
}
