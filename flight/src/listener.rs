use std::fmt;
use std::sync::Arc;

/// Describes what started a production episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
  /// The episode was started by `FlightCache::preload`.
  Preload,
  /// The episode was started by `FlightCache::value`.
  Value,
}

impl fmt::Display for Trigger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Trigger::Preload => write!(f, "preload"),
      Trigger::Value => write!(f, "value"),
    }
  }
}

/// A lifecycle event emitted by a `FlightCache`.
pub enum FlightEvent<V, E> {
  /// A new episode began and the producer is being invoked.
  Started { episode: u64, trigger: Trigger },
  /// A `value()` call attached to the episode already in flight.
  Joined { episode: u64 },
  /// The episode produced a value; the cache is now `Ready`.
  Produced { episode: u64, value: Arc<V> },
  /// The episode failed; the cache is now `Failed`.
  Failed { episode: u64, error: Arc<E> },
}

impl<V, E> FlightEvent<V, E> {
  /// The episode the event belongs to.
  pub fn episode(&self) -> u64 {
    match self {
      FlightEvent::Started { episode, .. }
      | FlightEvent::Joined { episode }
      | FlightEvent::Produced { episode, .. }
      | FlightEvent::Failed { episode, .. } => *episode,
    }
  }
}

impl<V, E> fmt::Debug for FlightEvent<V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FlightEvent::Started { episode, trigger } => f
        .debug_struct("Started")
        .field("episode", episode)
        .field("trigger", trigger)
        .finish(),
      FlightEvent::Joined { episode } => f.debug_struct("Joined").field("episode", episode).finish(),
      FlightEvent::Produced { episode, .. } => f
        .debug_struct("Produced")
        .field("episode", episode)
        .finish_non_exhaustive(),
      FlightEvent::Failed { episode, .. } => f
        .debug_struct("Failed")
        .field("episode", episode)
        .finish_non_exhaustive(),
    }
  }
}

/// A listener that can be registered with the cache to observe its lifecycle.
///
/// `on_event` is called on a dedicated background thread, so a slow listener
/// never blocks callers of the cache. Events are dropped rather than queued
/// without bound if the listener falls far behind.
///
/// Events that are delivered arrive in the order the cache changed state:
/// `Started(n)` precedes every `Joined(n)`, which in turn precede the
/// `Produced(n)` or `Failed(n)` that ends the episode.
pub trait FlightListener<V, E>: Send + Sync {
  fn on_event(&self, event: FlightEvent<V, E>);
}
