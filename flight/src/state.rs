use crate::broadcast::Broadcaster;

use std::fmt;
use std::sync::Arc;

/// The slot of a single-flight cache.
///
/// Transitions: `Empty | Failed -> Producing -> Ready | Failed`. `Ready` is
/// never left.
pub(crate) enum State<V, E> {
  Empty,
  Failed(Arc<E>),
  Ready(Arc<V>),
  Producing(Arc<Broadcaster<V, E>>),
}

impl<V, E> State<V, E> {
  pub(crate) fn kind(&self) -> StateKind {
    match self {
      State::Empty => StateKind::Empty,
      State::Failed(_) => StateKind::Failed,
      State::Ready(_) => StateKind::Ready,
      State::Producing(_) => StateKind::Producing,
    }
  }
}

/// A payload-free view of the cache's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StateKind {
  /// Nothing has been produced yet.
  Empty,
  /// The last episode failed. The next `preload()` or `value()` retries.
  Failed,
  /// A value is cached and served to every caller.
  Ready,
  /// An episode is in flight.
  Producing,
}

impl fmt::Display for StateKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StateKind::Empty => write!(f, "empty"),
      StateKind::Failed => write!(f, "failed"),
      StateKind::Ready => write!(f, "ready"),
      StateKind::Producing => write!(f, "producing"),
    }
  }
}
