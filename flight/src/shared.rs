use crate::broadcast::{Broadcaster, Outcome};
use crate::listener::{FlightEvent, Trigger};
use crate::metrics::Metrics;
use crate::producer::Producer;
use crate::state::State;
use crate::task::notifier::Notifier;

use std::fmt;
use std::sync::{Arc, Weak};
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// What a caller walks away with once the state lock has been released.
pub(crate) enum Acquired<V, E> {
  /// The value was already cached.
  Ready(Arc<V>),
  /// An episode was already in flight.
  Joined(Arc<Broadcaster<V, E>>),
  /// This caller started a new episode.
  Started(Arc<Broadcaster<V, E>>),
}

/// The episode counter lives next to the state so both change under one lock.
pub(crate) struct Slot<V, E> {
  pub(crate) state: State<V, E>,
  episodes: u64,
}

/// The internal, thread-safe core of a `FlightCache`.
pub(crate) struct FlightShared<V: Send + Sync, E: Send + Sync> {
  pub(crate) slot: Mutex<Slot<V, E>>,
  pub(crate) producer: Producer<V, E>,
  pub(crate) metrics: Metrics,
  pub(crate) notifier: Option<Notifier<V, E>>,
  pub(crate) name: Option<String>,
}

impl<V: Send + Sync, E: Send + Sync> fmt::Debug for FlightShared<V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FlightShared")
      .field("name", &self.name)
      .field("state", &self.slot.lock().state.kind())
      .field("async_producer", &self.producer.is_async())
      .field("has_listener", &self.notifier.is_some())
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<V, E> FlightShared<V, E>
where
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  pub(crate) fn new(producer: Producer<V, E>, notifier: Option<Notifier<V, E>>, name: Option<String>) -> Self {
    Self {
      slot: Mutex::new(Slot {
        state: State::Empty,
        episodes: 0,
      }),
      producer,
      metrics: Metrics::new(),
      notifier,
      name,
    }
  }

  fn label(&self) -> &str {
    self.name.as_deref().unwrap_or("anonymous")
  }

  fn notify(&self, event: FlightEvent<V, E>) {
    if let Some(notifier) = &self.notifier {
      notifier.notify(event);
    }
  }

  /// Inspects the state and, if nothing is cached or in flight, opens a new
  /// episode. The producer is invoked only after the lock is released.
  ///
  /// Listener events are queued while the lock is held so that they reach
  /// the listener in the order the state changed.
  pub(crate) fn acquire(self: &Arc<Self>, trigger: Trigger) -> Acquired<V, E> {
    let acquired = {
      let mut guard = self.slot.lock();
      let slot = &mut *guard;
      match &slot.state {
        State::Ready(value) => Acquired::Ready(Arc::clone(value)),
        State::Producing(broadcaster) => {
          if trigger == Trigger::Value {
            self.notify(FlightEvent::Joined {
              episode: broadcaster.episode(),
            });
          }
          Acquired::Joined(Arc::clone(broadcaster))
        }
        State::Empty | State::Failed(_) => {
          slot.episodes += 1;
          let episode = slot.episodes;
          let broadcaster = Arc::new(Broadcaster::new(episode));
          slot.state = State::Producing(Arc::clone(&broadcaster));
          self.notify(FlightEvent::Started { episode, trigger });
          Acquired::Started(broadcaster)
        }
      }
    };

    match (trigger, &acquired) {
      (Trigger::Value, Acquired::Ready(_)) => {
        Metrics::incr(&self.metrics.requests);
        Metrics::incr(&self.metrics.hits);
        trace!(cache = self.label(), "served cached value");
      }
      (Trigger::Value, Acquired::Joined(broadcaster)) => {
        Metrics::incr(&self.metrics.requests);
        Metrics::incr(&self.metrics.coalesced);
        trace!(cache = self.label(), episode = broadcaster.episode(), "joined production in flight");
      }
      (Trigger::Value, Acquired::Started(_)) => Metrics::incr(&self.metrics.requests),
      (Trigger::Preload, Acquired::Started(_)) => Metrics::incr(&self.metrics.preloads),
      (Trigger::Preload, _) => Metrics::incr(&self.metrics.ignored_preloads),
    }

    if let Acquired::Started(broadcaster) = &acquired {
      self.start_production(Arc::clone(broadcaster), trigger);
    }
    acquired
  }

  /// Invokes the producer once for the episode behind `broadcaster`.
  ///
  /// The running production only holds a weak reference to the cache, so
  /// dropping the last `FlightCache` handle does not wait for it.
  fn start_production(self: &Arc<Self>, broadcaster: Arc<Broadcaster<V, E>>, trigger: Trigger) {
    let episode = broadcaster.episode();
    Metrics::incr(&self.metrics.productions);
    debug!(cache = self.label(), episode, %trigger, "starting production");

    let cache = Arc::downgrade(self);
    match &self.producer {
      Producer::Sync(produce) => {
        let produce = Arc::clone(produce);
        thread::spawn(move || {
          let result = produce();
          Self::complete(&cache, &broadcaster, result);
        });
      }
      Producer::Async { produce, spawner } => {
        let production = produce();
        spawner.spawn(Box::pin(async move {
          let result = production.await;
          Self::complete(&cache, &broadcaster, result);
        }));
      }
    }
  }

  /// Completion handling for one episode: settle the state, then deliver.
  fn complete(cache: &Weak<Self>, broadcaster: &Broadcaster<V, E>, result: Result<V, E>) {
    let outcome: Outcome<V, E> = result.map(Arc::new).map_err(Arc::new);

    match cache.upgrade() {
      Some(shared) => shared.settle(broadcaster, &outcome),
      None => debug!(
        episode = broadcaster.episode(),
        "cache dropped during production, delivering to remaining subscribers"
      ),
    }

    broadcaster.complete(outcome);
  }

  fn settle(&self, broadcaster: &Broadcaster<V, E>, outcome: &Outcome<V, E>) {
    let episode = broadcaster.episode();
    let retired = {
      let mut guard = self.slot.lock();
      let slot = &mut *guard;
      match &slot.state {
        State::Producing(current) if std::ptr::eq(Arc::as_ptr(current), broadcaster) => {
          let (state, event) = match outcome {
            Ok(value) => (
              State::Ready(Arc::clone(value)),
              FlightEvent::Produced {
                episode,
                value: Arc::clone(value),
              },
            ),
            Err(error) => (
              State::Failed(Arc::clone(error)),
              FlightEvent::Failed {
                episode,
                error: Arc::clone(error),
              },
            ),
          };
          slot.state = state;
          self.notify(event);
          true
        }
        _ => false,
      }
    };

    if !retired {
      warn!(cache = self.label(), episode, "completion for a broadcaster that is no longer live");
      return;
    }

    if outcome.is_ok() {
      Metrics::incr(&self.metrics.successes);
      debug!(cache = self.label(), episode, "production succeeded");
    } else {
      Metrics::incr(&self.metrics.failures);
      debug!(cache = self.label(), episode, "production failed");
    }
  }
}
