use generational_arena::{Arena, Index};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

/// The terminal outcome of one production episode.
///
/// Values and errors are handed out behind an `Arc`, so every subscriber of an
/// episode observes the very same instance and neither `V` nor `E` needs to be
/// `Clone`.
pub type Outcome<V, E> = Result<Arc<V>, Arc<E>>;

pub(crate) type Callback<V, E> = Box<dyn FnOnce(Outcome<V, E>) + Send>;

/// Represents a subscriber parked on a `Broadcaster`.
pub(crate) enum Waiter<V, E> {
  Sync(Thread),
  Async(Waker),
  Callback(Callback<V, E>),
}

enum Slot<V, E> {
  Pending,
  Done(Outcome<V, E>),
}

/// The mutex-protected core of a `Broadcaster`.
struct Inner<V, E> {
  slot: Slot<V, E>,
  waiters: Arena<Waiter<V, E>>,
}

/// The shared fan-out target of a single production episode.
///
/// It can be awaited by any number of sync threads, async tasks and callbacks
/// simultaneously. Each registered waiter is notified exactly once, when the
/// episode's outcome is delivered through `complete`. Waiters are kept in a
/// generational arena so a subscription that loses interest can remove its own
/// entry without disturbing anyone else.
pub(crate) struct Broadcaster<V, E> {
  episode: u64,
  inner: Mutex<Inner<V, E>>,
}

impl<V, E> Broadcaster<V, E> {
  /// Creates a new broadcaster in the pending state.
  pub(crate) fn new(episode: u64) -> Self {
    Self {
      episode,
      inner: Mutex::new(Inner {
        slot: Slot::Pending,
        waiters: Arena::new(),
      }),
    }
  }

  pub(crate) fn episode(&self) -> u64 {
    self.episode
  }

  pub(crate) fn outcome(&self) -> Option<Outcome<V, E>> {
    match &self.inner.lock().slot {
      Slot::Pending => None,
      Slot::Done(outcome) => Some(outcome.clone()),
    }
  }

  /// The number of subscribers still waiting for the outcome.
  pub(crate) fn waiter_count(&self) -> usize {
    self.inner.lock().waiters.len()
  }

  /// Delivers the outcome to every waiter and retires the waiter list.
  ///
  /// Returns `false` if the broadcaster had already completed, in which case
  /// the earlier outcome stands and nobody is notified again.
  pub(crate) fn complete(&self, outcome: Outcome<V, E>) -> bool {
    let waiters = {
      let mut inner = self.inner.lock();
      if let Slot::Done(_) = inner.slot {
        return false;
      }
      inner.slot = Slot::Done(outcome.clone());
      std::mem::take(&mut inner.waiters)
    };

    // Notify outside the lock: callbacks are user code and may subscribe again.
    for waiter in waiters {
      match waiter {
        Waiter::Sync(thread) => thread.unpark(),
        Waiter::Async(waker) => waker.wake(),
        Waiter::Callback(callback) => callback(outcome.clone()),
      }
    }
    true
  }

  /// Registers (or refreshes) an async waiter for the subscription owning `index`.
  fn poll_register(&self, index: &mut Option<Index>, waker: &Waker) -> Poll<Outcome<V, E>> {
    let mut guard = self.inner.lock();
    let inner = &mut *guard;
    if let Slot::Done(outcome) = &inner.slot {
      *index = None;
      return Poll::Ready(outcome.clone());
    }

    match (*index).and_then(|i| inner.waiters.get_mut(i)) {
      Some(Waiter::Async(existing)) if existing.will_wake(waker) => {}
      Some(existing) => *existing = Waiter::Async(waker.clone()),
      None => *index = Some(inner.waiters.insert(Waiter::Async(waker.clone()))),
    }
    Poll::Pending
  }

  /// Registers the current thread as the waiter for the subscription owning `index`.
  fn register_thread(&self, index: &mut Option<Index>) -> Option<Outcome<V, E>> {
    let mut guard = self.inner.lock();
    let inner = &mut *guard;
    if let Slot::Done(outcome) = &inner.slot {
      *index = None;
      return Some(outcome.clone());
    }

    let waiter = Waiter::Sync(thread::current());
    match (*index).and_then(|i| inner.waiters.get_mut(i)) {
      Some(existing) => *existing = waiter,
      None => *index = Some(inner.waiters.insert(waiter)),
    }
    None
  }

  fn register_callback(&self, callback: Callback<V, E>) {
    let outcome = {
      let mut guard = self.inner.lock();
      let inner = &mut *guard;
      match &inner.slot {
        Slot::Done(outcome) => outcome.clone(),
        Slot::Pending => {
          inner.waiters.insert(Waiter::Callback(callback));
          return;
        }
      }
    };
    callback(outcome);
  }

  fn deregister(&self, index: Index) {
    let mut inner = self.inner.lock();
    if let Slot::Pending = inner.slot {
      inner.waiters.remove(index);
    }
  }
}

impl<V, E> fmt::Debug for Broadcaster<V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.inner.lock();
    f.debug_struct("Broadcaster")
      .field("episode", &self.episode)
      .field("done", &matches!(inner.slot, Slot::Done(_)))
      .field("waiters", &inner.waiters.len())
      .finish()
  }
}

enum Source<V, E> {
  Resolved(Outcome<V, E>),
  Pending {
    broadcaster: Arc<Broadcaster<V, E>>,
    waiter: Option<Index>,
  },
}

/// A handle to the outcome of a `FlightCache::value` call.
///
/// A subscription can be consumed in whichever way suits the caller:
/// - `.await` it from async code,
/// - block on it with [`wait`](Self::wait) or [`wait_timeout`](Self::wait_timeout),
/// - hand it a callback with [`on_complete`](Self::on_complete),
/// - or poll it with [`try_outcome`](Self::try_outcome).
///
/// Dropping a subscription only withdraws this subscriber; the production it
/// is attached to keeps running and every other subscriber still gets the
/// outcome.
#[must_use = "a subscription does nothing unless it is awaited, waited on or given a callback"]
pub struct Subscription<V, E> {
  source: Source<V, E>,
}

impl<V, E> Subscription<V, E> {
  /// An already-resolved subscription, used when the cache is `Ready`.
  pub(crate) fn resolved(outcome: Outcome<V, E>) -> Self {
    Self {
      source: Source::Resolved(outcome),
    }
  }

  /// A subscription attached to an in-flight episode.
  pub(crate) fn attached(broadcaster: Arc<Broadcaster<V, E>>) -> Self {
    Self {
      source: Source::Pending {
        broadcaster,
        waiter: None,
      },
    }
  }

  /// Returns the outcome if it is already available, without blocking.
  pub fn try_outcome(&self) -> Option<Outcome<V, E>> {
    match &self.source {
      Source::Resolved(outcome) => Some(outcome.clone()),
      Source::Pending { broadcaster, .. } => broadcaster.outcome(),
    }
  }

  /// Returns `true` once the outcome is available.
  pub fn is_resolved(&self) -> bool {
    self.try_outcome().is_some()
  }

  /// The production episode this subscription is attached to.
  ///
  /// `None` for subscriptions served straight from a cached value.
  pub fn episode(&self) -> Option<u64> {
    match &self.source {
      Source::Resolved(_) => None,
      Source::Pending { broadcaster, .. } => Some(broadcaster.episode()),
    }
  }

  /// Blocks the current thread until the outcome is available.
  ///
  /// Do not call this from inside an async runtime that is also responsible
  /// for driving the producer; use `.await` there instead.
  pub fn wait(mut self) -> Outcome<V, E> {
    loop {
      if let Some(outcome) = self.wait_until(None) {
        return outcome;
      }
    }
  }

  /// Blocks the current thread until the outcome is available or `timeout`
  /// elapses. Returns `None` on timeout; the subscription stays usable.
  pub fn wait_timeout(&mut self, timeout: Duration) -> Option<Outcome<V, E>> {
    self.wait_until(Some(Instant::now() + timeout))
  }

  fn wait_until(&mut self, deadline: Option<Instant>) -> Option<Outcome<V, E>> {
    let (broadcaster, waiter) = match &mut self.source {
      Source::Resolved(outcome) => return Some(outcome.clone()),
      Source::Pending {
        broadcaster,
        waiter,
      } => (broadcaster, waiter),
    };

    loop {
      // Register before parking so an unpark issued in between is not lost.
      if let Some(outcome) = broadcaster.register_thread(waiter) {
        return Some(outcome);
      }
      match deadline {
        None => thread::park(),
        Some(deadline) => {
          let now = Instant::now();
          if now >= deadline {
            return None;
          }
          thread::park_timeout(deadline - now);
        }
      }
    }
  }

  /// Consumes the subscription, invoking `callback` once with the outcome.
  ///
  /// If the outcome is already known the callback runs immediately on the
  /// calling thread; otherwise it runs on whichever context completes the
  /// production.
  pub fn on_complete<F>(mut self, callback: F)
  where
    F: FnOnce(Outcome<V, E>) + Send + 'static,
  {
    match &mut self.source {
      Source::Resolved(outcome) => callback(outcome.clone()),
      Source::Pending {
        broadcaster,
        waiter,
      } => {
        if let Some(index) = waiter.take() {
          broadcaster.deregister(index);
        }
        broadcaster.register_callback(Box::new(callback));
      }
    }
  }
}

impl<V, E> Future for Subscription<V, E> {
  type Output = Outcome<V, E>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    match &mut self.get_mut().source {
      Source::Resolved(outcome) => Poll::Ready(outcome.clone()),
      Source::Pending {
        broadcaster,
        waiter,
      } => broadcaster.poll_register(waiter, cx.waker()),
    }
  }
}

impl<V, E> Clone for Subscription<V, E> {
  /// Creates an independent subscription to the same outcome.
  fn clone(&self) -> Self {
    match &self.source {
      Source::Resolved(outcome) => Self::resolved(outcome.clone()),
      Source::Pending { broadcaster, .. } => Self::attached(Arc::clone(broadcaster)),
    }
  }
}

impl<V, E> Drop for Subscription<V, E> {
  fn drop(&mut self) {
    if let Source::Pending {
      broadcaster,
      waiter: Some(index),
    } = &self.source
    {
      broadcaster.deregister(*index);
    }
  }
}

impl<V, E> fmt::Debug for Subscription<V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscription")
      .field("episode", &self.episode())
      .field("resolved", &self.is_resolved())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures_util::FutureExt;
  use std::sync::atomic::{AtomicUsize, Ordering};

  type TestBroadcaster = Broadcaster<String, &'static str>;

  #[test]
  fn test_all_subscribers_observe_the_same_outcome() {
    let broadcaster = Arc::new(TestBroadcaster::new(1));
    let subs: Vec<_> = (0..3)
      .map(|_| Subscription::attached(broadcaster.clone()))
      .collect();

    let value = Arc::new("42".to_string());
    assert!(broadcaster.complete(Ok(value.clone())));

    for sub in subs {
      let received = futures_executor::block_on(sub).unwrap();
      assert!(Arc::ptr_eq(&received, &value));
    }
  }

  #[test]
  fn test_second_completion_is_ignored() {
    let broadcaster = TestBroadcaster::new(1);
    assert!(broadcaster.complete(Err(Arc::new("E1"))));
    assert!(!broadcaster.complete(Ok(Arc::new("7".to_string()))));
    assert_eq!(*broadcaster.outcome().unwrap().unwrap_err(), "E1");
  }

  #[test]
  fn test_dropping_a_pending_subscription_removes_its_waiter() {
    let broadcaster = Arc::new(TestBroadcaster::new(1));
    let mut first = Subscription::attached(broadcaster.clone());
    let mut second = Subscription::attached(broadcaster.clone());

    assert!((&mut first).now_or_never().is_none());
    assert!((&mut second).now_or_never().is_none());
    // Polling again must refresh, not duplicate, the waiter.
    assert!((&mut first).now_or_never().is_none());
    assert_eq!(broadcaster.waiter_count(), 2);

    drop(first);
    assert_eq!(broadcaster.waiter_count(), 1);

    broadcaster.complete(Ok(Arc::new("v".to_string())));
    assert_eq!(*second.try_outcome().unwrap().unwrap(), "v");
  }

  #[test]
  fn test_callbacks_fire_once_before_and_after_completion() {
    let broadcaster = Arc::new(TestBroadcaster::new(1));
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    Subscription::attached(broadcaster.clone()).on_complete(move |outcome| {
      assert_eq!(*outcome.unwrap(), "v");
      counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    broadcaster.complete(Ok(Arc::new("v".to_string())));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let counter = calls.clone();
    Subscription::attached(broadcaster.clone()).on_complete(move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(broadcaster.waiter_count(), 0);
  }

  #[test]
  fn test_wait_blocks_until_completed_from_another_thread() {
    let broadcaster = Arc::new(TestBroadcaster::new(1));
    let mut sub = Subscription::attached(broadcaster.clone());

    assert!(sub.wait_timeout(Duration::from_millis(20)).is_none());

    let completer = {
      let broadcaster = broadcaster.clone();
      thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        broadcaster.complete(Ok(Arc::new("late".to_string())));
      })
    };

    assert_eq!(*sub.wait().unwrap(), "late");
    completer.join().unwrap();
  }

  #[test]
  fn test_resolved_subscription_has_no_episode() {
    let sub: Subscription<u32, ()> = Subscription::resolved(Ok(Arc::new(7)));
    assert!(sub.is_resolved());
    assert_eq!(sub.episode(), None);
    assert_eq!(*sub.clone().wait().unwrap(), 7);
  }
}
