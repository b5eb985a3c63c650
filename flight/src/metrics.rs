use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Requests ---
  pub(crate) requests: CachePadded<AtomicU64>,
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) coalesced: CachePadded<AtomicU64>,

  // --- Preloading ---
  pub(crate) preloads: CachePadded<AtomicU64>,
  pub(crate) ignored_preloads: CachePadded<AtomicU64>,

  // --- Production ---
  pub(crate) productions: CachePadded<AtomicU64>,
  pub(crate) successes: CachePadded<AtomicU64>,
  pub(crate) failures: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      requests: CachePadded::new(AtomicU64::new(0)),
      hits: CachePadded::new(AtomicU64::new(0)),
      coalesced: CachePadded::new(AtomicU64::new(0)),
      preloads: CachePadded::new(AtomicU64::new(0)),
      ignored_preloads: CachePadded::new(AtomicU64::new(0)),
      productions: CachePadded::new(AtomicU64::new(0)),
      successes: CachePadded::new(AtomicU64::new(0)),
      failures: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn incr(counter: &CachePadded<AtomicU64>) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let requests = self.requests.load(Ordering::Relaxed);
    let hits = self.hits.load(Ordering::Relaxed);

    MetricsSnapshot {
      requests,
      hits,
      coalesced: self.coalesced.load(Ordering::Relaxed),
      hit_ratio: if requests == 0 {
        0.0
      } else {
        hits as f64 / requests as f64
      },
      preloads: self.preloads.load(Ordering::Relaxed),
      ignored_preloads: self.ignored_preloads.load(Ordering::Relaxed),
      productions: self.productions.load(Ordering::Relaxed),
      successes: self.successes.load(Ordering::Relaxed),
      failures: self.failures.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's metrics.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
  /// The number of calls to `value()`.
  pub requests: u64,
  /// The number of `value()` calls served from the cached value.
  pub hits: u64,
  /// The number of `value()` calls that joined an episode already in flight.
  pub coalesced: u64,
  /// The cache hit ratio (hits / requests).
  pub hit_ratio: f64,
  /// The number of `preload()` calls that started an episode.
  pub preloads: u64,
  /// The number of `preload()` calls that had no effect.
  pub ignored_preloads: u64,
  /// The number of production episodes started, i.e. producer invocations.
  pub productions: u64,
  /// The number of episodes that ended with a value.
  pub successes: u64,
  /// The number of episodes that ended with an error.
  pub failures: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("requests", &self.requests)
      .field("hits", &self.hits)
      .field("coalesced", &self.coalesced)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("preloads", &self.preloads)
      .field("ignored_preloads", &self.ignored_preloads)
      .field("productions", &self.productions)
      .field("successes", &self.successes)
      .field("failures", &self.failures)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
