//! A single-flight, memoizing value cache for sync and async producers.
//!
//! A [`FlightCache`] owns one slot and one producer. The first caller to ask
//! for the value starts the producer; everyone who asks while it runs shares
//! that same production; once it succeeds the value is served to all future
//! callers without running the producer again.
//!
//! # Features
//! - **Single Flight**: At most one producer invocation is outstanding at any time.
//! - **Sync & Async**: Producers can be plain closures (run on their own thread) or
//!   futures (driven by a pluggable [`TaskSpawner`]); results can be awaited, waited
//!   on with a blocking call, or delivered to a callback.
//! - **Caller-Driven Retry**: A failure is delivered verbatim to every subscriber of
//!   the failed attempt; the next request starts a fresh one.
//! - **Non-Clone Support**: Values and errors are shared as `Arc<V>` / `Arc<E>`.
//! - **Observability**: Lock-free metrics, `tracing` records and an optional
//!   [`FlightListener`] event sink.
//!
//! ```
//! use fibre_flight::FlightCache;
//!
//! let cache = FlightCache::builder()
//!   .sync_producer(|| Ok::<_, std::io::Error>("42".to_string()))
//!   .build()
//!   .unwrap();
//!
//! assert_eq!(*cache.get_blocking().unwrap(), "42");
//! assert!(cache.is_ready());
//! ```

// Public modules that form the API
pub mod broadcast;
pub mod builder;
pub mod error;
pub mod handles;
pub mod listener;
pub mod metrics;
pub mod runtime;
pub mod state;

// Internal, crate-only modules
mod producer;
mod shared;
mod task;

// Re-export the primary user-facing types for convenience
pub use broadcast::{Outcome, Subscription};
pub use builder::FlightCacheBuilder;
pub use error::BuildError;
pub use handles::FlightCache;
pub use listener::{FlightEvent, FlightListener, Trigger};
pub use metrics::MetricsSnapshot;
#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;
pub use runtime::TaskSpawner;
pub use state::StateKind;
