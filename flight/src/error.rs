use thiserror::Error;

/// Errors that can occur when building a `FlightCache`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// Neither `producer()` nor `sync_producer()` was called on the builder.
  #[error("a flight cache requires a producer")]
  MissingProducer,
  /// An async `producer` was provided, but no `TaskSpawner` was configured
  /// and no tokio runtime was available to fall back on.
  #[error("an async producer requires a task spawner or a running tokio runtime")]
  SpawnerRequired,
}
