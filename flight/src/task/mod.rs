//! Background tasks owned by a cache instance.

pub(crate) mod notifier;
