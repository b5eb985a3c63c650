use fibre_flight::{FlightCache, StateKind};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tokio::time::{sleep, Duration};

#[derive(Debug)]
struct ProduceError;

fn build_cache(load_count: Arc<AtomicUsize>, fail_first: bool) -> FlightCache<u64, ProduceError> {
  FlightCache::builder()
    .producer(move || {
      let attempt = load_count.fetch_add(1, Ordering::SeqCst);
      async move {
        sleep(Duration::from_millis(20)).await;
        if fail_first && attempt == 0 {
          Err(ProduceError)
        } else {
          Ok(attempt as u64)
        }
      }
    })
    .build()
    .unwrap()
}

#[tokio::test]
async fn test_preload_starts_production_that_value_joins() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let cache = build_cache(load_count.clone(), false);

  cache.preload();
  assert_eq!(cache.state(), StateKind::Producing);
  assert_eq!(load_count.load(Ordering::SeqCst), 1);

  let sub = cache.value();
  assert_eq!(sub.episode(), Some(1));
  assert_eq!(*sub.await.unwrap(), 0);

  let metrics = cache.metrics();
  assert_eq!(metrics.preloads, 1);
  assert_eq!(metrics.coalesced, 1);
  assert_eq!(metrics.productions, 1);
}

#[tokio::test]
async fn test_preload_is_a_no_op_while_producing() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let cache = build_cache(load_count.clone(), false);

  cache.preload();
  cache.preload();
  cache.preload();
  assert_eq!(load_count.load(Ordering::SeqCst), 1);
  assert_eq!(cache.metrics().ignored_preloads, 2);
}

#[tokio::test]
async fn test_preload_is_cheap_once_ready() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let cache = build_cache(load_count.clone(), false);

  assert_eq!(*cache.get().await.unwrap(), 0);
  for _ in 0..5 {
    cache.preload();
  }
  sleep(Duration::from_millis(40)).await;

  assert_eq!(load_count.load(Ordering::SeqCst), 1, "Preload must not invoke the producer when ready");
  assert_eq!(cache.state(), StateKind::Ready);
  assert_eq!(cache.metrics().ignored_preloads, 5);
}

#[tokio::test]
async fn test_preload_retries_after_failure() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let cache = build_cache(load_count.clone(), true);

  assert!(cache.get().await.is_err());
  assert_eq!(cache.state(), StateKind::Failed);

  cache.preload();
  assert_eq!(cache.state(), StateKind::Producing);
  assert_eq!(*cache.get().await.unwrap(), 1);
  assert_eq!(load_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_preload_result_is_cached_without_subscribers() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let cache = build_cache(load_count.clone(), false);

  cache.preload();
  sleep(Duration::from_millis(60)).await;

  assert!(cache.is_ready());
  assert_eq!(cache.peek().as_deref(), Some(&0));
  let sub = cache.value();
  assert!(sub.is_resolved());
  assert_eq!(load_count.load(Ordering::SeqCst), 1);
}
