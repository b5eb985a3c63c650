use fibre_flight::{FlightCache, StateKind};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  mpsc, Arc, Barrier,
};
use std::thread;
use std::time::Duration;

#[derive(Debug, PartialEq, Eq)]
struct ProduceError(String);

#[test]
fn test_sync_producer_basic() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let cache = FlightCache::builder()
    .sync_producer({
      let load_count = load_count.clone();
      move || {
        load_count.fetch_add(1, Ordering::SeqCst);
        Ok::<_, ProduceError>(vec![1, 2, 3])
      }
    })
    .build()
    .unwrap();

  assert_eq!(cache.state(), StateKind::Empty);
  assert_eq!(*cache.get_blocking().unwrap(), vec![1, 2, 3]);
  assert_eq!(*cache.get_blocking().unwrap(), vec![1, 2, 3]);
  assert_eq!(load_count.load(Ordering::SeqCst), 1, "Producer should not be called again");
}

#[test]
fn test_sync_thundering_herd() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let num_threads = 16;

  let cache = FlightCache::builder()
    .sync_producer({
      let load_count = load_count.clone();
      move || {
        // Simulate a slow database call or computation
        thread::sleep(Duration::from_millis(100));
        load_count.fetch_add(1, Ordering::SeqCst);
        Ok::<_, ProduceError>("42".to_string())
      }
    })
    .build()
    .unwrap();

  let barrier = Arc::new(Barrier::new(num_threads));
  let handles: Vec<_> = (0..num_threads)
    .map(|_| {
      let cache = cache.clone();
      let barrier = barrier.clone();
      thread::spawn(move || {
        barrier.wait();
        cache.get_blocking().unwrap()
      })
    })
    .collect();

  let values: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

  assert_eq!(load_count.load(Ordering::SeqCst), 1);
  assert!(values.iter().all(|value| Arc::ptr_eq(value, &values[0])));
  assert_eq!(cache.metrics().coalesced, (num_threads - 1) as u64);
}

#[test]
fn test_sync_retry_after_failure() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let cache = FlightCache::builder()
    .sync_producer({
      let load_count = load_count.clone();
      move || match load_count.fetch_add(1, Ordering::SeqCst) {
        0 => Err(ProduceError("E1".to_string())),
        _ => Ok(7u32),
      }
    })
    .build()
    .unwrap();

  assert_eq!(*cache.get_blocking().unwrap_err(), ProduceError("E1".to_string()));
  assert_eq!(cache.state(), StateKind::Failed);

  assert_eq!(*cache.get_blocking().unwrap(), 7);
  assert_eq!(*cache.get_blocking().unwrap(), 7);
  assert_eq!(load_count.load(Ordering::SeqCst), 2);
}

#[test]
fn test_wait_timeout_leaves_subscription_usable() {
  let (release_tx, release_rx) = mpsc::channel::<()>();
  let release_rx = Arc::new(std::sync::Mutex::new(release_rx));

  let cache = FlightCache::builder()
    .sync_producer(move || {
      release_rx.lock().unwrap().recv().ok();
      Ok::<_, ProduceError>("released")
    })
    .build()
    .unwrap();

  let mut sub = cache.value();
  assert!(sub.wait_timeout(Duration::from_millis(30)).is_none());
  assert!(!sub.is_resolved());
  assert_eq!(cache.state(), StateKind::Producing);

  release_tx.send(()).unwrap();
  let outcome = sub.wait_timeout(Duration::from_secs(5)).expect("production should finish");
  assert_eq!(*outcome.unwrap(), "released");
}

#[test]
fn test_on_complete_callback_receives_outcome() {
  let cache = FlightCache::builder()
    .sync_producer(|| {
      thread::sleep(Duration::from_millis(20));
      Ok::<_, ProduceError>(99u64)
    })
    .build()
    .unwrap();

  let (tx, rx) = mpsc::channel();
  for _ in 0..3 {
    let tx = tx.clone();
    cache.value().on_complete(move |outcome| {
      tx.send(*outcome.unwrap()).unwrap();
    });
  }

  for _ in 0..3 {
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 99);
  }
  assert_eq!(cache.metrics().productions, 1);

  // Once cached, the callback runs right away on the calling thread.
  let tx_ready = tx.clone();
  cache.value().on_complete(move |outcome| {
    tx_ready.send(*outcome.unwrap() + 1).unwrap();
  });
  assert_eq!(rx.try_recv().unwrap(), 100);
}

#[test]
fn test_preload_then_blocking_get_from_another_thread() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let cache = FlightCache::builder()
    .sync_producer({
      let load_count = load_count.clone();
      move || {
        load_count.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        Ok::<_, ProduceError>(String::from("warm"))
      }
    })
    .build()
    .unwrap();

  cache.preload();
  let reader = {
    let cache = cache.clone();
    thread::spawn(move || cache.get_blocking().unwrap())
  };

  assert_eq!(*reader.join().unwrap(), "warm");
  assert_eq!(load_count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_panicking_producer_leaves_cache_producing() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let cache = FlightCache::builder()
    .sync_producer({
      let load_count = load_count.clone();
      move || -> Result<u32, ProduceError> {
        load_count.fetch_add(1, Ordering::SeqCst);
        panic!("producer blew up");
      }
    })
    .build()
    .unwrap();

  let mut first = cache.value();
  assert!(first.wait_timeout(Duration::from_millis(200)).is_none());
  assert_eq!(cache.state(), StateKind::Producing);

  // A later request joins the abandoned production instead of retrying.
  let mut retry = cache.value();
  assert_eq!(retry.episode(), first.episode());
  assert!(retry.wait_timeout(Duration::from_millis(100)).is_none());
  assert_eq!(load_count.load(Ordering::SeqCst), 1);
}
