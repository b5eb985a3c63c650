use fibre_flight::{FlightCache, FlightEvent, FlightListener, StateKind};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::thread;
use std::time::Duration;

#[derive(Debug)]
struct Unavailable(u32);

struct PrintingListener;

impl FlightListener<String, Unavailable> for PrintingListener {
  fn on_event(&self, event: FlightEvent<String, Unavailable>) {
    match event {
      FlightEvent::Failed { episode, error } => {
        println!("[listener] episode {} failed: {:?}", episode, error)
      }
      other => println!("[listener] {:?}", other),
    }
  }
}

fn main() {
  let attempts = Arc::new(AtomicUsize::new(0));

  // A flaky producer that fails twice before succeeding.
  let cache = FlightCache::builder()
    .name("flaky")
    .listener(PrintingListener)
    .sync_producer({
      let attempts = attempts.clone();
      move || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) as u32;
        thread::sleep(Duration::from_millis(50));
        if attempt < 2 {
          Err(Unavailable(attempt))
        } else {
          Ok(format!("ok after {} failures", attempt))
        }
      }
    })
    .build()
    .expect("Failed to build flight cache");

  // The cache never retries by itself; the caller decides when to try again.
  loop {
    match cache.get_blocking() {
      Ok(value) => {
        println!("Got: {}", value);
        break;
      }
      Err(error) => {
        assert_eq!(cache.state(), StateKind::Failed);
        println!("Attempt failed with {:?}, retrying...", error);
      }
    }
  }

  assert_eq!(attempts.load(Ordering::SeqCst), 3);
  assert_eq!(*cache.get_blocking().unwrap(), "ok after 2 failures");
  assert_eq!(attempts.load(Ordering::SeqCst), 3);

  // Give the listener thread a moment to flush.
  thread::sleep(Duration::from_millis(50));
  println!("\nCache metrics: {:#?}", cache.metrics());
}
