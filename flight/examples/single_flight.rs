use fibre_flight::FlightCache;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tokio::time::{sleep, Duration};

#[derive(Debug)]
struct ServiceError(String);

// A simulated slow remote service.
async fn fetch_settings(call_count: Arc<AtomicUsize>) -> Result<String, ServiceError> {
  println!("--- Service: Received request. Simulating slow call...");
  call_count.fetch_add(1, Ordering::SeqCst);
  sleep(Duration::from_millis(500)).await;
  println!("--- Service: Responding.");
  Ok("theme=dark;lang=en".to_string())
}

#[tokio::main]
async fn main() {
  let call_count = Arc::new(AtomicUsize::new(0));

  let cache = FlightCache::builder()
    .name("settings")
    .producer({
      let counter = call_count.clone();
      move || fetch_settings(counter.clone())
    })
    .build()
    .expect("Failed to build flight cache");

  println!("--- Single Flight Demonstration ---");
  println!("Spawning 10 tasks to request the settings at once.\n");

  let mut tasks = Vec::new();
  for i in 0..10 {
    let cache_clone = cache.clone();
    tasks.push(tokio::spawn(async move {
      println!("[Task {}] Requesting settings...", i);
      let value = cache_clone.get().await.expect("service call failed");
      println!("[Task {}] Received: {}", i, value);
    }));
  }

  for task in tasks {
    task.await.unwrap();
  }

  println!("\n--- Verification ---");
  println!(
    "Service was called {} time(s).",
    call_count.load(Ordering::SeqCst)
  );
  assert_eq!(call_count.load(Ordering::SeqCst), 1);

  println!("\n--- Second Request ---");
  let value = cache.get().await.expect("cached value");
  println!("Received cached value: {}", value);
  assert_eq!(call_count.load(Ordering::SeqCst), 1);

  println!("\nCache metrics: {:#?}", cache.metrics());
}
