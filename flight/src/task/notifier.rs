use crate::listener::{FlightEvent, FlightListener};

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use fibre::mpsc;

const NOTIFICATION_CHANNEL_CAPACITY: usize = 128;

/// The background task responsible for calling the user-provided listener.
pub(crate) struct Notifier<V: Send + Sync, E: Send + Sync> {
  _handle: JoinHandle<()>,
  sender: mpsc::BoundedSender<FlightEvent<V, E>>,
}

impl<V, E> Notifier<V, E>
where
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  /// Spawns a new notifier thread.
  pub(crate) fn spawn(listener: Arc<dyn FlightListener<V, E>>) -> Self {
    let (tx, rx): (
      mpsc::BoundedSender<FlightEvent<V, E>>,
      mpsc::BoundedReceiver<FlightEvent<V, E>>,
    ) = mpsc::bounded(NOTIFICATION_CHANNEL_CAPACITY);

    let handle = thread::spawn(move || {
      // Ends once the sender is dropped together with the cache.
      while let Ok(event) = rx.recv() {
        listener.on_event(event);
      }
    });

    Self {
      _handle: handle,
      sender: tx,
    }
  }

  /// Queues an event without blocking. The event is dropped if the queue is full.
  ///
  /// Called with the state lock held, so this must never wait on the listener.
  pub(crate) fn notify(&self, event: FlightEvent<V, E>) {
    let _ = self.sender.try_send(event);
  }
}
