use tokio::sync::mpsc;

/// Explicit observer list: publishers push state-changed events, any consumer
/// (rendering, logging, tests) subscribes for its own receiver.
#[derive(Debug)]
pub struct Notifier<E> {
  subscribers: Vec<mpsc::UnboundedSender<E>>,
}

impl<E> Default for Notifier<E> {
  fn default() -> Self {
    Self {
      subscribers: Vec::new(),
    }
  }
}

impl<E: Clone> Notifier<E> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<E> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.subscribers.push(tx);
    rx
  }

  /// Deliver an event to every live subscriber, dropping closed ones
  pub fn publish(&mut self, event: E) {
    self
      .subscribers
      .retain(|tx| tx.send(event.clone()).is_ok());
  }

  #[cfg(test)]
  pub fn subscriber_count(&self) -> usize {
    self.subscribers.len()
  }
}
