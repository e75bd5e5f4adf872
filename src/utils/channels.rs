//! Ordered fan-out of controller signals to their subscribers
//!
//! Each device controller owns one [`SignalBus`]. Subscribers receive every
//! signal in emission order on their own unbounded channel; a subscriber is
//! pruned once its receiver is dropped.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

pub struct SignalBus<T> {
    subscribers: Arc<Mutex<Vec<UnboundedSender<T>>>>,
}

impl<T> Clone for SignalBus<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T: Clone> SignalBus<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a new subscriber at the end of the delivery order
    pub fn subscribe(&self) -> UnboundedReceiver<T> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver a signal to every live subscriber, in subscription order
    pub fn emit(&self, signal: T) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(signal.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<T: Clone> Default for SignalBus<T> {
    fn default() -> Self {
        Self::new()
    }
}
