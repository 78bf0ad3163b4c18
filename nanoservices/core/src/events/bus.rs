use tokio::sync::mpsc;

use crate::events::trigger::TriggerEvent;

/// Channel-based event bus delivering trigger events to the engine loop.
pub struct EventBus {
    sender: mpsc::Sender<TriggerEvent>,
    receiver: mpsc::Receiver<TriggerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self { sender, receiver }
    }

    /// Get a sender handle that can be cloned and given to trigger producers.
    pub fn sender(&self) -> mpsc::Sender<TriggerEvent> {
        self.sender.clone()
    }

    /// Receive the next trigger event. Returns None when all senders are dropped.
    pub async fn recv(&mut self) -> Option<TriggerEvent> {
        self.receiver.recv().await
    }

    /// Split into sender and receiver (consumes self).
    pub fn split(self) -> (mpsc::Sender<TriggerEvent>, mpsc::Receiver<TriggerEvent>) {
        (self.sender, self.receiver)
    }
}
