//! Broadcast-channel event publisher.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::entities::CloneEvent;
use crate::domain::repositories::EventPublisher;

/// Publishes clone events to every current subscriber.
///
/// Backed by a bounded `tokio::sync::broadcast` channel: publishing never
/// blocks, events published with no subscriber are dropped, and a subscriber
/// that falls more than `capacity` events behind skips the oldest ones.
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<CloneEvent>,
}

impl BroadcastEventPublisher {
    /// Creates a publisher buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Registers a new subscriber that receives events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CloneEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventPublisher {
    async fn publish(&self, event: CloneEvent) {
        let name = event.name.clone();
        match self.sender.send(event) {
            Ok(receivers) => trace!("Published {} to {} subscriber(s)", name, receivers),
            Err(_) => trace!("Published {} with no subscribers", name),
        }
    }
}
