//! No-op event publisher.

use crate::domain::entities::CloneEvent;
use crate::domain::repositories::EventPublisher;
use async_trait::async_trait;

/// An event publisher that drops every event.
#[derive(Debug, Default)]
pub struct NullEventPublisher;

#[async_trait]
impl EventPublisher for NullEventPublisher {
    async fn publish(&self, _event: CloneEvent) {}
}
