//! Event bus collaborator.

use crate::domain::entities::CloneEvent;
use async_trait::async_trait;

/// Publishes clone lifecycle notifications.
///
/// Publishing is fire-and-forget: delivery failures stay inside the
/// implementation and a missing subscriber is not an error.
///
/// # Implementations
///
/// - [`crate::infrastructure::events::BroadcastEventPublisher`] - Fan-out to in-process subscribers
/// - [`crate::infrastructure::events::NullEventPublisher`] - Discards every event
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: CloneEvent);
}
