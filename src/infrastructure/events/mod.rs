//! Clone notification delivery.
//!
//! Provides two [`EventPublisher`](crate::domain::repositories::EventPublisher)
//! implementations:
//! - [`BroadcastEventPublisher`] - Fan-out to in-process subscribers
//! - [`NullEventPublisher`] - Discards every event

mod broadcast_publisher;
mod null_publisher;

pub use broadcast_publisher::BroadcastEventPublisher;
pub use null_publisher::NullEventPublisher;
