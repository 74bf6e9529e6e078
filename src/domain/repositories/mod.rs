//! Collaborator contracts consumed by the duplication engine.
//!
//! These traits are implemented by the infrastructure layer; the engine only
//! depends on the traits.
//!
//! # Available Contracts
//!
//! - [`EntityStore`] - Relation loading, saving and linking
//! - [`FileDuplicator`] - Copies file references
//! - [`EventPublisher`] - Publishes `cloning:*` / `cloned:*` notifications
//!
//! Mock implementations are auto-generated via `mockall` for testing.

pub mod entity_store;
pub mod event_publisher;
pub mod file_duplicator;

pub use entity_store::EntityStore;
pub use event_publisher::EventPublisher;
pub use file_duplicator::FileDuplicator;

#[cfg(test)]
pub use entity_store::MockEntityStore;
#[cfg(test)]
pub use event_publisher::MockEventPublisher;
#[cfg(test)]
pub use file_duplicator::MockFileDuplicator;
