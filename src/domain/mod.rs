//! Domain layer: entities, the cloneable contract and collaborator contracts.
//!
//! # Architecture
//!
//! - [`entities`] - Records, relation plumbing and clone events
//! - [`cloneable`] - The contract every duplicable entity type satisfies
//! - [`repositories`] - Persistence, file and event collaborator traits
//!
//! The domain layer has no dependency on the infrastructure layer; concrete
//! collaborators live in [`crate::infrastructure`].

pub mod cloneable;
pub mod entities;
pub mod repositories;
