//! Infrastructure layer for external integrations.
//!
//! This layer implements the collaborator traits defined by the domain layer.
//!
//! # Modules
//!
//! - [`persistence`] - Entity stores (PostgreSQL and in-memory)
//! - [`files`] - File duplication (local filesystem and no-op)
//! - [`events`] - Clone notifications (broadcast channel and no-op)

pub mod events;
pub mod files;
pub mod persistence;
