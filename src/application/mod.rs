//! Application layer services.
//!
//! This layer orchestrates domain operations by coordinating the collaborator
//! traits defined in [`crate::domain::repositories`].
//!
//! # Available Services
//!
//! - [`services::cloner_service::ClonerService`] - Deep duplication of entities,
//!   their files and their declared relations

pub mod services;
