//! Business logic services for the application layer.

pub mod cloner_service;

pub use cloner_service::{CloneContext, ClonerService};
