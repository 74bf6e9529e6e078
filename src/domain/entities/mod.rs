//! Core domain entities shared by the engine and its collaborators.
//!
//! # Entity Types
//!
//! - [`Record`] - A persisted entity of any type with an open attribute map
//! - [`RelationKind`], [`LoadedRelation`], [`RelationHandle`] - Relation plumbing
//! - [`CloneEvent`] - Notification fired around the save of a clone

pub mod event;
pub mod record;
pub mod relation;

pub use event::{CloneEvent, ClonePhase};
pub use record::{CREATED_AT, KEY_NAME, Record, UPDATED_AT};
pub use relation::{LoadedRelation, PivotData, RelationHandle, RelationKind};
