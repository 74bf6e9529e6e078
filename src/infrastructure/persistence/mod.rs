//! Entity store implementations.
//!
//! Both stores resolve relation kinds from a shared [`RelationCatalog`] and
//! treat a record's `connection` as its storage target.
//!
//! # Stores
//!
//! - [`PgEntityStore`] - PostgreSQL via SQLx, one pool per named connection
//! - [`MemoryEntityStore`] - In-memory connections for tests and dry runs

pub mod catalog;
pub mod memory_entity_store;
pub mod pg_entity_store;

pub use catalog::{RelationCatalog, RelationDefinition};
pub use memory_entity_store::{DEFAULT_CONNECTION, MemoryEntityStore, StoredLink};
pub use pg_entity_store::PgEntityStore;
