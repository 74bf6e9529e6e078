//! Persistence collaborator consumed by the duplication engine.

use crate::domain::entities::{LoadedRelation, PivotData, Record, RelationHandle};
use crate::error::CloneError;
use async_trait::async_trait;

/// Repository interface for loading, saving and linking entities.
///
/// The engine never inspects storage details: it asks the store for the kind
/// and members of a relation and hands records back to be saved.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgEntityStore`] - PostgreSQL, one pool per connection
/// - [`crate::infrastructure::persistence::MemoryEntityStore`] - In-memory store
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Resolves the kind of `relation` on `entity` and loads its current members.
    ///
    /// Members are read from the connection `entity` lives on.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::Store`] if the relation is unknown for the entity
    /// type or on storage errors.
    async fn load_relation(
        &self,
        entity: &Record,
        relation: &str,
    ) -> Result<LoadedRelation, CloneError>;

    /// Saves a new record on its connection and returns it with identifier
    /// and timestamps populated.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::Store`] on constraint violations or connectivity failures.
    async fn persist(&self, entity: Record) -> Result<Record, CloneError>;

    /// Saves a new record as a child under `parent`, setting whatever key ties
    /// it to the parent.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::Store`] on constraint violations or connectivity failures.
    async fn persist_under_parent(
        &self,
        entity: Record,
        parent: &RelationHandle,
    ) -> Result<Record, CloneError>;

    /// Links an existing `related` record to `relation`, recording `pivot`
    /// alongside the link.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::Store`] on storage errors.
    async fn attach(
        &self,
        relation: &RelationHandle,
        related: &Record,
        pivot: &PivotData,
    ) -> Result<(), CloneError>;

    /// Finds a record by type and identifier on a connection.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::Store`] on storage errors.
    async fn find(
        &self,
        entity_type: &str,
        id: i64,
        connection: Option<String>,
    ) -> Result<Option<Record>, CloneError>;
}
