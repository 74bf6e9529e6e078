//! Relation schema shared by the entity store implementations.

use serde_json::json;
use std::collections::HashMap;

use crate::domain::entities::RelationKind;
use crate::error::CloneError;

/// How one relation of one entity type is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDefinition {
    pub kind: RelationKind,
    pub related_type: String,
    /// Attribute on the related record holding the parent id (owned relations).
    pub foreign_key: Option<String>,
}

impl RelationDefinition {
    /// Many-to-many relation recorded in the link table.
    pub fn link(related_type: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::Link,
            related_type: related_type.into(),
            foreign_key: None,
        }
    }

    /// Has-many relation whose members point back through `foreign_key`.
    pub fn owned(related_type: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::Owned,
            related_type: related_type.into(),
            foreign_key: Some(foreign_key.into()),
        }
    }

    /// Foreign key of an owned relation.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::Store`] if the definition carries no foreign key.
    pub fn require_foreign_key(&self, relation: &str) -> Result<&str, CloneError> {
        self.foreign_key.as_deref().ok_or_else(|| {
            CloneError::store(
                "Owned relation has no foreign key",
                json!({ "relation": relation, "related_type": self.related_type }),
            )
        })
    }
}

/// Relation definitions keyed by owner type and relation name.
#[derive(Debug, Clone, Default)]
pub struct RelationCatalog {
    relations: HashMap<(String, String), RelationDefinition>,
}

impl RelationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(
        &mut self,
        owner_type: impl Into<String>,
        relation: impl Into<String>,
        definition: RelationDefinition,
    ) {
        self.relations
            .insert((owner_type.into(), relation.into()), definition);
    }

    pub fn with(
        mut self,
        owner_type: impl Into<String>,
        relation: impl Into<String>,
        definition: RelationDefinition,
    ) -> Self {
        self.define(owner_type, relation, definition);
        self
    }

    /// Looks up the definition of `relation` on `owner_type`.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::Store`] if the relation is not defined.
    pub fn get(&self, owner_type: &str, relation: &str) -> Result<&RelationDefinition, CloneError> {
        self.relations
            .get(&(owner_type.to_string(), relation.to_string()))
            .ok_or_else(|| {
                CloneError::store(
                    "Unknown relation",
                    json!({ "entity_type": owner_type, "relation": relation }),
                )
            })
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}
