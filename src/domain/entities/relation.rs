//! Relation kinds, handles and pivot data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::record::Record;
use crate::error::CloneError;

/// Extra key/value pairs recorded alongside a link-style association.
pub type PivotData = Map<String, Value>;

/// How a relation is stored, which decides how it is duplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// Many-to-many through a join structure. Duplication re-links.
    Link,
    /// One-to-many / has-many. Duplication recursively clones members.
    Owned,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Owned => "owned",
        }
    }
}

/// Kind and current members of one relation of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRelation {
    pub kind: RelationKind,
    pub members: Vec<Record>,
}

impl LoadedRelation {
    pub fn new(kind: RelationKind, members: Vec<Record>) -> Self {
        Self { kind, members }
    }
}

/// Addresses "relation `relation` on persisted entity `parent_id`".
///
/// Used to save a child under its parent and to attach link-style members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationHandle {
    pub parent_type: String,
    pub parent_id: i64,
    pub relation: String,
    pub connection: Option<String>,
}

impl RelationHandle {
    /// Builds the handle for `relation` on a persisted `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::Store`] if `parent` has not been saved yet.
    pub fn for_record(parent: &Record, relation: &str) -> Result<Self, CloneError> {
        let parent_id = parent.id.ok_or_else(|| {
            CloneError::store(
                "Relation parent is not persisted",
                json!({ "entity_type": parent.entity_type, "relation": relation }),
            )
        })?;

        Ok(Self {
            parent_type: parent.entity_type.clone(),
            parent_id,
            relation: relation.to_string(),
            connection: parent.connection.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_for_persisted_record() {
        let mut post = Record::new("post");
        post.id = Some(7);
        post.connection = Some("archive".to_string());

        let handle = RelationHandle::for_record(&post, "comments").unwrap();

        assert_eq!(handle.parent_type, "post");
        assert_eq!(handle.parent_id, 7);
        assert_eq!(handle.relation, "comments");
        assert_eq!(handle.connection.as_deref(), Some("archive"));
    }

    #[test]
    fn test_handle_for_unsaved_record_fails() {
        let result = RelationHandle::for_record(&Record::new("post"), "comments");
        assert!(matches!(result, Err(CloneError::Store { .. })));
    }

    #[test]
    fn test_relation_kind_serde() {
        let kind: RelationKind = serde_json::from_str("\"owned\"").unwrap();
        assert_eq!(kind, RelationKind::Owned);
        assert_eq!(RelationKind::Link.as_str(), "link");
    }
}
