//! Record entity representing one persisted row of any entity type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the identifier field.
pub const KEY_NAME: &str = "id";
/// Name of the creation timestamp field.
pub const CREATED_AT: &str = "created_at";
/// Name of the update timestamp field.
pub const UPDATED_AT: &str = "updated_at";

/// A persisted (or about to be persisted) entity.
///
/// The identifier and both timestamps are owned by the store: they are `None`
/// until the record is saved and are regenerated on every save of a new record.
/// All other data lives in the open `attributes` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub entity_type: String,
    pub id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    /// Storage target; `None` means the store's default connection.
    #[serde(default)]
    pub connection: Option<String>,
}

impl Record {
    /// Creates a new unsaved record with no attributes.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: None,
            created_at: None,
            updated_at: None,
            attributes: BTreeMap::new(),
            connection: None,
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Returns true once the store has assigned an identifier.
    pub fn exists(&self) -> bool {
        self.id.is_some()
    }

    /// Returns the attribute as a string when it holds a usable file reference.
    ///
    /// Absent, `null`, `false`, empty and `"0"` values count as empty.
    pub fn file_reference(&self, name: &str) -> Option<&str> {
        match self.attributes.get(name)? {
            Value::String(s) if !s.is_empty() && s != "0" => Some(s.as_str()),
            _ => None,
        }
    }

    /// Builds an unsaved copy of this record.
    ///
    /// Identifier and timestamps are always left unset; attributes named in
    /// `exempt` are not copied. The storage target is preserved.
    pub fn replicate(&self, exempt: &[String]) -> Record {
        let attributes = self
            .attributes
            .iter()
            .filter(|(name, _)| !exempt.iter().any(|e| e == *name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Record {
            entity_type: self.entity_type.clone(),
            id: None,
            created_at: None,
            updated_at: None,
            attributes,
            connection: self.connection.clone(),
        }
    }

    /// Short `type#id` label used in logs.
    pub fn label(&self) -> String {
        match self.id {
            Some(id) => format!("{}#{}", self.entity_type, id),
            None => format!("{}#new", self.entity_type),
        }
    }
}
