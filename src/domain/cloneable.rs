//! The cloneable entity contract.
//!
//! Every entity type that can be duplicated declares which fields are never
//! copied, which fields reference external files and which relations follow
//! the entity into its clone. The engine only ever talks to entity types
//! through the [`Cloneable`] trait, looked up by type name in a
//! [`ModelRegistry`].

use serde_json::json;
use std::collections::HashMap;

use crate::domain::entities::{CREATED_AT, KEY_NAME, PivotData, Record, UPDATED_AT};
use crate::error::CloneError;

/// Fields that are exempt from copying for every entity type.
pub const DEFAULT_EXEMPT_ATTRIBUTES: [&str; 3] = [KEY_NAME, CREATED_AT, UPDATED_AT];

/// Ordered set of cloneable relation names, each with optional pivot data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloneableRelations {
    entries: Vec<(String, PivotData)>,
}

impl CloneableRelations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `relation` with no pivot data. Adding an existing name is a no-op.
    pub fn add(&mut self, relation: impl Into<String>) {
        let relation = relation.into();
        if self.contains(&relation) {
            return;
        }
        self.entries.push((relation, PivotData::new()));
    }

    /// Adds `relation` with pivot data, or replaces the pivot data of an
    /// already declared relation while keeping its position.
    pub fn add_with_pivot(&mut self, relation: impl Into<String>, pivot: PivotData) {
        let relation = relation.into();
        match self.entries.iter_mut().find(|(name, _)| *name == relation) {
            Some((_, existing)) => *existing = pivot,
            None => self.entries.push((relation, pivot)),
        }
    }

    pub fn contains(&self, relation: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == relation)
    }

    /// Pivot data declared for `relation`, empty when none was declared.
    pub fn pivot_data(&self, relation: &str) -> PivotData {
        self.entries
            .iter()
            .find(|(name, _)| name == relation)
            .map(|(_, pivot)| pivot.clone())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PivotData)> {
        self.entries.iter().map(|(name, pivot)| (name.as_str(), pivot))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Declarative cloning data of one entity type.
#[derive(Debug, Clone, Default)]
pub struct CloneDeclaration {
    /// Type-specific exemptions, merged after [`DEFAULT_EXEMPT_ATTRIBUTES`].
    pub exempt_attributes: Vec<String>,
    pub file_attributes: Vec<String>,
    pub relations: CloneableRelations,
}

impl CloneDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exempt<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exempt_attributes
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    pub fn files<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_attributes
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    pub fn relation(mut self, relation: impl Into<String>) -> Self {
        self.relations.add(relation);
        self
    }

    pub fn relation_with_pivot(mut self, relation: impl Into<String>, pivot: PivotData) -> Self {
        self.relations.add_with_pivot(relation, pivot);
        self
    }
}

/// Contract every duplicable entity type satisfies.
///
/// Implementors provide their type name and declaration; everything else has
/// a default. Override [`Cloneable::on_cloning`] / [`Cloneable::on_cloned`] to
/// adjust the clone around its save.
pub trait Cloneable: Send + Sync {
    fn entity_type(&self) -> &str;

    fn declaration(&self) -> &CloneDeclaration;

    fn declaration_mut(&mut self) -> &mut CloneDeclaration;

    /// Identifier and timestamps followed by the type's own exemptions.
    fn exempt_attributes(&self) -> Vec<String> {
        let mut exempt: Vec<String> = DEFAULT_EXEMPT_ATTRIBUTES
            .iter()
            .map(|name| name.to_string())
            .collect();
        for name in &self.declaration().exempt_attributes {
            if !exempt.contains(name) {
                exempt.push(name.clone());
            }
        }
        exempt
    }

    fn file_attributes(&self) -> Vec<String> {
        self.declaration().file_attributes.clone()
    }

    fn cloneable_relations(&self) -> &CloneableRelations {
        &self.declaration().relations
    }

    fn relation_pivot_data(&self, relation: &str) -> PivotData {
        self.declaration().relations.pivot_data(relation)
    }

    fn add_cloneable_relation(&mut self, relation: &str) {
        self.declaration_mut().relations.add(relation);
    }

    /// Called on the clone right before it is persisted.
    fn on_cloning(&self, _clone: &mut Record, _source: &Record) {}

    /// Called on the clone right after it is persisted.
    fn on_cloned(&self, _clone: &mut Record, _source: &Record) {}
}

/// A purely declarative entity type without lifecycle callbacks.
#[derive(Debug, Clone)]
pub struct DeclaredModel {
    entity_type: String,
    declaration: CloneDeclaration,
}

impl DeclaredModel {
    pub fn new(entity_type: impl Into<String>, declaration: CloneDeclaration) -> Self {
        Self {
            entity_type: entity_type.into(),
            declaration,
        }
    }
}

impl Cloneable for DeclaredModel {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn declaration(&self) -> &CloneDeclaration {
        &self.declaration
    }

    fn declaration_mut(&mut self) -> &mut CloneDeclaration {
        &mut self.declaration
    }
}

/// Cloneable entity types keyed by type name.
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<String, Box<dyn Cloneable>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model, replacing any earlier model of the same type.
    pub fn register<M: Cloneable + 'static>(&mut self, model: M) {
        self.models
            .insert(model.entity_type().to_string(), Box::new(model));
    }

    pub fn with<M: Cloneable + 'static>(mut self, model: M) -> Self {
        self.register(model);
        self
    }

    /// Looks up the contract of `entity_type`.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::UnsupportedEntity`] if the type is not registered.
    pub fn get(&self, entity_type: &str) -> Result<&dyn Cloneable, CloneError> {
        self.models
            .get(entity_type)
            .map(|model| model.as_ref())
            .ok_or_else(|| {
                CloneError::unsupported_entity(
                    "Entity type is not cloneable",
                    json!({ "entity_type": entity_type }),
                )
            })
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.models.contains_key(entity_type)
    }

    /// Declares an extra cloneable relation on a registered type.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::UnsupportedEntity`] if the type is not registered.
    pub fn add_cloneable_relation(
        &mut self,
        entity_type: &str,
        relation: &str,
    ) -> Result<(), CloneError> {
        let model = self.models.get_mut(entity_type).ok_or_else(|| {
            CloneError::unsupported_entity(
                "Entity type is not cloneable",
                json!({ "entity_type": entity_type }),
            )
        })?;
        model.add_cloneable_relation(relation);
        Ok(())
    }

    pub fn entity_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.models.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}
