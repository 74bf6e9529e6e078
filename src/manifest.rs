//! Declarative model manifest.
//!
//! The CLI describes its entity types in a JSON file instead of Rust code:
//!
//! ```json
//! {
//!   "models": [
//!     {
//!       "entity_type": "post",
//!       "exempt_attributes": ["slug"],
//!       "file_attributes": ["cover"],
//!       "relations": [
//!         { "name": "comments", "kind": "owned", "related_type": "comment", "foreign_key": "post_id" },
//!         { "name": "tags", "kind": "link", "related_type": "tag", "pivot": { "source": "clone" } }
//!       ]
//!     },
//!     { "entity_type": "comment" }
//!   ]
//! }
//! ```
//!
//! Every relation is registered in the [`RelationCatalog`]; only those with
//! `cloneable` (default `true`) follow the entity into its clone.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::domain::cloneable::{CloneDeclaration, DeclaredModel, ModelRegistry};
use crate::domain::entities::{PivotData, RelationKind};
use crate::infrastructure::persistence::{RelationCatalog, RelationDefinition};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub models: Vec<ModelManifest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelManifest {
    pub entity_type: String,
    #[serde(default)]
    pub exempt_attributes: Vec<String>,
    #[serde(default)]
    pub file_attributes: Vec<String>,
    #[serde(default)]
    pub relations: Vec<RelationManifest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationManifest {
    pub name: String,
    pub kind: RelationKind,
    pub related_type: String,
    #[serde(default)]
    pub foreign_key: Option<String>,
    #[serde(default)]
    pub pivot: Option<PivotData>,
    #[serde(default = "default_cloneable")]
    pub cloneable: bool,
}

fn default_cloneable() -> bool {
    true
}

/// Registry and catalog built from a manifest.
pub struct LoadedModels {
    pub registry: ModelRegistry,
    pub catalog: RelationCatalog,
}

impl Manifest {
    /// Reads and parses a manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid manifest.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model manifest {}", path.display()))?;

        Self::from_json(&raw)
            .with_context(|| format!("Invalid model manifest {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(raw).context("Malformed manifest JSON")?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Checks cross-model consistency.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - a model or relation name is empty or declared twice
    /// - an owned relation has no `foreign_key`
    /// - a cloneable owned relation points at a type missing from the manifest
    pub fn validate(&self) -> Result<()> {
        let mut types = HashSet::new();
        for model in &self.models {
            if model.entity_type.trim().is_empty() {
                anyhow::bail!("Model entity_type must not be empty");
            }
            if !types.insert(model.entity_type.as_str()) {
                anyhow::bail!("Model '{}' is declared more than once", model.entity_type);
            }
        }

        for model in &self.models {
            let mut names = HashSet::new();
            for relation in &model.relations {
                if relation.name.trim().is_empty() {
                    anyhow::bail!("Model '{}' has a relation without a name", model.entity_type);
                }
                if !names.insert(relation.name.as_str()) {
                    anyhow::bail!(
                        "Relation '{}.{}' is declared more than once",
                        model.entity_type,
                        relation.name
                    );
                }

                if relation.kind == RelationKind::Owned {
                    if relation.foreign_key.is_none() {
                        anyhow::bail!(
                            "Owned relation '{}.{}' needs a foreign_key",
                            model.entity_type,
                            relation.name
                        );
                    }
                    if relation.cloneable && !types.contains(relation.related_type.as_str()) {
                        anyhow::bail!(
                            "Owned relation '{}.{}' points at undeclared model '{}'",
                            model.entity_type,
                            relation.name,
                            relation.related_type
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Builds the model registry and relation catalog.
    pub fn build(&self) -> LoadedModels {
        let mut registry = ModelRegistry::new();
        let mut catalog = RelationCatalog::new();

        for model in &self.models {
            let mut declaration = CloneDeclaration::new()
                .exempt(model.exempt_attributes.iter().cloned())
                .files(model.file_attributes.iter().cloned());

            for relation in &model.relations {
                let definition = match (relation.kind, &relation.foreign_key) {
                    (RelationKind::Owned, Some(foreign_key)) => {
                        RelationDefinition::owned(&relation.related_type, foreign_key)
                    }
                    _ => RelationDefinition::link(&relation.related_type),
                };
                catalog.define(&model.entity_type, &relation.name, definition);

                if relation.cloneable {
                    declaration = match &relation.pivot {
                        Some(pivot) => {
                            declaration.relation_with_pivot(&relation.name, pivot.clone())
                        }
                        None => declaration.relation(&relation.name),
                    };
                }
            }

            registry.register(DeclaredModel::new(&model.entity_type, declaration));
        }

        tracing::debug!(
            "Built {} models with {} relations from manifest",
            self.models.len(),
            catalog.len()
        );

        LoadedModels { registry, catalog }
    }
}
