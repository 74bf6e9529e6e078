//! PostgreSQL implementation of the entity store.

use async_trait::async_trait;
use serde_json::{Value, json};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::catalog::RelationCatalog;
use super::memory_entity_store::DEFAULT_CONNECTION;
use crate::domain::entities::{LoadedRelation, PivotData, Record, RelationHandle, RelationKind};
use crate::domain::repositories::EntityStore;
use crate::error::CloneError;

const SELECT_ENTITY: &str = "SELECT id, entity_type, attributes, created_at, updated_at FROM entities";

/// PostgreSQL entity store with one pool per named connection.
///
/// Every connection uses the same generic schema (see `migrations/`):
/// records live in `entities` with a JSONB attribute map, link-style
/// associations in `entity_links`. Owned members are found through
/// `attributes ->> foreign_key`.
pub struct PgEntityStore {
    pools: HashMap<String, PgPool>,
    default_connection: String,
    catalog: Arc<RelationCatalog>,
}

impl PgEntityStore {
    /// Creates a store whose default connection uses `pool`.
    pub fn new(pool: PgPool, catalog: Arc<RelationCatalog>) -> Self {
        let mut pools = HashMap::new();
        pools.insert(DEFAULT_CONNECTION.to_string(), pool);

        Self {
            pools,
            default_connection: DEFAULT_CONNECTION.to_string(),
            catalog,
        }
    }

    /// Registers another named connection, usable as a duplication destination.
    pub fn with_connection(mut self, name: impl Into<String>, pool: PgPool) -> Self {
        self.pools.insert(name.into(), pool);
        self
    }

    /// Renames the default connection.
    pub fn with_default_connection(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if let Some(pool) = self.pools.remove(&self.default_connection) {
            self.pools.insert(name.clone(), pool);
        }
        self.default_connection = name;
        self
    }

    pub fn connection_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.pools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn pool(&self, connection: Option<&str>) -> Result<&PgPool, CloneError> {
        let name = connection.unwrap_or(&self.default_connection);
        self.pools
            .get(name)
            .ok_or_else(|| CloneError::store("Unknown connection", json!({ "connection": name })))
    }

    /// Applies the schema migrations on every connection.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::Store`] naming the first connection that failed.
    pub async fn migrate(&self) -> Result<(), CloneError> {
        for (name, pool) in &self.pools {
            sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
                CloneError::store(
                    "Migration failed",
                    json!({ "connection": name, "reason": e.to_string() }),
                )
            })?;
            debug!("Migrated connection '{}'", name);
        }
        Ok(())
    }

    /// Runs `SELECT 1` on every connection and reports the outcome per name.
    pub async fn check_connections(&self) -> Vec<(String, Result<(), CloneError>)> {
        let mut results = Vec::with_capacity(self.pools.len());
        for name in self.connection_names() {
            let result = match self.pools.get(name) {
                Some(pool) => sqlx::query("SELECT 1")
                    .execute(pool)
                    .await
                    .map(|_| ())
                    .map_err(CloneError::from),
                None => Ok(()),
            };
            results.push((name.to_string(), result));
        }
        results
    }
}

fn record_from_row(row: &PgRow, connection: Option<&str>) -> Result<Record, sqlx::Error> {
    let attributes: Json<BTreeMap<String, Value>> = row.try_get("attributes")?;

    Ok(Record {
        entity_type: row.try_get("entity_type")?,
        id: Some(row.try_get("id")?),
        created_at: Some(row.try_get("created_at")?),
        updated_at: Some(row.try_get("updated_at")?),
        attributes: attributes.0,
        connection: connection.map(str::to_string),
    })
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn load_relation(
        &self,
        entity: &Record,
        relation: &str,
    ) -> Result<LoadedRelation, CloneError> {
        let definition = self.catalog.get(&entity.entity_type, relation)?;
        let handle = RelationHandle::for_record(entity, relation)?;
        let connection = entity.connection.as_deref();
        let pool = self.pool(connection)?;

        let rows = match definition.kind {
            RelationKind::Owned => {
                let foreign_key = definition.require_foreign_key(relation)?;
                sqlx::query(&format!(
                    "{SELECT_ENTITY} WHERE entity_type = $1 AND attributes ->> $2 = $3 ORDER BY id"
                ))
                .bind(&definition.related_type)
                .bind(foreign_key)
                .bind(handle.parent_id.to_string())
                .fetch_all(pool)
                .await?
            }
            RelationKind::Link => {
                sqlx::query(
                    r#"
                SELECT e.id, e.entity_type, e.attributes, e.created_at, e.updated_at
                FROM entity_links l
                JOIN entities e ON e.id = l.related_id
                WHERE l.parent_type = $1 AND l.parent_id = $2 AND l.relation = $3
                ORDER BY l.id
                "#,
                )
                .bind(&handle.parent_type)
                .bind(handle.parent_id)
                .bind(relation)
                .fetch_all(pool)
                .await?
            }
        };

        let members = rows
            .iter()
            .map(|row| record_from_row(row, connection))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LoadedRelation::new(definition.kind, members))
    }

    async fn persist(&self, mut entity: Record) -> Result<Record, CloneError> {
        if entity.exists() {
            return Err(CloneError::store(
                "Record is already persisted",
                json!({ "entity": entity.label() }),
            ));
        }

        let pool = self.pool(entity.connection.as_deref())?;
        let row = sqlx::query(
            r#"
            INSERT INTO entities (entity_type, attributes)
            VALUES ($1, $2)
            RETURNING id, created_at, updated_at
            "#,
        )
        .bind(&entity.entity_type)
        .bind(Json(&entity.attributes))
        .fetch_one(pool)
        .await?;

        entity.id = Some(row.try_get("id")?);
        entity.created_at = Some(row.try_get("created_at")?);
        entity.updated_at = Some(row.try_get("updated_at")?);

        debug!("Inserted {}", entity.label());
        Ok(entity)
    }

    async fn persist_under_parent(
        &self,
        mut entity: Record,
        parent: &RelationHandle,
    ) -> Result<Record, CloneError> {
        let definition = self.catalog.get(&parent.parent_type, &parent.relation)?;

        match definition.kind {
            RelationKind::Owned => {
                let foreign_key = definition.require_foreign_key(&parent.relation)?;
                entity.set(foreign_key, parent.parent_id);
                self.persist(entity).await
            }
            RelationKind::Link => {
                let saved = self.persist(entity).await?;
                self.attach(parent, &saved, &PivotData::new()).await?;
                Ok(saved)
            }
        }
    }

    async fn attach(
        &self,
        relation: &RelationHandle,
        related: &Record,
        pivot: &PivotData,
    ) -> Result<(), CloneError> {
        let related_id = related.id.ok_or_else(|| {
            CloneError::store(
                "Related record is not persisted",
                json!({ "relation": relation.relation }),
            )
        })?;

        let pool = self.pool(relation.connection.as_deref())?;
        sqlx::query(
            r#"
            INSERT INTO entity_links (parent_type, parent_id, relation, related_id, pivot)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&relation.parent_type)
        .bind(relation.parent_id)
        .bind(&relation.relation)
        .bind(related_id)
        .bind(Json(pivot))
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn find(
        &self,
        entity_type: &str,
        id: i64,
        connection: Option<String>,
    ) -> Result<Option<Record>, CloneError> {
        let pool = self.pool(connection.as_deref())?;
        let row = sqlx::query(&format!("{SELECT_ENTITY} WHERE entity_type = $1 AND id = $2"))
            .bind(entity_type)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row
            .map(|row| record_from_row(&row, connection.as_deref()))
            .transpose()?)
    }
}
