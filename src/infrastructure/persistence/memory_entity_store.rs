//! In-memory implementation of the entity store.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::catalog::RelationCatalog;
use crate::domain::entities::{LoadedRelation, PivotData, Record, RelationHandle, RelationKind};
use crate::domain::repositories::EntityStore;
use crate::error::CloneError;

/// Name of the connection records without an explicit connection live on.
pub const DEFAULT_CONNECTION: &str = "default";

/// A link-table row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLink {
    pub id: i64,
    pub parent_type: String,
    pub parent_id: i64,
    pub relation: String,
    pub related_id: i64,
    pub pivot: PivotData,
}

#[derive(Debug)]
struct MemoryConnection {
    next_id: i64,
    records: BTreeMap<i64, Record>,
    links: Vec<StoredLink>,
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self {
            next_id: 1,
            records: BTreeMap::new(),
            links: Vec::new(),
        }
    }
}

impl MemoryConnection {
    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Entity store keeping every connection in process memory.
///
/// Identifiers are assigned per connection starting at 1. Useful for tests
/// and for dry runs of a model manifest.
pub struct MemoryEntityStore {
    catalog: Arc<RelationCatalog>,
    default_connection: String,
    connections: RwLock<HashMap<String, MemoryConnection>>,
}

impl MemoryEntityStore {
    /// Creates a store with only the default connection.
    pub fn new(catalog: Arc<RelationCatalog>) -> Self {
        let mut connections = HashMap::new();
        connections.insert(DEFAULT_CONNECTION.to_string(), MemoryConnection::default());

        Self {
            catalog,
            default_connection: DEFAULT_CONNECTION.to_string(),
            connections: RwLock::new(connections),
        }
    }

    /// Adds another named connection.
    pub fn with_connection(mut self, name: impl Into<String>) -> Self {
        self.connections.get_mut().entry(name.into()).or_default();
        self
    }

    fn connection_name(&self, connection: Option<&str>) -> String {
        connection.unwrap_or(&self.default_connection).to_string()
    }

    fn unknown_connection(name: &str) -> CloneError {
        CloneError::store("Unknown connection", json!({ "connection": name }))
    }

    /// Inserts a fixture record, keeping its identifier and timestamps when set.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::Store`] if the connection is unknown or the
    /// identifier is already taken.
    pub async fn seed(&self, mut record: Record) -> Result<Record, CloneError> {
        let name = self.connection_name(record.connection.as_deref());
        let mut connections = self.connections.write().await;
        let connection = connections
            .get_mut(&name)
            .ok_or_else(|| Self::unknown_connection(&name))?;

        let id = match record.id {
            Some(id) if connection.records.contains_key(&id) => {
                return Err(CloneError::store(
                    "Unique constraint violation",
                    json!({ "connection": name, "id": id }),
                ));
            }
            Some(id) => {
                connection.next_id = connection.next_id.max(id + 1);
                id
            }
            None => connection.allocate_id(),
        };

        let now = Utc::now();
        record.id = Some(id);
        record.created_at.get_or_insert(now);
        record.updated_at.get_or_insert(now);
        connection.records.insert(id, record.clone());

        Ok(record)
    }

    /// Links two seeded records.
    ///
    /// # Errors
    ///
    /// See [`EntityStore::attach`].
    pub async fn seed_link(
        &self,
        parent: &Record,
        relation: &str,
        related: &Record,
        pivot: PivotData,
    ) -> Result<(), CloneError> {
        let handle = RelationHandle::for_record(parent, relation)?;
        self.attach(&handle, related, &pivot).await
    }

    /// All records of `entity_type` on a connection, ordered by id.
    pub async fn records_of_type(&self, connection: Option<&str>, entity_type: &str) -> Vec<Record> {
        let name = self.connection_name(connection);
        let connections = self.connections.read().await;
        connections
            .get(&name)
            .map(|c| {
                c.records
                    .values()
                    .filter(|r| r.entity_type == entity_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All link rows on a connection, in insertion order.
    pub async fn links(&self, connection: Option<&str>) -> Vec<StoredLink> {
        let name = self.connection_name(connection);
        let connections = self.connections.read().await;
        connections
            .get(&name)
            .map(|c| c.links.clone())
            .unwrap_or_default()
    }

    /// Number of records on a connection.
    pub async fn count(&self, connection: Option<&str>) -> usize {
        let name = self.connection_name(connection);
        let connections = self.connections.read().await;
        connections.get(&name).map_or(0, |c| c.records.len())
    }
}

fn points_to(value: Option<&Value>, parent_id: i64) -> bool {
    match value {
        Some(Value::Number(n)) => n.as_i64() == Some(parent_id),
        Some(Value::String(s)) => s.parse::<i64>().ok() == Some(parent_id),
        _ => false,
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn load_relation(
        &self,
        entity: &Record,
        relation: &str,
    ) -> Result<LoadedRelation, CloneError> {
        let definition = self.catalog.get(&entity.entity_type, relation)?;
        let handle = RelationHandle::for_record(entity, relation)?;

        let name = self.connection_name(entity.connection.as_deref());
        let connections = self.connections.read().await;
        let connection = connections
            .get(&name)
            .ok_or_else(|| Self::unknown_connection(&name))?;

        let members = match definition.kind {
            RelationKind::Owned => {
                let foreign_key = definition.require_foreign_key(relation)?;
                connection
                    .records
                    .values()
                    .filter(|r| r.entity_type == definition.related_type)
                    .filter(|r| points_to(r.get(foreign_key), handle.parent_id))
                    .cloned()
                    .collect()
            }
            RelationKind::Link => connection
                .links
                .iter()
                .filter(|l| {
                    l.parent_type == handle.parent_type
                        && l.parent_id == handle.parent_id
                        && l.relation == relation
                })
                .filter_map(|l| connection.records.get(&l.related_id).cloned())
                .collect(),
        };

        Ok(LoadedRelation::new(definition.kind, members))
    }

    async fn persist(&self, mut entity: Record) -> Result<Record, CloneError> {
        if entity.exists() {
            return Err(CloneError::store(
                "Record is already persisted",
                json!({ "entity": entity.label() }),
            ));
        }

        let name = self.connection_name(entity.connection.as_deref());
        let mut connections = self.connections.write().await;
        let connection = connections
            .get_mut(&name)
            .ok_or_else(|| Self::unknown_connection(&name))?;

        let id = connection.allocate_id();
        let now = Utc::now();
        entity.id = Some(id);
        entity.created_at = Some(now);
        entity.updated_at = Some(now);
        connection.records.insert(id, entity.clone());

        debug!("Stored {} on '{}'", entity.label(), name);
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

        let name = self.connection_name(relation.connection.as_deref());
        let mut connections = self.connections.write().await;
        let connection = connections
            .get_mut(&name)
            .ok_or_else(|| Self::unknown_connection(&name))?;

        for id in [relation.parent_id, related_id] {
            if !connection.records.contains_key(&id) {
                return Err(CloneError::store(
                    "Foreign key violation",
                    json!({ "connection": name, "missing_id": id }),
                ));
            }
        }

        let id = connection.links.len() as i64 + 1;
        connection.links.push(StoredLink {
            id,
            parent_type: relation.parent_type.clone(),
            parent_id: relation.parent_id,
            relation: relation.relation.clone(),
            related_id,
            pivot: pivot.clone(),
        });

        Ok(())
    }

    async fn find(
        &self,
        entity_type: &str,
        id: i64,
        connection: Option<String>,
    ) -> Result<Option<Record>, CloneError> {
        let name = self.connection_name(connection.as_deref());
        let connections = self.connections.read().await;
        let connection = connections
            .get(&name)
            .ok_or_else(|| Self::unknown_connection(&name))?;

        Ok(connection
            .records
            .get(&id)
            .filter(|r| r.entity_type == entity_type)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::catalog::RelationDefinition;

    fn store() -> MemoryEntityStore {
        let catalog = RelationCatalog::new()
            .with("post", "comments", RelationDefinition::owned("comment", "post_id"))
            .with("post", "tags", RelationDefinition::link("tag"));
        MemoryEntityStore::new(Arc::new(catalog)).with_connection("archive")
    }

    #[tokio::test]
    async fn test_persist_assigns_identity() {
        let store = store();

        let first = store.persist(Record::new("post").with("title", "A")).await.unwrap();
        let second = store.persist(Record::new("post").with("title", "B")).await.unwrap();

        assert_eq!(first.id, Some(1));
        assert_eq!(second.id, Some(2));
        assert!(first.created_at.is_some());
        assert_eq!(store.count(None).await, 2);
    }

    #[tokio::test]
    async fn test_persist_rejects_saved_record() {
        let store = store();
        let saved = store.persist(Record::new("post")).await.unwrap();

        let result = store.persist(saved).await;
        assert!(matches!(result, Err(CloneError::Store { .. })));
    }

    #[tokio::test]
    async fn test_persist_on_unknown_connection_fails() {
        let store = store();
        let mut record = Record::new("post");
        record.connection = Some("missing".to_string());

        let err = store.persist(record).await.unwrap_err();
        assert_eq!(err.details()["connection"], "missing");
    }

    #[tokio::test]
    async fn test_connections_are_isolated() {
        let store = store();
        let mut record = Record::new("post");
        record.connection = Some("archive".to_string());

        let saved = store.persist(record).await.unwrap();

        assert_eq!(saved.id, Some(1));
        assert_eq!(store.count(Some("archive")).await, 1);
        assert_eq!(store.count(None).await, 0);
        assert!(store.find("post", 1, None).await.unwrap().is_none());
        assert!(
            store
                .find("post", 1, Some("archive".to_string()))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_owned_relation_members() {
        let store = store();
        let post = store.seed(Record::new("post")).await.unwrap();
        let other = store.seed(Record::new("post")).await.unwrap();
        store
            .seed(Record::new("comment").with("post_id", post.id.unwrap()))
            .await
            .unwrap();
        store
            .seed(Record::new("comment").with("post_id", other.id.unwrap()))
            .await
            .unwrap();

        let loaded = store.load_relation(&post, "comments").await.unwrap();

        assert_eq!(loaded.kind, RelationKind::Owned);
        assert_eq!(loaded.members.len(), 1);
    }

    #[tokio::test]
    async fn test_persist_under_parent_sets_foreign_key() {
        let store = store();
        let post = store.seed(Record::new("post")).await.unwrap();
        let handle = RelationHandle::for_record(&post, "comments").unwrap();

        let comment = store
            .persist_under_parent(Record::new("comment").with("text", "hi"), &handle)
            .await
            .unwrap();

        assert_eq!(comment.get("post_id"), Some(&json!(post.id.unwrap())));
    }

    #[tokio::test]
    async fn test_link_relation_members_and_pivot() {
        let store = store();
        let post = store.seed(Record::new("post")).await.unwrap();
        let tag = store.seed(Record::new("tag").with("name", "rust")).await.unwrap();
        let mut pivot = PivotData::new();
        pivot.insert("weight".to_string(), json!(3));

        store.seed_link(&post, "tags", &tag, pivot.clone()).await.unwrap();

        let loaded = store.load_relation(&post, "tags").await.unwrap();
        assert_eq!(loaded.kind, RelationKind::Link);
        assert_eq!(loaded.members, vec![tag]);

        let links = store.links(None).await;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].pivot, pivot);
    }

    #[tokio::test]
    async fn test_attach_requires_existing_records() {
        let store = store();
        let post = store.seed(Record::new("post")).await.unwrap();
        let mut ghost = Record::new("tag");
        ghost.id = Some(99);

        let handle = RelationHandle::for_record(&post, "tags").unwrap();
        let result = store.attach(&handle, &ghost, &PivotData::new()).await;

        assert!(matches!(result, Err(CloneError::Store { .. })));
    }

    #[tokio::test]
    async fn test_seed_keeps_identifier() {
        let store = store();
        let mut fixture = Record::new("post");
        fixture.id = Some(9);

        store.seed(fixture.clone()).await.unwrap();
        let next = store.persist(Record::new("post")).await.unwrap();

        assert_eq!(next.id, Some(10));
        assert!(store.seed(fixture).await.is_err());
    }
}
