//! Entity duplication service.

use std::sync::Arc;

use async_recursion::async_recursion;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::domain::cloneable::{Cloneable, ModelRegistry};
use crate::domain::entities::{
    CloneEvent, ClonePhase, PivotData, Record, RelationHandle, RelationKind,
};
use crate::domain::repositories::{EntityStore, EventPublisher, FileDuplicator};
use crate::error::CloneError;

/// Invocation-scoped options shared by one top-level duplication and every
/// recursive clone it triggers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneContext {
    destination: Option<String>,
}

impl CloneContext {
    /// Context that writes every clone of the tree to `destination`.
    pub fn to(destination: impl Into<String>) -> Self {
        Self {
            destination: Some(destination.into()),
        }
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }
}

/// Service that deep-copies persisted entities.
///
/// A duplication builds an unsaved copy of the source (minus its exempt
/// fields), duplicates its file attributes, saves it between the
/// `cloning:<type>` and `cloned:<type>` notifications and then walks the
/// relations the source's type declares:
///
/// - link-style relations are re-attached to the clone with the declared pivot data
/// - owned-style relations are recursively duplicated under the clone
///
/// The relation kind is resolved independently for every relation at every
/// depth. Cyclic owned-style declarations recurse without bound.
pub struct ClonerService<S: EntityStore, F: FileDuplicator, E: EventPublisher> {
    store: Arc<S>,
    files: Arc<F>,
    events: Arc<E>,
    registry: Arc<ModelRegistry>,
}

impl<S: EntityStore, F: FileDuplicator, E: EventPublisher> ClonerService<S, F, E> {
    /// Creates a new cloner service.
    pub fn new(
        store: Arc<S>,
        files: Arc<F>,
        events: Arc<E>,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            store,
            files,
            events,
            registry,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Duplicates `source` with its files and declared relations.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::UnsupportedEntity`] if the type of `source` (or of
    /// any owned member reached while recursing) is not registered.
    /// Returns [`CloneError::File`] / [`CloneError::Store`] from the collaborators;
    /// already persisted parts of the tree are not rolled back.
    pub async fn duplicate(&self, source: &Record) -> Result<Record, CloneError> {
        let clone = self
            .duplicate_in(source, None, &CloneContext::default())
            .await?;
        info!("Duplicated {} -> {}", source.label(), clone.label());
        Ok(clone)
    }

    /// Duplicates `source` and saves the clone as a child under `parent`.
    ///
    /// # Errors
    ///
    /// See [`Self::duplicate`].
    pub async fn duplicate_onto(
        &self,
        source: &Record,
        parent: RelationHandle,
    ) -> Result<Record, CloneError> {
        let clone = self
            .duplicate_in(source, Some(parent), &CloneContext::default())
            .await?;
        info!("Duplicated {} -> {}", source.label(), clone.label());
        Ok(clone)
    }

    /// Duplicates `source` onto another connection.
    ///
    /// Every entity created by this call, recursively, is saved on
    /// `destination`. Link-style relations are skipped anywhere in the tree:
    /// related identifiers are not valid on another connection. The override
    /// ends with this call, whether it succeeds or fails.
    ///
    /// # Errors
    ///
    /// See [`Self::duplicate`].
    pub async fn duplicate_to(
        &self,
        source: &Record,
        destination: &str,
    ) -> Result<Record, CloneError> {
        let context = CloneContext::to(destination);
        let clone = self.duplicate_in(source, None, &context).await?;
        info!(
            "Duplicated {} -> {} on connection '{}'",
            source.label(),
            clone.label(),
            destination
        );
        Ok(clone)
    }

    #[async_recursion]
    async fn duplicate_in(
        &self,
        source: &Record,
        parent: Option<RelationHandle>,
        context: &CloneContext,
    ) -> Result<Record, CloneError> {
        let model = self.registry.get(&source.entity_type)?;

        let mut clone = Self::clone_record(source, model, context);
        self.duplicate_files(&mut clone, model).await?;
        let clone = self.save_clone(clone, parent.as_ref(), source, model).await?;
        self.clone_relations(source, &clone, model, context).await?;

        counter!("cloner_entities_cloned_total", "entity_type" => source.entity_type.clone())
            .increment(1);

        Ok(clone)
    }

    fn clone_record(source: &Record, model: &dyn Cloneable, context: &CloneContext) -> Record {
        let mut clone = source.replicate(&model.exempt_attributes());
        if let Some(destination) = context.destination() {
            clone.connection = Some(destination.to_string());
        }
        clone
    }

    async fn duplicate_files(
        &self,
        clone: &mut Record,
        model: &dyn Cloneable,
    ) -> Result<(), CloneError> {
        for attribute in model.file_attributes() {
            let Some(original) = clone.file_reference(&attribute).map(str::to_owned) else {
                continue;
            };

            let copy = self.files.duplicate(&original).await?;
            debug!("Duplicated file {}: {} -> {}", attribute, original, copy);
            clone.set(attribute, copy);

            counter!("cloner_files_duplicated_total").increment(1);
        }

        Ok(())
    }

    /// Saves the clone, onto `parent` when given, between the two
    /// notifications.
    async fn save_clone(
        &self,
        mut clone: Record,
        parent: Option<&RelationHandle>,
        source: &Record,
        model: &dyn Cloneable,
    ) -> Result<Record, CloneError> {
        model.on_cloning(&mut clone, source);
        self.events
            .publish(CloneEvent::new(
                ClonePhase::Cloning,
                clone.clone(),
                source.clone(),
            ))
            .await;

        let mut clone = match parent {
            Some(handle) => self.store.persist_under_parent(clone, handle).await?,
            None => self.store.persist(clone).await?,
        };

        model.on_cloned(&mut clone, source);
        self.events
            .publish(CloneEvent::new(
                ClonePhase::Cloned,
                clone.clone(),
                source.clone(),
            ))
            .await;

        Ok(clone)
    }

    async fn clone_relations(
        &self,
        source: &Record,
        clone: &Record,
        model: &dyn Cloneable,
        context: &CloneContext,
    ) -> Result<(), CloneError> {
        for (relation, pivot) in model.cloneable_relations().iter() {
            let loaded = self.store.load_relation(source, relation).await?;

            match loaded.kind {
                RelationKind::Link => {
                    self.attach_members(clone, relation, pivot, &loaded.members, context)
                        .await?
                }
                RelationKind::Owned => {
                    self.duplicate_members(clone, relation, &loaded.members, context)
                        .await?
                }
            }
        }

        Ok(())
    }

    /// Links the clone to the same records the source is linked to.
    async fn attach_members(
        &self,
        clone: &Record,
        relation: &str,
        pivot: &PivotData,
        members: &[Record],
        context: &CloneContext,
    ) -> Result<(), CloneError> {
        if let Some(destination) = context.destination() {
            warn!(
                "Skipping link relation {}.{} while duplicating to '{}'",
                clone.entity_type, relation, destination
            );
            return Ok(());
        }

        let handle = RelationHandle::for_record(clone, relation)?;
        for member in members {
            self.store.attach(&handle, member, pivot).await?;
            counter!("cloner_links_attached_total").increment(1);
        }

        debug!(
            "Attached {} record(s) to {}.{}",
            members.len(),
            clone.label(),
            relation
        );
        Ok(())
    }

    /// Clones every member and saves it under the clone's relation.
    async fn duplicate_members(
        &self,
        clone: &Record,
        relation: &str,
        members: &[Record],
        context: &CloneContext,
    ) -> Result<(), CloneError> {
        let handle = RelationHandle::for_record(clone, relation)?;
        for member in members {
            self.duplicate_in(member, Some(handle.clone()), context)
                .await?;
        }

        debug!(
            "Cloned {} record(s) into {}.{}",
            members.len(),
            clone.label(),
            relation
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cloneable::{CloneDeclaration, DeclaredModel};
    use crate::domain::entities::LoadedRelation;
    use crate::domain::repositories::{MockEntityStore, MockEventPublisher, MockFileDuplicator};
    use chrono::{TimeZone, Utc};
    use mockall::Sequence;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    type TestService = ClonerService<MockEntityStore, MockFileDuplicator, MockEventPublisher>;

    fn tags_pivot() -> PivotData {
        let mut pivot = PivotData::new();
        pivot.insert("source".to_string(), Value::from("clone"));
        pivot
    }

    fn registry() -> ModelRegistry {
        ModelRegistry::new()
            .with(DeclaredModel::new(
                "post",
                CloneDeclaration::new()
                    .exempt(["slug"])
                    .files(["cover"])
                    .relation("comments")
                    .relation_with_pivot("tags", tags_pivot()),
            ))
            .with(DeclaredModel::new("comment", CloneDeclaration::new()))
    }

    fn saved(entity_type: &str, id: i64) -> Record {
        let mut record = Record::new(entity_type);
        record.id = Some(id);
        record.created_at = Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        record.updated_at = record.created_at;
        record
    }

    fn source_post() -> Record {
        saved("post", 1)
            .with("title", "A")
            .with("slug", "a")
            .with("cover", "img1.png")
    }

    fn assign_id(id: i64) -> impl Fn(Record) -> Result<Record, CloneError> + Send + 'static {
        move |mut record: Record| {
            record.id = Some(id);
            record.created_at = Some(Utc::now());
            record.updated_at = record.created_at;
            Ok(record)
        }
    }

    fn quiet_events() -> MockEventPublisher {
        let mut events = MockEventPublisher::new();
        events.expect_publish().returning(|_| ());
        events
    }

    fn copying_files() -> MockFileDuplicator {
        let mut files = MockFileDuplicator::new();
        files
            .expect_duplicate()
            .returning(|reference| Ok(reference.replace(".png", "_copy.png")));
        files
    }

    fn service(
        store: MockEntityStore,
        files: MockFileDuplicator,
        events: MockEventPublisher,
        registry: ModelRegistry,
    ) -> TestService {
        ClonerService::new(
            Arc::new(store),
            Arc::new(files),
            Arc::new(events),
            Arc::new(registry),
        )
    }

    fn empty_relations(store: &mut MockEntityStore) {
        store
            .expect_load_relation()
            .returning(|_, relation| {
                let kind = if relation == "tags" {
                    RelationKind::Link
                } else {
                    RelationKind::Owned
                };
                Ok(LoadedRelation::new(kind, vec![]))
            });
    }

    #[tokio::test]
    async fn test_duplicate_copies_fields_and_regenerates_identity() {
        let mut store = MockEntityStore::new();
        empty_relations(&mut store);
        store
            .expect_persist()
            .withf(|record| {
                record.id.is_none()
                    && record.created_at.is_none()
                    && record.get("title") == Some(&json!("A"))
                    && record.get("slug").is_none()
            })
            .times(1)
            .returning(assign_id(2));

        let service = service(store, copying_files(), quiet_events(), registry());
        let source = source_post();

        let clone = service.duplicate(&source).await.unwrap();

        assert_eq!(clone.id, Some(2));
        assert_ne!(clone.created_at, source.created_at);
        assert_eq!(clone.get("title"), source.get("title"));
        assert!(clone.get("slug").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_replaces_file_references() {
        let mut store = MockEntityStore::new();
        empty_relations(&mut store);
        store
            .expect_persist()
            .withf(|record| record.get("cover") == Some(&json!("img1_copy.png")))
            .times(1)
            .returning(assign_id(2));

        let mut files = MockFileDuplicator::new();
        files
            .expect_duplicate()
            .withf(|reference| reference == "img1.png")
            .times(1)
            .returning(|_| Ok("img1_copy.png".to_string()));

        let service = service(store, files, quiet_events(), registry());

        let clone = service.duplicate(&source_post()).await.unwrap();
        assert_eq!(clone.get("cover"), Some(&json!("img1_copy.png")));
    }

    #[tokio::test]
    async fn test_duplicate_skips_empty_file_fields() {
        let mut store = MockEntityStore::new();
        empty_relations(&mut store);
        store.expect_persist().times(1).returning(assign_id(2));

        let mut files = MockFileDuplicator::new();
        files.expect_duplicate().times(0);

        let service = service(store, files, quiet_events(), registry());
        let source = source_post().with("cover", "");

        let clone = service.duplicate(&source).await.unwrap();
        assert_eq!(clone.get("cover"), Some(&json!("")));
    }

    #[tokio::test]
    async fn test_file_error_aborts_before_persist() {
        let mut store = MockEntityStore::new();
        store.expect_persist().times(0);
        store.expect_load_relation().times(0);

        let mut files = MockFileDuplicator::new();
        files.expect_duplicate().times(1).returning(|reference| {
            Err(CloneError::file(
                "Source file missing",
                json!({ "reference": reference }),
            ))
        });

        let mut events = MockEventPublisher::new();
        events.expect_publish().times(0);

        let service = service(store, files, events, registry());

        let result = service.duplicate(&source_post()).await;
        assert!(matches!(result, Err(CloneError::File { .. })));
    }

    #[tokio::test]
    async fn test_unsupported_entity_fails_immediately() {
        let mut store = MockEntityStore::new();
        store.expect_persist().times(0);

        let service = service(
            store,
            MockFileDuplicator::new(),
            MockEventPublisher::new(),
            registry(),
        );

        let result = service.duplicate(&saved("user", 5)).await;
        assert!(matches!(result, Err(CloneError::UnsupportedEntity { .. })));
    }

    #[tokio::test]
    async fn test_notifications_surround_persist() {
        let mut seq = Sequence::new();
        let mut store = MockEntityStore::new();
        let mut events = MockEventPublisher::new();

        events
            .expect_publish()
            .withf(|event| {
                event.name == "cloning:post" && event.clone.id.is_none() && event.source.id == Some(1)
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| ());
        store
            .expect_persist()
            .times(1)
            .in_sequence(&mut seq)
            .returning(assign_id(2));
        events
            .expect_publish()
            .withf(|event| {
                event.name == "cloned:post"
                    && event.clone.id == Some(2)
                    && event.source.id == Some(1)
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| ());
        empty_relations(&mut store);

        let service = service(store, copying_files(), events, registry());

        service.duplicate(&source_post()).await.unwrap();
    }

    struct StampedPost {
        declaration: CloneDeclaration,
        calls: Mutex<Vec<String>>,
    }

    impl Cloneable for StampedPost {
        fn entity_type(&self) -> &str {
            "post"
        }

        fn declaration(&self) -> &CloneDeclaration {
            &self.declaration
        }

        fn declaration_mut(&mut self) -> &mut CloneDeclaration {
            &mut self.declaration
        }

        fn on_cloning(&self, clone: &mut Record, source: &Record) {
            self.calls.lock().unwrap().push("cloning".to_string());
            let title = source.get("title").and_then(Value::as_str).unwrap_or_default();
            clone.set("title", format!("Copy of {title}"));
        }

        fn on_cloned(&self, clone: &mut Record, source: &Record) {
            self.calls.lock().unwrap().push("cloned".to_string());
            clone.set("cloned_from", source.id);
        }
    }

    #[tokio::test]
    async fn test_lifecycle_callbacks_run_around_save() {
        let mut store = MockEntityStore::new();
        store
            .expect_persist()
            .withf(|record| {
                record.get("title") == Some(&json!("Copy of A")) && record.get("cloned_from").is_none()
            })
            .times(1)
            .returning(assign_id(2));

        let registry = ModelRegistry::new().with(StampedPost {
            declaration: CloneDeclaration::new(),
            calls: Mutex::new(Vec::new()),
        });
        let service = service(store, MockFileDuplicator::new(), quiet_events(), registry);

        let clone = service.duplicate(&source_post()).await.unwrap();

        assert_eq!(clone.get("title"), Some(&json!("Copy of A")));
        assert_eq!(clone.get("cloned_from"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_link_relation_attaches_with_pivot() {
        let mut store = MockEntityStore::new();
        store.expect_persist().times(1).returning(assign_id(2));
        store.expect_persist_under_parent().times(0);
        store.expect_load_relation().returning(|_, relation| {
            if relation == "tags" {
                Ok(LoadedRelation::new(
                    RelationKind::Link,
                    vec![saved("tag", 30), saved("tag", 31)],
                ))
            } else {
                Ok(LoadedRelation::new(RelationKind::Owned, vec![]))
            }
        });
        store
            .expect_attach()
            .withf(|handle, related, pivot| {
                handle.parent_id == 2
                    && handle.relation == "tags"
                    && related.entity_type == "tag"
                    && *pivot == tags_pivot()
            })
            .times(2)
            .returning(|_, _, _| Ok(()));

        let service = service(store, copying_files(), quiet_events(), registry());

        service.duplicate(&source_post()).await.unwrap();
    }

    #[tokio::test]
    async fn test_owned_relation_recursively_clones_members() {
        let mut store = MockEntityStore::new();
        store.expect_persist().times(1).returning(assign_id(2));
        store.expect_load_relation().returning(|entity, relation| {
            assert_eq!(entity.entity_type, "post");
            if relation == "comments" {
                Ok(LoadedRelation::new(
                    RelationKind::Owned,
                    vec![saved("comment", 9).with("text", "hi").with("post_id", 1)],
                ))
            } else {
                Ok(LoadedRelation::new(RelationKind::Link, vec![]))
            }
        });
        store
            .expect_persist_under_parent()
            .withf(|record, handle| {
                record.entity_type == "comment"
                    && record.id.is_none()
                    && record.get("text") == Some(&json!("hi"))
                    && handle.parent_type == "post"
                    && handle.parent_id == 2
                    && handle.relation == "comments"
            })
            .times(1)
            .returning(|mut record, handle| {
                record.set("post_id", handle.parent_id);
                record.id = Some(10);
                Ok(record)
            });

        let published = Arc::new(Mutex::new(Vec::new()));
        let mut events = MockEventPublisher::new();
        let sink = published.clone();
        events.expect_publish().returning(move |event| {
            sink.lock().unwrap().push(event.name.clone());
        });

        let service = service(store, copying_files(), events, registry());

        service.duplicate(&source_post()).await.unwrap();

        assert_eq!(
            *published.lock().unwrap(),
            vec!["cloning:post", "cloned:post", "cloning:comment", "cloned:comment"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_to_targets_destination_and_skips_links() {
        let mut store = MockEntityStore::new();
        store
            .expect_persist()
            .withf(|record| record.connection.as_deref() == Some("archive"))
            .times(1)
            .returning(assign_id(2));
        store.expect_load_relation().returning(|_, relation| {
            if relation == "tags" {
                Ok(LoadedRelation::new(RelationKind::Link, vec![saved("tag", 30)]))
            } else {
                Ok(LoadedRelation::new(
                    RelationKind::Owned,
                    vec![saved("comment", 9).with("text", "hi")],
                ))
            }
        });
        store.expect_attach().times(0);
        store
            .expect_persist_under_parent()
            .withf(|record, handle| {
                record.connection.as_deref() == Some("archive")
                    && handle.connection.as_deref() == Some("archive")
            })
            .times(1)
            .returning(|mut record, _| {
                record.id = Some(10);
                Ok(record)
            });

        let service = service(store, copying_files(), quiet_events(), registry());

        let clone = service.duplicate_to(&source_post(), "archive").await.unwrap();
        assert_eq!(clone.connection.as_deref(), Some("archive"));
    }

    #[tokio::test]
    async fn test_destination_does_not_leak_into_next_call() {
        let mut store = MockEntityStore::new();
        empty_relations(&mut store);
        let mut seq = Sequence::new();
        store
            .expect_persist()
            .withf(|record| record.connection.as_deref() == Some("archive"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(assign_id(2));
        store
            .expect_persist()
            .withf(|record| record.connection.is_none())
            .times(1)
            .in_sequence(&mut seq)
            .returning(assign_id(3));

        let service = service(store, copying_files(), quiet_events(), registry());
        let source = source_post();

        service.duplicate_to(&source, "archive").await.unwrap();
        let clone = service.duplicate(&source).await.unwrap();

        assert!(clone.connection.is_none());
    }

    #[tokio::test]
    async fn test_store_error_on_attach_propagates() {
        let mut store = MockEntityStore::new();
        store.expect_persist().times(1).returning(assign_id(2));
        store.expect_load_relation().returning(|_, relation| {
            if relation == "comments" {
                Ok(LoadedRelation::new(RelationKind::Owned, vec![]))
            } else {
                Ok(LoadedRelation::new(RelationKind::Link, vec![saved("tag", 30)]))
            }
        });
        store.expect_attach().times(1).returning(|_, _, _| {
            Err(CloneError::store("Connection lost", json!({})))
        });

        let service = service(store, copying_files(), quiet_events(), registry());

        let result = service.duplicate(&source_post()).await;
        assert!(matches!(result, Err(CloneError::Store { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_onto_saves_under_parent() {
        let mut store = MockEntityStore::new();
        store.expect_persist().times(0);
        store
            .expect_persist_under_parent()
            .withf(|record, handle| record.entity_type == "comment" && handle.parent_id == 42)
            .times(1)
            .returning(|mut record, _| {
                record.id = Some(11);
                Ok(record)
            });

        let service = service(store, MockFileDuplicator::new(), quiet_events(), registry());
        let parent = RelationHandle {
            parent_type: "post".to_string(),
            parent_id: 42,
            relation: "comments".to_string(),
            connection: None,
        };

        let clone = service
            .duplicate_onto(&saved("comment", 9), parent)
            .await
            .unwrap();
        assert_eq!(clone.id, Some(11));
    }
}
