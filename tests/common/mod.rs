#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use entity_cloner::application::services::ClonerService;
use entity_cloner::domain::cloneable::{CloneDeclaration, DeclaredModel, ModelRegistry};
use entity_cloner::domain::entities::{PivotData, Record};
use entity_cloner::infrastructure::events::BroadcastEventPublisher;
use entity_cloner::infrastructure::files::LocalFileDuplicator;
use entity_cloner::infrastructure::persistence::{
    MemoryEntityStore, RelationCatalog, RelationDefinition,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

pub type TestCloner = ClonerService<MemoryEntityStore, LocalFileDuplicator, BroadcastEventPublisher>;

pub const POST_ID: i64 = 1;
pub const COMMENT_ID: i64 = 9;
pub const TAG_IDS: [i64; 2] = [20, 21];
pub const USER_ID: i64 = 30;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
}

pub fn blog_catalog() -> RelationCatalog {
    RelationCatalog::new()
        .with("post", "comments", RelationDefinition::owned("comment", "post_id"))
        .with("post", "tags", RelationDefinition::link("tag"))
        .with("comment", "likes", RelationDefinition::link("user"))
}

pub fn tag_pivot() -> PivotData {
    let mut pivot = PivotData::new();
    pivot.insert("source".to_string(), json!("clone"));
    pivot
}

pub fn blog_registry() -> ModelRegistry {
    ModelRegistry::new()
        .with(DeclaredModel::new(
            "post",
            CloneDeclaration::new()
                .exempt(["slug"])
                .files(["cover"])
                .relation("comments")
                .relation_with_pivot("tags", tag_pivot()),
        ))
        .with(DeclaredModel::new(
            "comment",
            CloneDeclaration::new().relation("likes"),
        ))
}

/// Store with the default connection and an empty `archive` connection.
pub fn memory_store() -> Arc<MemoryEntityStore> {
    Arc::new(MemoryEntityStore::new(Arc::new(blog_catalog())).with_connection("archive"))
}

pub fn cloner(
    store: Arc<MemoryEntityStore>,
    storage_root: &Path,
    events: Arc<BroadcastEventPublisher>,
) -> TestCloner {
    ClonerService::new(
        store,
        Arc::new(LocalFileDuplicator::new(storage_root, "_copy")),
        events,
        Arc::new(blog_registry()),
    )
}

/// Seeds post #1 ("A", cover `img1.png`) with comment #9, two tags and one like.
pub async fn seed_blog(store: &MemoryEntityStore, storage_root: &Path) -> Record {
    std::fs::write(storage_root.join("img1.png"), b"cover-bytes").unwrap();

    let mut post = Record::new("post")
        .with("title", "A")
        .with("slug", "a")
        .with("cover", "img1.png");
    post.id = Some(POST_ID);
    post.created_at = Some(t0());
    post.updated_at = Some(t0());
    let post = store.seed(post).await.unwrap();

    let mut comment = Record::new("comment")
        .with("text", "hi")
        .with("post_id", POST_ID);
    comment.id = Some(COMMENT_ID);
    let comment = store.seed(comment).await.unwrap();

    for (id, name) in TAG_IDS.into_iter().zip(["rust", "news"]) {
        let mut tag = Record::new("tag").with("name", name);
        tag.id = Some(id);
        let tag = store.seed(tag).await.unwrap();
        store
            .seed_link(&post, "tags", &tag, PivotData::new())
            .await
            .unwrap();
    }

    let mut user = Record::new("user").with("name", "ann");
    user.id = Some(USER_ID);
    let user = store.seed(user).await.unwrap();
    store
        .seed_link(&comment, "likes", &user, PivotData::new())
        .await
        .unwrap();

    post
}
