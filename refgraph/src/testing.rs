// Test fixtures - blog schema, seeded store, and store wrappers that count or fail lookups

use crate::document::Document;
use crate::error::{RefGraphError, Result};
use crate::query::Query;
use crate::registry::{ModelType, Registry};
use crate::schema::{parse_schema_str, SchemaDefinition};
use crate::store::{DocumentStore, MemoryStore};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const BLOG_SCHEMA: &str = r#"
settings:
  default_depth: 1

models:
  users:
    select: [name]
    fields:
      name: { type: string, required: true }
      email: { type: string }
      best_friend: { type: ref, target: users }
      team: { type: ref, target: teams }

  teams:
    select: [name]
    fields:
      name: { type: string, required: true }
      members: { type: list, items: { type: ref, target: users } }

  posts:
    select: [title, author.name]
    strict: true
    fields:
      title: { type: string, required: true }
      author: { type: ref, target: users }
      subject: { type: ref, target: [users, teams] }
      tags: { type: list, items: string }
      comments: { type: list, items: { type: ref, target: comments } }
      secret: { type: string }
      status: { type: string, enum: [draft, published], default: draft }

  comments:
    select: [text]
    fields:
      text: { type: string, required: true }
      author: { type: ref, target: users }

  tags:
    fields:
      label: { type: string }

  notes:
    select: [body]
    fields:
      body: { type: string }
      tag: { type: ref, target: tags }

  products:
    select: [name]
    fields:
      name: { type: string }
      meta: { type: object }
      parts: { type: list, items: object }
      maker: { type: ref, target: users }
      _rank: { type: number }

  audit:
    select: [event]
    readonly: true
    fields:
      event: { type: string }
"#;

pub fn blog_schema() -> SchemaDefinition {
    parse_schema_str(BLOG_SCHEMA).unwrap()
}

pub fn blog_registry() -> Registry {
    Registry::from_schema(blog_schema()).unwrap()
}

pub fn registry_with_max_depth(max_depth: u32) -> Registry {
    let mut schema = blog_schema();
    schema.settings.max_depth = Some(max_depth);
    Registry::from_schema(schema).unwrap()
}

fn docs(values: Vec<Value>) -> Vec<Document> {
    values
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect()
}

/// A memory store loaded with the blog fixture data.
pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .load(
            "users",
            docs(vec![
                json!({"id": "u1", "name": "Jane", "email": "jane@example.com", "best_friend": "u2", "team": "t1"}),
                json!({"id": "u2", "name": "Joe", "email": "joe@example.com", "best_friend": "u1"}),
            ]),
        )
        .unwrap();
    store
        .load(
            "teams",
            docs(vec![json!({"id": "t1", "name": "Core", "members": ["u2", "u1"]})]),
        )
        .unwrap();
    store
        .load(
            "posts",
            docs(vec![
                json!({
                    "id": 1,
                    "_v": 0,
                    "title": "Hello",
                    "author": "u1",
                    "subject": {"type": "teams", "id": "t1"},
                    "tags": ["a", "b"],
                    "comments": ["c1", "c2"],
                    "secret": "x",
                    "status": "published"
                }),
                json!({"id": 2, "title": "Second", "author": "u2", "subject": "u2", "comments": []}),
                json!({"id": 3, "title": "Third", "author": ["u1"], "comments": "c2"}),
            ]),
        )
        .unwrap();
    store
        .load(
            "comments",
            docs(vec![
                json!({"id": "c1", "text": "hi", "author": "u2"}),
                json!({"id": "c2", "text": "ok", "author": "u1"}),
            ]),
        )
        .unwrap();
    store
        .load("tags", docs(vec![json!({"id": "g1", "label": "L"})]))
        .unwrap();
    store
        .load("notes", docs(vec![json!({"id": "n1", "body": "note", "tag": "g1"})]))
        .unwrap();
    store
        .load(
            "products",
            docs(vec![json!({
                "id": "k1",
                "name": "Kettle",
                "meta": {"id": 7, "k": "v"},
                "parts": [{"id": "a", "qty": 2}],
                "maker": "u1",
                "_rank": 3
            })]),
        )
        .unwrap();
    store
}

/// Counts every store call before delegating.
pub struct CountingStore<S> {
    inner: S,
    calls: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        CountingStore {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl<S: DocumentStore> DocumentStore for CountingStore<S> {
    async fn find(&self, model: &ModelType, query: &Query) -> Result<Vec<Document>> {
        self.tick();
        self.inner.find(model, query).await
    }

    async fn find_by_id_and_update(
        &self,
        model: &ModelType,
        id: &Value,
        patch: Document,
    ) -> Result<Option<Document>> {
        self.tick();
        self.inner.find_by_id_and_update(model, id, patch).await
    }

    async fn save(&self, model: &ModelType, document: Document) -> Result<Document> {
        self.tick();
        self.inner.save(model, document).await
    }
}

/// Fails every lookup against one model.
pub struct FailingStore<S> {
    inner: S,
    model: String,
}

impl<S> FailingStore<S> {
    pub fn new(inner: S, model: &str) -> Self {
        FailingStore {
            inner,
            model: model.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl<S: DocumentStore> DocumentStore for FailingStore<S> {
    async fn find(&self, model: &ModelType, query: &Query) -> Result<Vec<Document>> {
        if model.name() == self.model {
            return Err(RefGraphError::Store(format!("{} is unavailable", self.model)));
        }
        self.inner.find(model, query).await
    }

    async fn find_by_id_and_update(
        &self,
        model: &ModelType,
        id: &Value,
        patch: Document,
    ) -> Result<Option<Document>> {
        self.inner.find_by_id_and_update(model, id, patch).await
    }

    async fn save(&self, model: &ModelType, document: Document) -> Result<Document> {
        self.inner.save(model, document).await
    }
}
