// Document stores - the async persistence seam plus id, version and patch helpers

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::document::{
    is_internal_field, Document, CREATED_AT_FIELD, ID_FIELD, MODIFIED_AT_FIELD, STORE_ID_FIELD,
    VERSION_FIELD,
};
use crate::error::Result;
use crate::query::Query;
use crate::registry::ModelType;
use serde_json::Value;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents of `model` matching `query`.
    async fn find(&self, model: &ModelType, query: &Query) -> Result<Vec<Document>>;

    /// The first document of `model` matching `query`.
    async fn find_one(&self, model: &ModelType, query: &Query) -> Result<Option<Document>> {
        Ok(self.find(model, query).await?.into_iter().next())
    }

    /// Merge `patch` into the document with the given id and return the
    /// updated document, or `None` if no such document exists.
    async fn find_by_id_and_update(
        &self,
        model: &ModelType,
        id: &Value,
        patch: Document,
    ) -> Result<Option<Document>>;

    /// Insert or replace a document. An id is assigned when the document has none.
    async fn save(&self, model: &ModelType, document: Document) -> Result<Document>;
}

#[async_trait::async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn find(&self, model: &ModelType, query: &Query) -> Result<Vec<Document>> {
        (**self).find(model, query).await
    }

    async fn find_one(&self, model: &ModelType, query: &Query) -> Result<Option<Document>> {
        (**self).find_one(model, query).await
    }

    async fn find_by_id_and_update(
        &self,
        model: &ModelType,
        id: &Value,
        patch: Document,
    ) -> Result<Option<Document>> {
        (**self).find_by_id_and_update(model, id, patch).await
    }

    async fn save(&self, model: &ModelType, document: Document) -> Result<Document> {
        (**self).save(model, document).await
    }
}

/// Move a caller-supplied `id` to `_id`, or assign a fresh one.
pub(crate) fn take_or_assign_id(model: &ModelType, doc: &mut Document) -> Value {
    let canonical = doc.remove(ID_FIELD).filter(|v| !v.is_null());
    let id = match doc.get(STORE_ID_FIELD).filter(|v| !v.is_null()) {
        Some(id) => id.clone(),
        None => canonical.unwrap_or_else(|| model.generate_id()),
    };
    doc.insert(STORE_ID_FIELD.to_string(), id.clone());
    id
}

/// Stamp bookkeeping for a write. `previous` is the stored version being replaced.
pub(crate) fn stamp_write(doc: &mut Document, previous: Option<&Document>) {
    let now = Value::String(chrono::Utc::now().to_rfc3339());
    let version = previous
        .and_then(|p| p.get(VERSION_FIELD))
        .and_then(Value::as_u64)
        .map(|v| v + 1)
        .unwrap_or(0);
    let created = previous
        .and_then(|p| p.get(CREATED_AT_FIELD))
        .cloned()
        .unwrap_or_else(|| now.clone());

    doc.insert(VERSION_FIELD.to_string(), Value::from(version));
    doc.insert(CREATED_AT_FIELD.to_string(), created);
    doc.insert(MODIFIED_AT_FIELD.to_string(), now);
}

/// Merge the fields of a partial update into an existing document. Only
/// present, non-null fields overwrite. A `null` in the patch leaves the stored
/// value untouched, so a partial update cannot clear a field. Identifier and
/// bookkeeping keys in the patch are ignored.
pub(crate) fn merge_patch(existing: &mut Document, patch: Document) {
    for (key, value) in patch {
        if key == ID_FIELD || is_internal_field(&key) || value.is_null() {
            continue;
        }
        existing.insert(key, value);
    }
}
