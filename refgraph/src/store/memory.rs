use super::{merge_patch, stamp_write, take_or_assign_id, DocumentStore};
use crate::document::{document_id, Document, ID_FIELD, STORE_ID_FIELD};
use crate::error::{RefGraphError, Result};
use crate::query::Query;
use crate::registry::ModelType;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A process-local store keeping every model's documents in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    models: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Load documents as-is, bypassing validation and bookkeeping. A canonical
    /// `id` is moved to `_id`.
    pub fn load<I>(&self, model: &str, documents: I) -> Result<()>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut models = self.write()?;
        let docs = models.entry(model.to_string()).or_default();
        for mut doc in documents {
            if let Some(id) = doc.remove(ID_FIELD) {
                doc.entry(STORE_ID_FIELD.to_string()).or_insert(id);
            }
            docs.push(doc);
        }
        Ok(())
    }

    /// Number of documents stored for `model`.
    pub fn count(&self, model: &str) -> Result<usize> {
        Ok(self.read()?.get(model).map(Vec::len).unwrap_or(0))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Vec<Document>>>> {
        self.models
            .read()
            .map_err(|_| RefGraphError::Store("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Vec<Document>>>> {
        self.models
            .write()
            .map_err(|_| RefGraphError::Store("memory store lock poisoned".into()))
    }
}

fn position(docs: &[Document], id: &Value) -> Option<usize> {
    docs.iter().position(|d| document_id(d) == Some(id))
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, model: &ModelType, query: &Query) -> Result<Vec<Document>> {
        let models = self.read()?;
        let docs = match models.get(model.name()) {
            Some(docs) => docs,
            None => return Ok(Vec::new()),
        };
        Ok(docs.iter().filter(|d| query.matches(d)).cloned().collect())
    }

    async fn find_by_id_and_update(
        &self,
        model: &ModelType,
        id: &Value,
        patch: Document,
    ) -> Result<Option<Document>> {
        let mut models = self.write()?;
        let docs = match models.get_mut(model.name()) {
            Some(docs) => docs,
            None => return Ok(None),
        };
        let idx = match position(docs, id) {
            Some(idx) => idx,
            None => return Ok(None),
        };

        let previous = docs[idx].clone();
        let doc = &mut docs[idx];
        merge_patch(doc, patch);
        stamp_write(doc, Some(&previous));
        Ok(Some(doc.clone()))
    }

    async fn save(&self, model: &ModelType, mut document: Document) -> Result<Document> {
        let id = take_or_assign_id(model, &mut document);

        let mut models = self.write()?;
        let docs = models.entry(model.name().to_string()).or_default();
        match position(docs, &id) {
            Some(idx) => {
                stamp_write(&mut document, Some(&docs[idx]));
                docs[idx] = document.clone();
            }
            None => {
                stamp_write(&mut document, None);
                docs.push(document.clone());
            }
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::testing::blog_schema;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_finds() {
        let registry = Registry::from_schema(blog_schema()).unwrap();
        let users = registry.get("users").unwrap();
        let store = MemoryStore::new();

        let saved = store.save(users, doc(json!({"name": "Jane"}))).await.unwrap();
        let id = saved["_id"].clone();
        assert!(id.is_string());
        assert_eq!(saved["_v"], json!(0));

        let found = store.find_one(users, &Query::by_id(id)).await.unwrap().unwrap();
        assert_eq!(found["name"], json!("Jane"));
        assert_eq!(store.count("users").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_save_replaces_existing() {
        let registry = Registry::from_schema(blog_schema()).unwrap();
        let users = registry.get("users").unwrap();
        let store = MemoryStore::new();

        store.save(users, doc(json!({"id": "u1", "name": "Jane"}))).await.unwrap();
        let saved = store.save(users, doc(json!({"id": "u1", "name": "Janet"}))).await.unwrap();

        assert_eq!(saved["_v"], json!(1));
        assert_eq!(store.count("users").unwrap(), 1);
        let all = store.find(users, &Query::all()).await.unwrap();
        assert_eq!(all[0]["name"], json!("Janet"));
    }

    #[tokio::test]
    async fn test_find_returns_detached_values() {
        let registry = Registry::from_schema(blog_schema()).unwrap();
        let users = registry.get("users").unwrap();
        let store = MemoryStore::new();
        store.load("users", vec![doc(json!({"id": "u1", "name": "Jane"}))]).unwrap();

        let mut found = store.find(users, &Query::all()).await.unwrap();
        found[0].insert("name".into(), json!("Changed"));

        let again = store.find(users, &Query::by_id("u1")).await.unwrap();
        assert_eq!(again[0]["name"], json!("Jane"));
    }

    #[tokio::test]
    async fn test_find_by_id_and_update() {
        let registry = Registry::from_schema(blog_schema()).unwrap();
        let users = registry.get("users").unwrap();
        let store = MemoryStore::new();
        store.load("users", vec![doc(json!({"id": "u1", "name": "Jane", "_v": 0}))]).unwrap();

        let updated = store
            .find_by_id_and_update(users, &json!("u1"), doc(json!({"name": "Janet"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["name"], json!("Janet"));
        assert_eq!(updated["_v"], json!(1));

        let missing = store
            .find_by_id_and_update(users, &json!("nobody"), doc(json!({"name": "x"})))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_unknown_model_is_empty() {
        let registry = Registry::from_schema(blog_schema()).unwrap();
        let teams = registry.get("teams").unwrap();
        let store = MemoryStore::new();
        assert!(store.find(teams, &Query::all()).await.unwrap().is_empty());
    }
}
