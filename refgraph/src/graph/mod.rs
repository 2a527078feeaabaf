use crate::document::{document_id, Document};
use crate::error::{RefGraphError, Result};
use crate::expand::Expander;
use crate::query::Query;
use crate::registry::{ModelType, Registry};
use crate::selector::FieldSelector;
use crate::store::DocumentStore;
use crate::validation;
use serde_json::Value;
use std::path::Path;

/// The main entry point: a model registry bound to a document store.
/// Hands out per-model handles for reads and writes that return projected
/// documents.
pub struct RefGraph<S> {
    registry: Registry,
    store: S,
}

impl<S: DocumentStore> RefGraph<S> {
    pub fn new(registry: Registry, store: S) -> Self {
        RefGraph { registry, store }
    }

    /// Load the model schema at `schema_path` and bind it to `store`.
    pub fn open(schema_path: &Path, store: S) -> Result<Self> {
        let registry = Registry::open(schema_path)?;
        log::debug!(
            "Opened {} with {} model(s)",
            schema_path.display(),
            registry.model_names().len()
        );
        Ok(Self::new(registry, store))
    }

    /// Get a handle to a registered model.
    pub fn model(&self, name: &str) -> Result<Model<'_, S>> {
        Ok(Model {
            graph: self,
            model: self.registry.get(name)?,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn expander(&self) -> Expander<'_, S> {
        Expander::new(&self.registry, &self.store)
    }
}

/// A handle to one model within a graph.
pub struct Model<'a, S> {
    graph: &'a RefGraph<S>,
    model: &'a ModelType,
}

impl<'a, S: DocumentStore> Model<'a, S> {
    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn model_type(&self) -> &ModelType {
        self.model
    }

    /// Documents matching `query`, projected through `selector` with
    /// references expanded up to `depth`. `None` when nothing matched.
    pub async fn find(
        &self,
        query: &Query,
        depth: u32,
        selector: &FieldSelector,
    ) -> Result<Option<Vec<Document>>> {
        let docs = self
            .graph
            .expander()
            .expand(self.model, query, selector, depth)
            .await?;
        Ok(non_empty(docs))
    }

    pub async fn find_one(
        &self,
        query: &Query,
        depth: u32,
        selector: &FieldSelector,
    ) -> Result<Option<Document>> {
        Ok(self
            .find(query, depth, selector)
            .await?
            .and_then(|docs| docs.into_iter().next()))
    }

    /// Include-fields read: the expansion depth follows the deepest path in
    /// `include`.
    pub async fn find_with_fields(
        &self,
        query: &Query,
        include: &FieldSelector,
    ) -> Result<Option<Vec<Document>>> {
        let docs = self
            .graph
            .expander()
            .expand_with_fields(self.model, query, include)
            .await?;
        Ok(non_empty(docs))
    }

    /// Validate and persist a document, then read it back through `selector`
    /// at the configured default depth.
    pub async fn save(&self, mut document: Document, selector: &FieldSelector) -> Result<Document> {
        let depth = self.write_depth();
        self.check_writable()?;
        self.graph
            .expander()
            .preflight(self.model, Some(&selector.tree()), depth)?;
        validation::validate_and_prepare(self.graph.registry(), self.model, &mut document)?;

        let saved = self.graph.store.save(self.model, document).await?;
        let id = document_id(&saved).cloned().ok_or_else(|| {
            RefGraphError::Store(format!("{}: saved document has no id", self.name()))
        })?;
        log::debug!("{}: saved {}", self.name(), id);

        self.reload(&id, selector, depth)
            .await?
            .ok_or_else(|| RefGraphError::NotFound {
                model: self.name().to_string(),
                id: id_text(&id),
            })
    }

    /// Merge `patch` into the document with the given id and read it back
    /// through `selector`. `None` if no such document exists. Fields set to
    /// `null` in the patch are skipped and keep their stored value.
    pub async fn update_by_id(
        &self,
        id: impl Into<Value>,
        patch: Document,
        selector: &FieldSelector,
    ) -> Result<Option<Document>> {
        let id = id.into();
        let depth = self.write_depth();
        self.check_writable()?;
        self.graph
            .expander()
            .preflight(self.model, Some(&selector.tree()), depth)?;
        validation::validate_patch_or_reject(self.graph.registry(), self.model, &patch)?;

        let updated = self
            .graph
            .store
            .find_by_id_and_update(self.model, &id, patch)
            .await?;
        if updated.is_none() {
            log::debug!("{}: update of missing {}", self.name(), id);
            return Ok(None);
        }
        self.reload(&id, selector, depth).await
    }

    async fn reload(
        &self,
        id: &Value,
        selector: &FieldSelector,
        depth: u32,
    ) -> Result<Option<Document>> {
        let docs = self
            .graph
            .expander()
            .expand(self.model, &Query::by_id(id.clone()), selector, depth)
            .await?;
        Ok(docs.into_iter().next())
    }

    fn write_depth(&self) -> u32 {
        let registry = self.graph.registry();
        registry.clamp_depth(registry.settings().default_depth)
    }

    fn check_writable(&self) -> Result<()> {
        if self.model.is_readonly() {
            return Err(RefGraphError::ReadOnly(self.name().to_string()));
        }
        Ok(())
    }
}

fn non_empty(docs: Vec<Document>) -> Option<Vec<Document>> {
    if docs.is_empty() {
        None
    } else {
        Some(docs)
    }
}

fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
