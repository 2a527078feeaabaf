// Expansion engine - depth-bounded reference resolution, one concurrent fan-out per level

use crate::document::{document_id, id_key, Document, RefValue};
use crate::error::{RefGraphError, Result};
use crate::project::Projector;
use crate::query::Query;
use crate::registry::{Cardinality, ModelType, ReferenceDescriptor, Registry};
use crate::selector::{FieldSelector, SelectionTree};
use crate::store::DocumentStore;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashMap;

/// Runs expansion requests against a registry and a store.
pub struct Expander<'a, S: DocumentStore + ?Sized> {
    registry: &'a Registry,
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> Expander<'a, S> {
    pub fn new(registry: &'a Registry, store: &'a S) -> Self {
        Expander { registry, store }
    }

    /// Fetch documents of `model` matching `query`, trimmed to `selector`,
    /// with selected references resolved up to `depth` hops. An empty
    /// selector falls back to the model's default.
    pub async fn expand(
        &self,
        model: &ModelType,
        query: &Query,
        selector: &FieldSelector,
        depth: u32,
    ) -> Result<Vec<Document>> {
        let selection = selector.tree();
        let depth = self.registry.clamp_depth(depth);
        self.expand_tree(model, query.clone(), Some(&selection), depth)
            .await
    }

    /// Include-fields mode: expand as deep as the deepest path in `include`
    /// requires, then re-trim the whole tree against `include` from the root.
    pub async fn expand_with_fields(
        &self,
        model: &ModelType,
        query: &Query,
        include: &FieldSelector,
    ) -> Result<Vec<Document>> {
        let requested = include.tree();
        let selection = self.effective_selection(model, Some(&requested))?;
        let depth = self.registry.clamp_depth(selection.hops());
        log::debug!(
            "{}: include-fields expansion to depth {}",
            model.name(),
            depth
        );

        let docs = self
            .expand_tree(model, query.clone(), Some(selection), depth)
            .await?;
        Ok(Projector::new(self.registry).project_all(model, docs, selection))
    }

    /// The selection a request on `model` runs with: the given one when it is
    /// non-empty, otherwise the model default.
    pub fn effective_selection<'s>(
        &self,
        model: &'s ModelType,
        selection: Option<&'s SelectionTree>,
    ) -> Result<&'s SelectionTree> {
        selection
            .filter(|s| !s.is_empty())
            .or_else(|| model.default_selection())
            .ok_or_else(|| RefGraphError::MissingFilter {
                model: model.name().to_string(),
            })
    }

    /// Everything an expansion of `model` needs from the registry, checked
    /// without touching the store. Writes run this before persisting so a
    /// request that cannot be projected never reaches the store.
    pub fn preflight<'s>(
        &self,
        model: &'s ModelType,
        selection: Option<&'s SelectionTree>,
        depth: u32,
    ) -> Result<&'s SelectionTree> {
        let selection = self.effective_selection(model, selection)?;
        if depth > 0 {
            let references = model.references().selected(selection);
            self.check_child_filters(selection, &references)?;
        }
        Ok(selection)
    }

    fn expand_tree<'t>(
        &'t self,
        model: &'t ModelType,
        query: Query,
        selection: Option<&'t SelectionTree>,
        depth: u32,
    ) -> BoxFuture<'t, Result<Vec<Document>>> {
        async move {
            let selection = self.preflight(model, selection, depth)?;
            let references = model.references().selected(selection);
            let expanding = depth > 0 && !references.is_empty();

            let raw = self.store.find(model, &query).await?;
            if raw.is_empty() {
                return Ok(Vec::new());
            }
            log::trace!(
                "{}: {} document(s) at depth {}",
                model.name(),
                raw.len(),
                depth
            );

            let mut docs = Projector::new(self.registry).project_all(model, raw, selection);
            // A wildcard keeps every reference field, so all of them are shaped.
            let shaped: Vec<&ReferenceDescriptor> = if selection.is_wildcard() {
                model.references().iter().collect()
            } else {
                references.clone()
            };
            for doc in docs.iter_mut() {
                for reference in &shaped {
                    normalize_cardinality(doc, reference);
                }
            }
            if !expanding {
                return Ok(docs);
            }

            let mut pending = Vec::new();
            for (idx, doc) in docs.iter().enumerate() {
                for reference in references.iter().copied() {
                    let raw = match doc.get(&reference.field) {
                        Some(Value::Null) | None => continue,
                        Some(Value::Array(items)) if items.is_empty() => continue,
                        Some(value) => value.clone(),
                    };
                    let child = selection.child(&reference.field);
                    pending.push(async move {
                        let value = self.resolve(reference, raw, child, depth - 1).await?;
                        Ok::<_, RefGraphError>((idx, reference.field.as_str(), value))
                    });
                }
            }

            for (idx, field, value) in try_join_all(pending).await? {
                docs[idx].insert(field.to_string(), value);
            }
            Ok(docs)
        }
        .boxed()
    }

    /// Every target expanded through its default selector must have one. This
    /// runs before the level's store access.
    fn check_child_filters(
        &self,
        selection: &SelectionTree,
        references: &[&ReferenceDescriptor],
    ) -> Result<()> {
        for reference in references {
            let explicit = selection.child(&reference.field).is_some();
            for target in &reference.targets {
                let target = self.registry.get(target)?;
                if !explicit && target.default_selection().is_none() {
                    return Err(RefGraphError::MissingFilter {
                        model: target.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Resolve one stored reference value (single or sequence) into projected
    /// documents, preserving the stored order.
    async fn resolve(
        &self,
        reference: &ReferenceDescriptor,
        raw: Value,
        selection: Option<&SelectionTree>,
        depth: u32,
    ) -> Result<Value> {
        let elements = match raw {
            Value::Array(items) => items,
            other => vec![other],
        };
        let refs: Vec<RefValue> = elements.iter().filter_map(RefValue::parse).collect();

        let mut lookups: Vec<(&ModelType, Vec<Value>)> = Vec::new();
        for target in &reference.targets {
            let model = self.registry.get(target)?;
            let mut seen = Vec::new();
            let mut ids = Vec::new();
            for r in &refs {
                let wanted = match r {
                    RefValue::Id(_) => true,
                    RefValue::Typed { model, .. } => model == target,
                };
                let key = id_key(r.id());
                if wanted && !seen.contains(&key) {
                    seen.push(key);
                    ids.push(r.id().clone());
                }
            }
            if !ids.is_empty() {
                lookups.push((model, ids));
            }
        }

        let fetched = try_join_all(lookups.into_iter().map(|(model, ids)| async move {
            let docs = self
                .expand_tree(model, Query::by_ids(ids), selection, depth)
                .await?;
            Ok::<_, RefGraphError>((model.name(), docs))
        }))
        .await?;

        let mut found: HashMap<(&str, String), Document> = HashMap::new();
        for (model_name, docs) in fetched {
            for doc in docs {
                if let Some(id) = document_id(&doc) {
                    found.insert((model_name, id_key(id)), doc);
                }
            }
        }

        let resolved: Vec<Value> = refs
            .iter()
            .filter_map(|r| {
                let key = id_key(r.id());
                let doc = match r {
                    RefValue::Typed { model, .. } => found.get(&(model.as_str(), key)),
                    RefValue::Id(_) => reference
                        .targets
                        .iter()
                        .find_map(|t| found.get(&(t.as_str(), key.clone()))),
                };
                doc.cloned().map(Value::Object)
            })
            .collect();

        if resolved.len() < refs.len() {
            log::debug!(
                "'{}': {} of {} reference(s) did not resolve",
                reference.field,
                refs.len() - resolved.len(),
                refs.len()
            );
        }

        Ok(match reference.cardinality {
            Cardinality::Many => Value::Array(resolved),
            Cardinality::Single => resolved.into_iter().next().unwrap_or(Value::Null),
        })
    }
}

/// Many references always surface as a sequence, single references never do.
fn normalize_cardinality(doc: &mut Document, reference: &ReferenceDescriptor) {
    let current = doc.remove(&reference.field);
    let value = match (reference.cardinality, current) {
        (Cardinality::Many, None) | (Cardinality::Many, Some(Value::Null)) => {
            Value::Array(Vec::new())
        }
        (Cardinality::Many, Some(Value::Array(items))) => Value::Array(items),
        (Cardinality::Many, Some(other)) => Value::Array(vec![other]),
        (Cardinality::Single, Some(Value::Array(items))) => {
            items.into_iter().next().unwrap_or(Value::Null)
        }
        (Cardinality::Single, Some(other)) => other,
        (Cardinality::Single, None) => return,
    };
    doc.insert(reference.field.clone(), value);
}
