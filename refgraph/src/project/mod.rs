// Projector - trims stored or expanded documents to the shape a selection asks for

use crate::document::{
    is_internal_field, is_typed_ref, resolved_id, Document, ID_FIELD, STORE_ID_FIELD,
};
use crate::registry::{ModelType, Registry};
use crate::selector::SelectionTree;
use serde_json::Value;

/// Populate `id` from the store identifier and drop store bookkeeping.
pub fn normalize(mut doc: Document) -> Document {
    let has_id = doc.get(ID_FIELD).map(|v| !v.is_null()).unwrap_or(false);
    if !has_id {
        if let Some(store_id) = doc.get(STORE_ID_FIELD).cloned() {
            doc.insert(ID_FIELD.to_string(), store_id);
        }
    }
    doc.retain(|key, _| !is_internal_field(key));
    doc
}

/// Projects documents of registered models. Only declared reference fields
/// selected without a sub-selection are collapsed to identifiers; embedded
/// values are kept as they are. Projection is idempotent.
pub struct Projector<'a> {
    registry: &'a Registry,
}

impl<'a> Projector<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Projector { registry }
    }

    pub fn project(
        &self,
        model: &ModelType,
        doc: Document,
        selection: &SelectionTree,
    ) -> Document {
        self.project_in(&[model], doc, selection)
    }

    pub fn project_all(
        &self,
        model: &ModelType,
        docs: Vec<Document>,
        selection: &SelectionTree,
    ) -> Vec<Document> {
        docs.into_iter()
            .map(|d| self.project(model, d, selection))
            .collect()
    }

    /// `models` are every model a document at this level may belong to: one
    /// for plain references, several below a polymorphic one, none inside
    /// embedded objects.
    fn project_in(
        &self,
        models: &[&ModelType],
        doc: Document,
        selection: &SelectionTree,
    ) -> Document {
        let mut doc = normalize(doc);
        if selection.is_wildcard() {
            return doc;
        }

        let mut out = Document::new();
        if let Some(id) = doc.remove(ID_FIELD) {
            out.insert(ID_FIELD.to_string(), id);
        }
        for field in selection.top_level_fields() {
            let value = match doc.remove(field.as_str()) {
                Some(value) => value,
                None => continue,
            };
            let targets = self.reference_targets(models, field);
            let value = match (selection.child(field), targets) {
                (Some(child), targets) => {
                    self.project_value(targets.as_deref().unwrap_or(&[]), value, child)
                }
                (None, Some(_)) => collapse(value),
                (None, None) => value,
            };
            out.insert(field.clone(), value);
        }
        out
    }

    /// Project a nested value. Unexpanded references, bare or typed, pass through.
    fn project_value(
        &self,
        models: &[&ModelType],
        value: Value,
        selection: &SelectionTree,
    ) -> Value {
        match value {
            value if is_typed_ref(&value) => value,
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.project_value(models, item, selection))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(self.project_in(models, map, selection)),
            other => other,
        }
    }

    /// Target models of `field` when it is a reference in any of `models`.
    fn reference_targets(
        &self,
        models: &[&ModelType],
        field: &str,
    ) -> Option<Vec<&'a ModelType>> {
        let mut found = false;
        let mut targets: Vec<&'a ModelType> = Vec::new();
        for model in models {
            if let Some(reference) = model.references().get(field) {
                found = true;
                for name in &reference.targets {
                    if let Ok(target) = self.registry.get(name) {
                        if !targets.iter().any(|t| t.name() == target.name()) {
                            targets.push(target);
                        }
                    }
                }
            }
        }
        found.then_some(targets)
    }
}

/// Reduce resolved reference objects to bare identifiers.
fn collapse(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(collapse_one).collect()),
        other => collapse_one(other),
    }
}

fn collapse_one(value: Value) -> Value {
    if is_typed_ref(&value) {
        return value;
    }
    match resolved_id(&value) {
        Some(id) => id,
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::FieldSelector;
    use crate::testing::blog_registry;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    fn tree(paths: &[&str]) -> SelectionTree {
        FieldSelector::parse(paths).unwrap().tree()
    }

    fn project_as(model: &str, d: Document, paths: &[&str]) -> Document {
        let registry = blog_registry();
        let model = registry.get(model).unwrap();
        Projector::new(&registry).project(model, d, &tree(paths))
    }

    #[test]
    fn test_normalize() {
        let d = normalize(doc(json!({"_id": 1, "_v": 4, "_created_at": "x", "title": "T"})));
        assert_eq!(d, doc(json!({"id": 1, "title": "T"})));

        let d = normalize(doc(json!({"_id": 1, "id": 9})));
        assert_eq!(d, doc(json!({"id": 9})));
    }

    #[test]
    fn test_underscore_user_fields_survive() {
        let d = doc(json!({"_id": 1, "_v": 0, "_modified_at": "x", "_rank": 3}));
        assert_eq!(normalize(d.clone()), doc(json!({"id": 1, "_rank": 3})));
        assert_eq!(
            project_as("products", d, &["_rank"]),
            doc(json!({"id": 1, "_rank": 3}))
        );
    }

    #[test]
    fn test_restricts_to_selected_fields() {
        let d = doc(json!({"_id": 1, "title": "T", "secret": "x", "tags": ["a", "b"]}));
        let out = project_as("posts", d, &["title", "tags", "missing"]);
        assert_eq!(out, doc(json!({"id": 1, "title": "T", "tags": ["a", "b"]})));
    }

    #[test]
    fn test_wildcard_keeps_everything_but_metadata() {
        let d = doc(json!({"_id": 1, "_v": 0, "title": "T", "author": {"id": "u1", "name": "J"}}));
        let out = project_as("posts", d, &["*"]);
        assert_eq!(
            out,
            doc(json!({"id": 1, "title": "T", "author": {"id": "u1", "name": "J"}}))
        );
    }

    #[test]
    fn test_sub_selected_fields_recurse() {
        let d = doc(json!({
            "_id": 1,
            "author": {"id": "u1", "name": "Jane", "email": "j@x"},
            "comments": [
                {"id": "c1", "text": "hi", "author": {"id": "u2", "name": "Joe"}},
                {"id": "c2", "text": "ok", "author": "u1"}
            ]
        }));
        let out = project_as("posts", d, &["author.name", "comments.text", "comments.author"]);
        assert_eq!(
            out,
            doc(json!({
                "id": 1,
                "author": {"id": "u1", "name": "Jane"},
                "comments": [
                    {"id": "c1", "text": "hi", "author": "u2"},
                    {"id": "c2", "text": "ok", "author": "u1"}
                ]
            }))
        );
    }

    #[test]
    fn test_unselected_sub_fields_collapse_to_ids() {
        let d = doc(json!({
            "_id": 1,
            "author": {"id": "u1", "name": "Jane"},
            "comments": [{"id": "c1", "text": "hi"}, {"_id": "c2"}],
            "subject": {"type": "teams", "id": "t1"}
        }));
        let out = project_as("posts", d, &["author", "comments", "subject"]);
        assert_eq!(
            out,
            doc(json!({
                "id": 1,
                "author": "u1",
                "comments": ["c1", "c2"],
                "subject": {"type": "teams", "id": "t1"}
            }))
        );
    }

    #[test]
    fn test_embedded_objects_with_ids_are_kept() {
        let d = doc(json!({
            "_id": 1,
            "meta": {"id": 7, "k": "v"},
            "parts": [{"id": "a", "qty": 2}],
            "maker": {"id": "u1", "name": "Jane"},
            "extra": {"id": 5}
        }));
        let out = project_as("products", d.clone(), &["meta", "parts", "maker", "extra"]);
        assert_eq!(
            out,
            doc(json!({
                "id": 1,
                "meta": {"id": 7, "k": "v"},
                "parts": [{"id": "a", "qty": 2}],
                "maker": "u1",
                "extra": {"id": 5}
            }))
        );

        let out = project_as("products", d, &["parts.qty", "maker.name"]);
        assert_eq!(
            out,
            doc(json!({
                "id": 1,
                "parts": [{"id": "a", "qty": 2}],
                "maker": {"id": "u1", "name": "Jane"}
            }))
        );
    }

    #[test]
    fn test_nested_collapse_uses_target_catalog() {
        // `best_friend` is a reference on users; `text` on comments is not.
        let d = doc(json!({
            "_id": 1,
            "author": {"id": "u1", "best_friend": {"id": "u2", "name": "Joe"}},
            "comments": [{"id": "c1", "text": {"id": "x", "body": "quoted"}}]
        }));
        let out = project_as("posts", d, &["author.best_friend", "comments.text"]);
        assert_eq!(
            out,
            doc(json!({
                "id": 1,
                "author": {"id": "u1", "best_friend": "u2"},
                "comments": [{"id": "c1", "text": {"id": "x", "body": "quoted"}}]
            }))
        );
    }

    #[test]
    fn test_polymorphic_sub_selection_sees_every_target() {
        let d = doc(json!({
            "_id": 1,
            "subject": {"id": "t1", "members": [{"id": "u1", "name": "Jane"}]}
        }));
        let out = project_as("posts", d, &["subject.members"]);
        assert_eq!(
            out,
            doc(json!({"id": 1, "subject": {"id": "t1", "members": ["u1"]}}))
        );
    }

    #[test]
    fn test_raw_references_pass_through_sub_selection() {
        let d = doc(json!({
            "_id": 1,
            "author": "u1",
            "comments": ["c1", "c2"],
            "subject": {"type": "teams", "id": "t1"}
        }));
        let out = project_as("posts", d, &["author.name", "comments.text", "subject.name"]);
        assert_eq!(
            out,
            doc(json!({
                "id": 1,
                "author": "u1",
                "comments": ["c1", "c2"],
                "subject": {"type": "teams", "id": "t1"}
            }))
        );
    }

    #[test]
    fn test_projection_is_idempotent() {
        let registry = blog_registry();
        let posts = registry.get("posts").unwrap();
        let projector = Projector::new(&registry);
        let selections = [
            tree(&["author.name", "comments", "title"]),
            tree(&["*"]),
            tree(&["comments.author.name", "comments.text"]),
        ];
        let d = doc(json!({
            "_id": 1,
            "_v": 2,
            "title": "T",
            "author": {"id": "u1", "name": "Jane", "email": "e"},
            "comments": [{"id": "c1", "text": "hi", "author": {"id": "u2", "name": "Joe"}}]
        }));
        for selection in &selections {
            let once = projector.project(posts, d.clone(), selection);
            let twice = projector.project(posts, once.clone(), selection);
            assert_eq!(once, twice);
        }
    }
}
