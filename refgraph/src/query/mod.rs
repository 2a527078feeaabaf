// Document queries understood by every DocumentStore

use crate::document::{Document, ID_FIELD, STORE_ID_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A predicate over documents of one model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    /// Every document.
    #[default]
    All,
    /// Field equals value. Against a sequence field, any element may match.
    Eq(String, Value),
    /// Field equals one of the values.
    In(String, Vec<Value>),
    /// Every sub-query matches.
    And(Vec<Query>),
}

impl Query {
    pub fn all() -> Self {
        Query::All
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Eq(field.into(), value.into())
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Query::In(field.into(), values)
    }

    pub fn and(queries: Vec<Query>) -> Self {
        Query::And(queries)
    }

    pub fn by_id(id: impl Into<Value>) -> Self {
        Query::Eq(STORE_ID_FIELD.to_string(), id.into())
    }

    pub fn by_ids(ids: Vec<Value>) -> Self {
        Query::In(STORE_ID_FIELD.to_string(), ids)
    }

    /// The identifiers this query is restricted to, if it is a pure id lookup.
    pub fn id_constraint(&self) -> Option<Vec<&Value>> {
        match self {
            Query::Eq(field, value) if is_id_field(field) => Some(vec![value]),
            Query::In(field, values) if is_id_field(field) => Some(values.iter().collect()),
            _ => None,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Query::All => true,
            Query::Eq(field, expected) => match lookup(doc, field) {
                Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
                Some(actual) => actual == expected,
                None => expected.is_null(),
            },
            Query::In(field, expected) => match lookup(doc, field) {
                Some(Value::Array(items)) => items.iter().any(|i| expected.contains(i)),
                Some(actual) => expected.contains(actual),
                None => false,
            },
            Query::And(queries) => queries.iter().all(|q| q.matches(doc)),
        }
    }
}

fn is_id_field(field: &str) -> bool {
    field == ID_FIELD || field == STORE_ID_FIELD
}

/// Resolve a possibly dotted field path. `id` falls back to the store identifier.
fn lookup<'a>(doc: &'a Document, field: &str) -> Option<&'a Value> {
    if is_id_field(field) {
        return doc
            .get(STORE_ID_FIELD)
            .or_else(|| doc.get(ID_FIELD));
    }
    let mut segments = field.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
