// Document values and the identifier conventions shared by stores and the projector

use serde_json::Value;

/// A document body: field name to JSON value.
pub type Document = serde_json::Map<String, Value>;

/// Canonical identifier field on every projected document.
pub const ID_FIELD: &str = "id";
/// Identifier field as persisted by a store.
pub const STORE_ID_FIELD: &str = "_id";
/// Write counter maintained by stores.
pub const VERSION_FIELD: &str = "_v";
pub const CREATED_AT_FIELD: &str = "_created_at";
pub const MODIFIED_AT_FIELD: &str = "_modified_at";

const INTERNAL_FIELDS: [&str; 4] = [
    STORE_ID_FIELD,
    VERSION_FIELD,
    CREATED_AT_FIELD,
    MODIFIED_AT_FIELD,
];

/// Store bookkeeping fields never leave the engine. Other underscore-prefixed
/// names are ordinary user fields.
pub fn is_internal_field(name: &str) -> bool {
    INTERNAL_FIELDS.contains(&name)
}

/// The identifier of a raw or projected document.
pub fn document_id(doc: &Document) -> Option<&Value> {
    doc.get(STORE_ID_FIELD)
        .filter(|v| !v.is_null())
        .or_else(|| doc.get(ID_FIELD).filter(|v| !v.is_null()))
}

/// Stable text form of an identifier, usable as a map key or SQL column value.
pub fn id_key(id: &Value) -> String {
    id.to_string()
}

/// One stored reference: a bare id, or a `{type, id}` pair naming its model.
#[derive(Debug, Clone, PartialEq)]
pub enum RefValue {
    Id(Value),
    Typed { model: String, id: Value },
}

impl RefValue {
    /// Interpret a stored value as a reference. Nulls and expanded documents
    /// are not references.
    pub fn parse(value: &Value) -> Option<RefValue> {
        match value {
            Value::String(_) | Value::Number(_) => Some(RefValue::Id(value.clone())),
            Value::Object(map) if is_typed_ref(value) => {
                let model = map.get("type")?.as_str()?.to_string();
                let id = map.get(ID_FIELD)?.clone();
                Some(RefValue::Typed { model, id })
            }
            _ => None,
        }
    }

    pub fn id(&self) -> &Value {
        match self {
            RefValue::Id(id) | RefValue::Typed { id, .. } => id,
        }
    }
}

/// True for a polymorphic reference in identifier form: exactly `type` and `id`.
pub fn is_typed_ref(value: &Value) -> bool {
    match value.as_object() {
        Some(map) => {
            map.len() == 2
                && map.get("type").map(Value::is_string).unwrap_or(false)
                && map
                    .get(ID_FIELD)
                    .map(|id| id.is_string() || id.is_number())
                    .unwrap_or(false)
        }
        None => false,
    }
}

/// The identifier carried by a resolved (expanded) reference object.
pub fn resolved_id(value: &Value) -> Option<Value> {
    let map = value.as_object()?;
    map.get(ID_FIELD)
        .or_else(|| map.get(STORE_ID_FIELD))
        .filter(|v| !v.is_null())
        .cloned()
}
