use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level schema definition parsed from schema.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub types: HashMap<String, HashMap<String, FieldDefinition>>,
    #[serde(default)]
    pub models: HashMap<String, ModelDefinition>,
}

/// Engine-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Depth used when re-projecting the result of a save or update.
    #[serde(default = "default_depth")]
    pub default_depth: u32,
    /// Upper bound applied to every requested depth.
    #[serde(default)]
    pub max_depth: Option<u32>,
}

fn default_depth() -> u32 {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            default_depth: default_depth(),
            max_depth: None,
        }
    }
}

/// Definition of a single model type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default)]
    pub fields: HashMap<String, FieldDefinition>,
    /// Default field selector, used when a request passes none.
    #[serde(default)]
    pub select: Option<Vec<String>>,
    #[serde(default)]
    pub additional_properties: bool,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub id: Option<IdConfig>,
}

/// Configuration for document ID generation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdConfig {
    pub auto: Option<AutoIdStrategy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoIdStrategy {
    #[default]
    Ulid,
    Uuid,
    Nanoid,
}

/// Definition of a single field in a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub target: Option<RefTarget>,
    #[serde(default)]
    pub items: Option<ItemType>,
}

/// Field type enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Datetime,
    List,
    Object,
    Ref,
    #[serde(untagged)]
    Custom(std::string::String),
}

/// Reference target - single model or multiple (polymorphic)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefTarget {
    Single(String),
    Multiple(Vec<String>),
}

/// Item type for lists
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemType {
    Simple(String),
    Complex(Box<FieldDefinition>),
}

impl SchemaDefinition {
    pub fn get_custom_type(&self, name: &str) -> Option<&HashMap<String, FieldDefinition>> {
        self.types.get(name)
    }
}

impl RefTarget {
    /// All model names this reference may point at, in declaration order.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            RefTarget::Single(t) => vec![t.as_str()],
            RefTarget::Multiple(ts) => ts.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self, RefTarget::Multiple(ts) if ts.len() > 1)
    }
}

impl FieldDefinition {
    /// A plain field of the given type.
    pub fn of(field_type: FieldType) -> Self {
        FieldDefinition {
            field_type,
            required: false,
            enum_values: None,
            default: None,
            target: None,
            items: None,
        }
    }

    /// A single-valued reference to `target`.
    pub fn reference(target: RefTarget) -> Self {
        FieldDefinition {
            target: Some(target),
            ..Self::of(FieldType::Ref)
        }
    }

    /// A list of references to `target`.
    pub fn reference_list(target: RefTarget) -> Self {
        FieldDefinition {
            items: Some(ItemType::Complex(Box::new(Self::reference(target)))),
            ..Self::of(FieldType::List)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// The declaration of list items, if this is a list with typed items.
    pub fn item_definition(&self) -> Option<&FieldDefinition> {
        match &self.items {
            Some(ItemType::Complex(def)) => Some(def),
            _ => None,
        }
    }
}

impl From<&str> for RefTarget {
    fn from(target: &str) -> Self {
        RefTarget::Single(target.to_string())
    }
}

impl From<Vec<&str>> for RefTarget {
    fn from(targets: Vec<&str>) -> Self {
        RefTarget::Multiple(targets.into_iter().map(String::from).collect())
    }
}
