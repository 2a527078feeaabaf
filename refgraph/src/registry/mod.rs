// Model registry - immutable model types with their reference catalogs

use crate::document::{ID_FIELD, STORE_ID_FIELD};
use crate::error::{RefGraphError, Result};
use crate::schema::{
    parse_schema, AutoIdStrategy, FieldDefinition, FieldType, ModelDefinition, SchemaDefinition,
    Settings,
};
use crate::selector::{FieldSelector, SelectionTree};
use crate::validation;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Many,
}

/// A field that links to documents of another (or the same) model type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDescriptor {
    pub field: String,
    /// Candidate target models, in declaration order. More than one means polymorphic.
    pub targets: Vec<String>,
    pub cardinality: Cardinality,
}

impl ReferenceDescriptor {
    pub fn is_polymorphic(&self) -> bool {
        self.targets.len() > 1
    }

    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }
}

/// Per-model table of reference fields, built once at registration.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalog {
    entries: Vec<ReferenceDescriptor>,
}

impl ReferenceCatalog {
    /// Classify declared fields. `ref` fields are single references, lists whose
    /// items are `ref` are many references. Identifier fields never count.
    pub fn from_fields(fields: &HashMap<String, FieldDefinition>) -> Self {
        let mut entries: Vec<ReferenceDescriptor> = fields
            .iter()
            .filter(|(name, _)| name.as_str() != ID_FIELD && name.as_str() != STORE_ID_FIELD)
            .filter_map(|(name, def)| {
                let (ref_def, cardinality) = match def.field_type {
                    FieldType::Ref => (def, Cardinality::Single),
                    FieldType::List => {
                        let item = def.item_definition()?;
                        if item.field_type != FieldType::Ref {
                            return None;
                        }
                        (item, Cardinality::Many)
                    }
                    _ => return None,
                };
                let targets = ref_def
                    .target
                    .as_ref()?
                    .targets()
                    .into_iter()
                    .map(String::from)
                    .collect();
                Some(ReferenceDescriptor {
                    field: name.clone(),
                    targets,
                    cardinality,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.field.cmp(&b.field));
        ReferenceCatalog { entries }
    }

    pub fn get(&self, field: &str) -> Option<&ReferenceDescriptor> {
        self.entries.iter().find(|e| e.field == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceDescriptor> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reference fields named at the top level of `selection`, in selection order.
    pub fn selected(&self, selection: &SelectionTree) -> Vec<&ReferenceDescriptor> {
        selection
            .top_level_fields()
            .iter()
            .filter_map(|field| self.get(field))
            .collect()
    }
}

/// A registered model: field declarations, reference catalog and default selector.
/// Read-only once registered.
#[derive(Debug, Clone)]
pub struct ModelType {
    name: String,
    definition: ModelDefinition,
    references: ReferenceCatalog,
    default_selector: Option<FieldSelector>,
    default_selection: Option<SelectionTree>,
}

impl ModelType {
    fn build(name: &str, definition: ModelDefinition) -> Result<Self> {
        let default_selector = match &definition.select {
            Some(paths) => {
                let selector = FieldSelector::parse(paths)?;
                if selector.is_empty() {
                    return Err(RefGraphError::Schema(format!(
                        "Model '{name}' declares an empty default selector"
                    )));
                }
                Some(selector)
            }
            None => None,
        };
        let default_selection = default_selector.as_ref().map(FieldSelector::tree);
        let references = ReferenceCatalog::from_fields(&definition.fields);

        Ok(ModelType {
            name: name.to_string(),
            definition,
            references,
            default_selector,
            default_selection,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &ModelDefinition {
        &self.definition
    }

    pub fn fields(&self) -> &HashMap<String, FieldDefinition> {
        &self.definition.fields
    }

    pub fn references(&self) -> &ReferenceCatalog {
        &self.references
    }

    pub fn default_selector(&self) -> Option<&FieldSelector> {
        self.default_selector.as_ref()
    }

    pub fn default_selection(&self) -> Option<&SelectionTree> {
        self.default_selection.as_ref()
    }

    pub fn is_readonly(&self) -> bool {
        self.definition.readonly
    }

    pub fn id_strategy(&self) -> AutoIdStrategy {
        self.definition
            .id
            .as_ref()
            .and_then(|c| c.auto)
            .unwrap_or_default()
    }

    /// A fresh identifier for a document created in this model.
    pub fn generate_id(&self) -> Value {
        let id = match self.id_strategy() {
            AutoIdStrategy::Ulid => ulid::Ulid::new().to_string().to_lowercase(),
            AutoIdStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
            AutoIdStrategy::Nanoid => nanoid::nanoid!(),
        };
        Value::String(id)
    }
}

/// All registered model types plus engine settings.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    settings: Settings,
    types: HashMap<String, HashMap<String, FieldDefinition>>,
    models: HashMap<String, ModelType>,
}

impl Registry {
    pub fn new(settings: Settings) -> Self {
        Registry {
            settings,
            types: HashMap::new(),
            models: HashMap::new(),
        }
    }

    /// Load and register every model in a schema.yaml file.
    pub fn open(path: &Path) -> Result<Self> {
        let schema = parse_schema(path)?;
        Self::from_schema(schema)
    }

    /// Register every model in a parsed schema. The schema is validated as a
    /// whole first, so targets may reference models declared later.
    pub fn from_schema(schema: SchemaDefinition) -> Result<Self> {
        let errors = validation::validate_schema(&schema);
        if !errors.is_empty() {
            return Err(RefGraphError::Schema(format!(
                "Schema validation failed:\n  - {}",
                errors.join("\n  - ")
            )));
        }

        let mut registry = Registry::new(schema.settings);
        registry.types = schema.types;

        let mut names: Vec<&String> = schema.models.keys().collect();
        names.sort();
        for name in names {
            registry.register_definition(name, schema.models[name].clone())?;
        }

        log::debug!("Registered {} model types", registry.models.len());
        Ok(registry)
    }

    /// Register a model from field declarations and an optional default selector.
    pub fn register(
        &mut self,
        name: &str,
        fields: HashMap<String, FieldDefinition>,
        default_selector: Option<FieldSelector>,
    ) -> Result<&ModelType> {
        let definition = ModelDefinition {
            fields,
            select: default_selector.map(|s| s.paths().to_vec()),
            ..ModelDefinition::default()
        };
        self.register_definition(name, definition)
    }

    /// Register a model from a full definition.
    pub fn register_definition(
        &mut self,
        name: &str,
        definition: ModelDefinition,
    ) -> Result<&ModelType> {
        if self.models.contains_key(name) {
            return Err(RefGraphError::Schema(format!(
                "Model '{name}' is already registered"
            )));
        }
        for (field_name, field_def) in &definition.fields {
            let issues = validation::validate_field_definition(name, field_name, field_def);
            if !issues.is_empty() {
                return Err(RefGraphError::Schema(issues.join("; ")));
            }
        }

        let model = ModelType::build(name, definition)?;
        log::trace!(
            "Registered model '{}' with {} reference field(s)",
            name,
            model.references.len()
        );
        self.models.insert(name.to_string(), model);
        Ok(&self.models[name])
    }

    pub fn get(&self, name: &str) -> Result<&ModelType> {
        self.models
            .get(name)
            .ok_or_else(|| RefGraphError::UnknownModel(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn custom_type(&self, name: &str) -> Option<&HashMap<String, FieldDefinition>> {
        self.types.get(name)
    }

    pub fn model_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Apply the configured depth ceiling.
    pub fn clamp_depth(&self, depth: u32) -> u32 {
        match self.settings.max_depth {
            Some(max) if depth > max => {
                log::debug!("Requested depth {depth} clamped to {max}");
                max
            }
            _ => depth,
        }
    }
}
