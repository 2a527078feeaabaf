use crate::document::{is_internal_field, is_typed_ref, Document, ID_FIELD};
use crate::error::{RefGraphError, Result};
use crate::registry::{ModelType, Registry};
use crate::schema::{FieldDefinition, FieldType, ItemType, RefTarget, SchemaDefinition};
use crate::selector::FieldSelector;
use serde_json::Value;

/// Result of validating a document
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

// ── Schema validation ───────────────────────────────────────────────

/// Check a whole schema: field declarations, reference targets, custom
/// types and default selectors. Returns every problem found.
pub fn validate_schema(schema: &SchemaDefinition) -> Vec<String> {
    let mut errors = Vec::new();

    let mut names: Vec<&String> = schema.models.keys().collect();
    names.sort();

    for model_name in names {
        let model = &schema.models[model_name];

        let mut field_names: Vec<&String> = model.fields.keys().collect();
        field_names.sort();
        for field_name in field_names {
            let field_def = &model.fields[field_name];
            errors.extend(validate_field_definition(model_name, field_name, field_def));

            for target in reference_targets(field_def) {
                if !schema.models.contains_key(target) {
                    errors.push(format!(
                        "Field '{model_name}.{field_name}' references unknown target '{target}'"
                    ));
                }
            }

            let declared = field_def
                .item_definition()
                .map(|item| &item.field_type)
                .into_iter()
                .chain(std::iter::once(&field_def.field_type));
            for field_type in declared {
                if let FieldType::Custom(type_name) = field_type {
                    if schema.get_custom_type(type_name).is_none() {
                        errors.push(format!(
                            "Field '{model_name}.{field_name}' uses unknown type '{type_name}'"
                        ));
                    }
                }
            }
        }

        if let Some(select) = &model.select {
            if let Err(e) = FieldSelector::parse(select) {
                errors.push(format!("Model '{model_name}' default selector: {e}"));
            }
        }
    }

    errors
}

/// Check a single field declaration in isolation.
pub fn validate_field_definition(
    model: &str,
    field_name: &str,
    field_def: &FieldDefinition,
) -> Vec<String> {
    let mut errors = Vec::new();
    match field_def.field_type {
        FieldType::Ref => {
            if field_def.target.is_none() {
                errors.push(format!(
                    "Field '{model}.{field_name}' is a ref without a target"
                ));
            }
        }
        FieldType::List => {
            if let Some(item) = field_def.item_definition() {
                if item.field_type == FieldType::Ref && item.target.is_none() {
                    errors.push(format!(
                        "Field '{model}.{field_name}' is a list of refs without a target"
                    ));
                }
            }
            if let Some(ItemType::Simple(item)) = &field_def.items {
                if item == "ref" {
                    errors.push(format!(
                        "Field '{model}.{field_name}' lists refs without a target; use items: {{ type: ref, target: ... }}"
                    ));
                }
            }
        }
        _ => {}
    }
    if let Some(RefTarget::Multiple(targets)) = &field_def.target {
        if targets.is_empty() {
            errors.push(format!(
                "Field '{model}.{field_name}' has an empty target list"
            ));
        }
    }
    errors
}

fn reference_targets(field_def: &FieldDefinition) -> Vec<&str> {
    let ref_def = match field_def.field_type {
        FieldType::Ref => Some(field_def),
        FieldType::List => field_def
            .item_definition()
            .filter(|item| item.field_type == FieldType::Ref),
        _ => None,
    };
    ref_def
        .and_then(|def| def.target.as_ref())
        .map(RefTarget::targets)
        .unwrap_or_default()
}

// ── Document validation ─────────────────────────────────────────────

/// Validate a full document against its model's field declarations.
/// If strict mode is on, issues are errors; otherwise they are warnings.
pub fn validate_document(registry: &Registry, model: &ModelType, data: &Document) -> ValidationResult {
    check_document(registry, model, data, true)
}

/// Validate the fields present in a partial update. Required fields are not checked.
pub fn validate_patch(registry: &Registry, model: &ModelType, patch: &Document) -> ValidationResult {
    check_document(registry, model, patch, false)
}

fn check_document(
    registry: &Registry,
    model: &ModelType,
    data: &Document,
    check_required: bool,
) -> ValidationResult {
    let mut result = ValidationResult {
        errors: Vec::new(),
        warnings: Vec::new(),
    };
    let definition = model.definition();

    let mut field_names: Vec<&String> = definition.fields.keys().collect();
    field_names.sort();

    for field_name in field_names {
        let field_def = &definition.fields[field_name];
        let value = data.get(field_name.as_str());

        if check_required && field_def.required && value.map(Value::is_null).unwrap_or(true) {
            if field_def.default.is_none() {
                add_issue(
                    &mut result,
                    definition.strict,
                    format!("Required field '{field_name}' is missing"),
                );
            }
            continue;
        }

        if let Some(val) = value {
            if !val.is_null() {
                validate_field_value(registry, field_name, field_def, val, definition.strict, &mut result);
            }
        }
    }

    if !definition.additional_properties {
        let mut keys: Vec<&String> = data.keys().collect();
        keys.sort();
        for key in keys {
            if key == ID_FIELD || is_internal_field(key) {
                continue;
            }
            if !definition.fields.contains_key(key) {
                add_issue(
                    &mut result,
                    definition.strict,
                    format!("Unexpected field '{key}' (additional_properties is false)"),
                );
            }
        }
    }

    result
}

/// Apply declared default values to missing or null fields.
pub fn apply_defaults(model: &ModelType, data: &mut Document) {
    for (field_name, field_def) in model.fields() {
        let has_value = data
            .get(field_name)
            .map(|v| !v.is_null())
            .unwrap_or(false);

        if !has_value {
            if let Some(default) = &field_def.default {
                data.insert(field_name.clone(), default.clone());
            }
        }
    }
}

fn validate_field_value(
    registry: &Registry,
    field_name: &str,
    field_def: &FieldDefinition,
    value: &Value,
    strict: bool,
    result: &mut ValidationResult,
) {
    match &field_def.field_type {
        FieldType::String => {
            let s = match value.as_str() {
                Some(s) => s,
                None => {
                    add_issue(
                        result,
                        strict,
                        format!("Field '{field_name}' expected string, got {}", type_name(value)),
                    );
                    return;
                }
            };
            if let Some(enum_values) = &field_def.enum_values {
                if !enum_values.iter().any(|e| e == s) {
                    add_issue(
                        result,
                        strict,
                        format!(
                            "Field '{field_name}' value '{}' is not in enum: {:?}",
                            s, enum_values
                        ),
                    );
                }
            }
        }
        FieldType::Number => {
            if !value.is_number() {
                add_issue(
                    result,
                    strict,
                    format!("Field '{field_name}' expected number, got {}", type_name(value)),
                );
            }
        }
        FieldType::Boolean => {
            if !value.is_boolean() {
                add_issue(
                    result,
                    strict,
                    format!("Field '{field_name}' expected boolean, got {}", type_name(value)),
                );
            }
        }
        FieldType::Date | FieldType::Datetime => {
            if !value.is_string() {
                add_issue(
                    result,
                    strict,
                    format!("Field '{field_name}' expected date string, got {}", type_name(value)),
                );
            }
        }
        FieldType::List => {
            let items = match value.as_array() {
                Some(items) => items,
                None => {
                    add_issue(
                        result,
                        strict,
                        format!("Field '{field_name}' expected list, got {}", type_name(value)),
                    );
                    return;
                }
            };
            if let Some(item_def) = field_def.item_definition() {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_null() {
                        let item_name = format!("{field_name}[{i}]");
                        validate_field_value(registry, &item_name, item_def, item, strict, result);
                    }
                }
            }
        }
        FieldType::Object => {
            if !value.is_object() {
                add_issue(
                    result,
                    strict,
                    format!("Field '{field_name}' expected object, got {}", type_name(value)),
                );
            }
        }
        FieldType::Ref => match &field_def.target {
            Some(target) if target.is_polymorphic() => {
                let ok = match value {
                    Value::String(_) | Value::Number(_) => true,
                    Value::Object(map) if is_typed_ref(value) => map
                        .get("type")
                        .and_then(Value::as_str)
                        .map(|t| target.targets().contains(&t))
                        .unwrap_or(false),
                    _ => false,
                };
                if !ok {
                    add_issue(
                        result,
                        strict,
                        format!(
                            "Field '{field_name}' (polymorphic ref) expected ID or {{type, id}} with type in {:?}, got {}",
                            target.targets(),
                            type_name(value)
                        ),
                    );
                }
            }
            Some(_) => {
                if !value.is_string() && !value.is_number() {
                    add_issue(
                        result,
                        strict,
                        format!(
                            "Field '{field_name}' (ref) expected ID, got {}",
                            type_name(value)
                        ),
                    );
                }
            }
            None => {}
        },
        FieldType::Custom(type_name_str) => {
            if let Some(type_fields) = registry.custom_type(type_name_str) {
                if let Some(obj) = value.as_object() {
                    for (sub_field_name, sub_field_def) in type_fields {
                        let sub_val = obj.get(sub_field_name);
                        if sub_field_def.required && sub_val.map(Value::is_null).unwrap_or(true) {
                            add_issue(
                                result,
                                strict,
                                format!(
                                    "Field '{field_name}.{sub_field_name}' is required in type '{type_name_str}'"
                                ),
                            );
                        }
                    }
                } else {
                    add_issue(
                        result,
                        strict,
                        format!(
                            "Field '{field_name}' expected object (type '{type_name_str}'), got {}",
                            type_name(value)
                        ),
                    );
                }
            }
        }
    }
}

fn add_issue(result: &mut ValidationResult, strict: bool, message: String) {
    if strict {
        result.errors.push(message);
    } else {
        result.warnings.push(message);
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Apply defaults and validate a new document. Returns an error if strict validation fails.
pub fn validate_and_prepare(
    registry: &Registry,
    model: &ModelType,
    data: &mut Document,
) -> Result<Vec<String>> {
    apply_defaults(model, data);
    finish(model, validate_document(registry, model, data))
}

/// Validate a partial update. Returns an error if strict validation fails.
pub fn validate_patch_or_reject(
    registry: &Registry,
    model: &ModelType,
    patch: &Document,
) -> Result<Vec<String>> {
    finish(model, validate_patch(registry, model, patch))
}

fn finish(model: &ModelType, result: ValidationResult) -> Result<Vec<String>> {
    if !result.is_ok() {
        return Err(RefGraphError::Validation(format!(
            "Document validation failed:\n  - {}",
            result.errors.join("\n  - ")
        )));
    }
    for warning in &result.warnings {
        log::warn!("{}: {}", model.name(), warning);
    }
    Ok(result.warnings)
}
