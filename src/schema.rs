//! Declarative schema validation for prompt documents.
//!
//! Schemas are JSON Schema documents (draft 2020-12 unless they declare
//! `$schema`) and may be stored as YAML or JSON. They are compiled once with
//! the `jsonschema` crate, which also checks them against the meta-schema,
//! so every keyword a schema uses is enforced.
//!
//! Validation is a pure function of the document and the compiled schema.
//! It reports every violation it finds rather than stopping at the first.

use jsonschema::error::ValidationErrorKind;
use jsonschema::{ValidationError, Validator};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::SchemaError;

/// Kind of rule a document broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    MissingField,
    WrongType,
    UnknownField,
    NotInEnum,
    PatternMismatch,
    TooShort,
    OutOfRange,
    TooFewProperties,
    /// Any other keyword: `maxLength`, `const`, `anyOf`, `maxItems`, ...
    Constraint,
}

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    /// Dotted location of the offending value (`model_settings.top_k`,
    /// `tags[2]`). Empty for the document root.
    pub path: String,
    pub rule: Rule,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// A compiled schema document.
#[derive(Clone)]
pub struct Schema {
    document: Value,
    validator: Arc<Validator>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl Schema {
    /// Load a schema from a YAML or JSON file.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Value =
            serde_yaml_ng::from_str(&content).map_err(|e| SchemaError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Self::from_value(document)
    }

    /// Compile a schema from an already-parsed document.
    pub fn from_value(document: Value) -> Result<Self, SchemaError> {
        if !document.is_object() {
            return Err(SchemaError::Invalid {
                location: display_location(""),
                reason: format!(
                    "a schema must be a mapping, found {}",
                    json_type_name(&document)
                ),
            });
        }
        let validator = jsonschema::validator_for(&document).map_err(|e| SchemaError::Invalid {
            location: display_location(e.instance_path.as_str()),
            reason: e.to_string(),
        })?;
        Ok(Self {
            document,
            validator: Arc::new(validator),
        })
    }

    /// The built-in prompt schema.
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::from_value(builtin_document())
    }

    /// The raw schema document.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Validate a parsed document, collecting every violation.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> = self
            .validator
            .iter_errors(value)
            .flat_map(|error| violations_from(&error, value))
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Turn one engine error into violations. A `required` or
/// `additionalProperties` error is reported against the field it names, one
/// violation per field.
fn violations_from(error: &ValidationError<'_>, document: &Value) -> Vec<Violation> {
    let path = dotted_path(error.instance_path.as_str(), document);
    match &error.kind {
        ValidationErrorKind::Required { property } => vec![Violation {
            path: join(&path, property.as_str().unwrap_or_default()),
            rule: Rule::MissingField,
            message: "required field is missing".to_string(),
        }],
        ValidationErrorKind::AdditionalProperties { unexpected } => unexpected
            .iter()
            .map(|key| Violation {
                path: join(&path, key),
                rule: Rule::UnknownField,
                message: "field is not allowed by the schema".to_string(),
            })
            .collect(),
        kind => vec![Violation {
            path,
            rule: rule_for(kind),
            message: error.to_string(),
        }],
    }
}

fn rule_for(kind: &ValidationErrorKind) -> Rule {
    match kind {
        ValidationErrorKind::Type { .. } => Rule::WrongType,
        ValidationErrorKind::Enum { .. } => Rule::NotInEnum,
        ValidationErrorKind::Pattern { .. } => Rule::PatternMismatch,
        ValidationErrorKind::MinLength { .. } => Rule::TooShort,
        ValidationErrorKind::Minimum { .. }
        | ValidationErrorKind::Maximum { .. }
        | ValidationErrorKind::ExclusiveMinimum { .. }
        | ValidationErrorKind::ExclusiveMaximum { .. } => Rule::OutOfRange,
        ValidationErrorKind::MinProperties { .. } => Rule::TooFewProperties,
        _ => Rule::Constraint,
    }
}

/// Convert a JSON pointer into the document (`/tags/1`) into the dotted form
/// used in reports (`tags[1]`). The document decides whether a numeric
/// segment is a list index or a key.
fn dotted_path(pointer: &str, document: &Value) -> String {
    let mut path = String::new();
    let mut current = Some(document);
    for raw in pointer.split('/').skip(1) {
        let segment = raw.replace("~1", "/").replace("~0", "~");
        match current {
            Some(Value::Array(items)) => {
                current = segment.parse::<usize>().ok().and_then(|i| items.get(i));
                path.push_str(&format!("[{}]", segment));
            }
            Some(Value::Object(map)) => {
                current = map.get(&segment);
                path = join(&path, &segment);
            }
            _ => {
                current = None;
                path = join(&path, &segment);
            }
        }
    }
    path
}

/// Return a human-readable name for a JSON value's type.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn display_location(location: &str) -> String {
    if location.is_empty() {
        "<root>".to_string()
    } else {
        location.to_string()
    }
}

/// Identifier tokens double as file names.
pub const ID_PATTERN: &str = "^[A-Za-z0-9][A-Za-z0-9._-]*$";

fn builtin_document() -> Value {
    let text = json!({ "type": "string", "minLength": 1 });
    let optional_text = json!({ "type": ["string", "null"] });
    let optional_list = json!({ "type": ["array", "null"], "items": { "type": "string" } });

    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["title", "category", "prompt"],
        "properties": {
            "id": { "type": "string", "pattern": ID_PATTERN },
            "title": text,
            "description": optional_text,
            "category": text,
            "provider": optional_text,
            "model": optional_text,
            "model_settings": {
                "type": ["object", "null"],
                "additionalProperties": false,
                "minProperties": 1,
                "properties": {
                    "temperature": { "type": ["number", "null"], "minimum": 0.0, "maximum": 2.0 },
                    "top_k": { "type": ["integer", "null"], "minimum": 0 },
                    "top_p": { "type": ["number", "null"], "minimum": 0.0, "maximum": 1.0 },
                    "max_tokens": { "type": ["integer", "null"], "minimum": 1 },
                    "stream": { "type": ["boolean", "null"] },
                    "presence_penalty": { "type": ["number", "null"], "minimum": -2.0, "maximum": 2.0 },
                    "frequency_penalty": { "type": ["number", "null"], "minimum": -2.0, "maximum": 2.0 }
                }
            },
            "prompt": text,
            "references": optional_list,
            "associations": optional_list,
            "packs": optional_list,
            "tags": optional_list,
            "input_variables": optional_list
        }
    })
}
