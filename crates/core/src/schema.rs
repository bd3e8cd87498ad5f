//! Collection schemas: field name → type, fixed when a collection is created.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::document::{FieldValue, Payload};
use crate::error::StoreError;

/// Field types understood by the store. Names follow Elasticsearch mapping types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Keyword,
    Text,
    Integer,
    Long,
    Float,
    Boolean,
}

impl FieldType {
    pub fn as_es_str(&self) -> &'static str {
        match self {
            FieldType::Keyword => "keyword",
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Long => "long",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
        }
    }

    pub fn from_es_str(s: &str) -> Option<Self> {
        match s {
            "keyword" => Some(FieldType::Keyword),
            "text" => Some(FieldType::Text),
            "integer" => Some(FieldType::Integer),
            "long" => Some(FieldType::Long),
            "float" | "double" => Some(FieldType::Float),
            "boolean" => Some(FieldType::Boolean),
            _ => None,
        }
    }

    /// Whether `value` can be stored in a field of this type.
    /// Null is accepted by every type.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (_, FieldValue::Null) => true,
            (FieldType::Keyword | FieldType::Text, FieldValue::Text(_)) => true,
            (FieldType::Integer, FieldValue::Integer(n)) => i32::try_from(*n).is_ok(),
            (FieldType::Long, FieldValue::Integer(_)) => true,
            (FieldType::Float, FieldValue::Float(_) | FieldValue::Integer(_)) => true,
            (FieldType::Boolean, FieldValue::Boolean(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_es_str())
    }
}

/// Field name → type mapping owned by a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: BTreeMap<String, FieldType>,
    /// Fields read from a mapping whose type this crate does not model
    /// (e.g. `date`), by ES type name. Values are passed through unchecked.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unmodelled: BTreeMap<String, String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field declaration.
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    pub fn get(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    /// Check that every field in `payload` is declared and type-compatible.
    /// Missing fields are allowed.
    pub fn validate(&self, collection: &str, id: &str, payload: &Payload) -> Result<(), StoreError> {
        for (name, value) in payload {
            let reason = match self.fields.get(name) {
                None if self.unmodelled.contains_key(name) => continue,
                None => format!("field '{name}' is not declared in the schema"),
                Some(ft) if !ft.accepts(value) => {
                    format!("field '{name}' expects {ft}, got {}", value.kind())
                }
                Some(_) => continue,
            };
            return Err(StoreError::SchemaViolation {
                collection: collection.to_string(),
                id: id.to_string(),
                reason,
            });
        }
        Ok(())
    }

    /// Fields of `required` that this schema lacks or declares with another type.
    /// Unmodelled fields of `required` only match an unmodelled field of the
    /// same ES type.
    pub fn incompatibilities(&self, required: &Schema) -> Vec<String> {
        let modelled = required
            .fields
            .iter()
            .filter_map(|(name, want)| match self.fields.get(name) {
                None => Some(format!("missing field '{name}'")),
                Some(have) if have != want => {
                    Some(format!("field '{name}' is {have}, expected {want}"))
                }
                Some(_) => None,
            });
        let unmodelled = required
            .unmodelled
            .iter()
            .filter_map(|(name, want)| match self.unmodelled.get(name) {
                Some(have) if have == want => None,
                _ => Some(format!("field '{name}' has unsupported type {want}")),
            });
        modelled.chain(unmodelled).collect()
    }

    /// True when every field of `required` is declared here with the same type.
    pub fn is_compatible_with(&self, required: &Schema) -> bool {
        self.incompatibilities(required).is_empty()
    }

    /// Render as an Elasticsearch `mappings` object.
    pub fn to_mapping(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, ft)| (name.clone(), json!({ "type": ft.as_es_str() })))
            .chain(
                self.unmodelled
                    .iter()
                    .map(|(name, t)| (name.clone(), json!({ "type": t }))),
            )
            .collect();
        json!({ "properties": properties })
    }

    /// Parse an Elasticsearch `mappings` object. Fields with types this crate
    /// does not model land in `unmodelled`; object fields without a type are
    /// skipped.
    pub fn from_mapping(mapping: &Value) -> Self {
        let mut schema = Schema::new();
        let Some(properties) = mapping.get("properties").and_then(Value::as_object) else {
            return schema;
        };
        for (name, def) in properties {
            match def.get("type").and_then(Value::as_str) {
                Some(t) => match FieldType::from_es_str(t) {
                    Some(ft) => {
                        schema.fields.insert(name.clone(), ft);
                    }
                    None => {
                        tracing::debug!(field = %name, es_type = t, "unmodelled field type");
                        schema.unmodelled.insert(name.clone(), t.to_string());
                    }
                },
                None => tracing::debug!(field = %name, "skipping object field without type"),
            }
        }
        schema
    }
}
