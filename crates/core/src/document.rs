use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller-assigned document identifier, unique within a collection.
pub type DocId = String;

/// Document version. Starts at 1 for internally versioned writes.
pub type Version = u64;

/// Named document fields. Ordered so payloads render deterministically.
pub type Payload = BTreeMap<String, FieldValue>;

/// A stored document: identity, payload, and the version the store holds for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub version: Version,
    pub payload: Payload,
}

impl Document {
    pub fn new(id: impl Into<DocId>, version: Version, payload: Payload) -> Self {
        Self {
            id: id.into(),
            version,
            payload,
        }
    }

    /// Look up a single field.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.payload.get(name)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = serde_json::to_string(&self.payload).map_err(|_| fmt::Error)?;
        write!(f, "{{ id: {}, version: {}, payload: {} }}", self.id, self.version, body)
    }
}

/// Typed field values. Serialized as plain JSON scalars so payloads match
/// the `_source` of an Elasticsearch document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl FieldValue {
    /// Extract as string, returning None for non-text values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Short kind name used in schema violation messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Null => "null",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Float(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

/// Build a payload from `(name, value)` pairs.
pub fn payload<K, V, I>(fields: I) -> Payload
where
    K: Into<String>,
    V: Into<FieldValue>,
    I: IntoIterator<Item = (K, V)>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

// ── Versioning ────────────────────────────────────────────────

/// Who assigns document versions on a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionMode {
    /// The store bumps the version on every write.
    Internal,
    /// The caller supplies the version; lower-or-equal writes conflict.
    External,
}

impl VersionMode {
    /// Elasticsearch `version_type` value.
    pub fn as_es_str(&self) -> &'static str {
        match self {
            VersionMode::Internal => "internal",
            VersionMode::External => "external",
        }
    }
}

impl fmt::Display for VersionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_es_str())
    }
}

/// What a bulk copy does when a destination write loses the version check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// The conflicting write is rejected and reported as a failure.
    FailOnConflict,
    /// The conflicting write is skipped and only counted.
    ProceedOnConflict,
}

impl ConflictPolicy {
    /// Elasticsearch `conflicts` value for `_reindex`.
    pub fn as_es_str(&self) -> &'static str {
        match self {
            ConflictPolicy::FailOnConflict => "abort",
            ConflictPolicy::ProceedOnConflict => "proceed",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::FailOnConflict => f.write_str("fail-on-conflict"),
            ConflictPolicy::ProceedOnConflict => f.write_str("proceed-on-conflict"),
        }
    }
}
