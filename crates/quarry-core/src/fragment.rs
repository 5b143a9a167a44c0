//! Field values submitted for one indexable unit.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use serde::{Deserialize, Serialize};

/// A single field value.
pub enum FieldValue {
    /// Plain text.
    Text(String),
    /// A counted byte sequence.
    Bytes(Vec<u8>),
    /// A byte stream read when the backend consumes the value.
    Stream(Box<dyn Read + Send>),
}

impl FieldValue {
    /// Returns the text if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns `true` for byte and stream values.
    pub fn is_binary(&self) -> bool {
        !matches!(self, Self::Text(_))
    }

    /// Materializes the value, draining a stream if necessary.
    pub fn into_stored(self) -> std::io::Result<StoredValue> {
        match self {
            Self::Text(text) => Ok(StoredValue::Text(text)),
            Self::Bytes(bytes) => Ok(StoredValue::Bytes(bytes)),
            Self::Stream(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(StoredValue::Bytes(bytes))
            }
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream(<reader>)"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// A materialized field value, as held by an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredValue {
    /// Plain text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl StoredValue {
    /// Returns the text if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Bytes(_) => None,
        }
    }
}

impl From<StoredValue> for FieldValue {
    fn from(value: StoredValue) -> Self {
        match value {
            StoredValue::Text(text) => Self::Text(text),
            StoredValue::Bytes(bytes) => Self::Bytes(bytes),
        }
    }
}

/// Field name to value mapping for one unit of content.
///
/// Treat-as-binary fields may be left out to mean "unchanged".
#[derive(Debug, Default)]
pub struct ItemFragment {
    fields: BTreeMap<String, FieldValue>,
}

impl ItemFragment {
    /// Creates an empty fragment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a text field (builder style).
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields
            .insert(name.into(), FieldValue::Text(value.into()));
        self
    }

    /// Adds a byte field (builder style).
    pub fn bytes(mut self, name: impl Into<String>, value: Vec<u8>) -> Self {
        self.fields.insert(name.into(), FieldValue::Bytes(value));
        self
    }

    /// Adds a deferred stream field (builder style).
    pub fn stream(mut self, name: impl Into<String>, reader: Box<dyn Read + Send>) -> Self {
        self.fields.insert(name.into(), FieldValue::Stream(reader));
        self
    }

    /// Sets or replaces a field.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(name.into(), value)
    }

    /// Gets a field value.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Returns `true` if the field is present.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Removes a field.
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    /// Keeps only the fields for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.fields.retain(|name, _| keep(name));
    }

    /// Field names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consumes the fragment, yielding its fields.
    pub fn into_fields(self) -> BTreeMap<String, FieldValue> {
        self.fields
    }
}

impl From<BTreeMap<String, String>> for ItemFragment {
    fn from(fields: BTreeMap<String, String>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, value)| (name, FieldValue::Text(value)))
                .collect(),
        }
    }
}
