//! Content-type indexing definitions and binary-field retrievers.
//!
//! A [`ContentTypeRegistry`] is shared by the engine, its backend, and every
//! [`SearchAdmin`](crate::SearchAdmin). Admin updates write to it; indexer
//! handles read it to filter submitted fields.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use quarry_core::{Error, FieldValue, Result, SearchKey};
use serde::{Deserialize, Serialize};

/// Indexing configuration for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name.
    pub name: String,
    /// Whether the field may be searched by users.
    #[serde(default = "default_true")]
    pub user_searchable: bool,
    /// Whether the field may be omitted on update to mean "unchanged".
    #[serde(default)]
    pub treat_as_binary: bool,
    /// Child table the field belongs to; `None` for parent fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_id: Option<i64>,
}

fn default_true() -> bool {
    true
}

impl FieldDefinition {
    /// A searchable parent text field.
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_searchable: true,
            treat_as_binary: false,
            child_id: None,
        }
    }

    /// A searchable treat-as-binary parent field.
    pub fn binary(name: impl Into<String>) -> Self {
        Self {
            treat_as_binary: true,
            ..Self::text(name)
        }
    }

    /// Moves the field to a child table.
    pub fn in_child(mut self, child_id: i64) -> Self {
        self.child_id = Some(child_id);
        self
    }

    /// Marks the field as not user searchable.
    pub fn hidden(mut self) -> Self {
        self.user_searchable = false;
        self
    }
}

/// Indexing configuration for one content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDefinition {
    /// Content type id.
    pub content_type_id: i64,
    /// Content type name.
    pub name: String,
    /// Indexed fields, parent and child.
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

impl ItemDefinition {
    /// Creates a definition with no fields.
    pub fn new(content_type_id: i64, name: impl Into<String>) -> Self {
        Self {
            content_type_id,
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a field.
    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Looks up the definition of `name` for the unit `key` addresses.
    ///
    /// Parent keys only see parent fields; child keys only see fields of
    /// their own child table.
    pub fn field_for(&self, key: &SearchKey, name: &str) -> Option<&FieldDefinition> {
        let child_id = key.child().map(|child| child.child_id);
        self.fields
            .iter()
            .find(|field| field.name == name && field.child_id == child_id)
    }

    /// Names of the treat-as-binary fields of the unit `key` addresses.
    pub fn binary_fields_for<'a>(&'a self, key: &SearchKey) -> impl Iterator<Item = &'a str> {
        let child_id = key.child().map(|child| child.child_id);
        self.fields
            .iter()
            .filter(move |field| field.treat_as_binary && field.child_id == child_id)
            .map(|field| field.name.as_str())
    }
}

/// Supplies stored values for treat-as-binary fields omitted on update.
pub trait FieldRetriever: Send + Sync {
    /// Current value of `field` for `key`, if any.
    fn retrieve(&self, key: &SearchKey, field: &str) -> Result<Option<FieldValue>>;
}

impl<F> FieldRetriever for F
where
    F: Fn(&SearchKey, &str) -> Result<Option<FieldValue>> + Send + Sync,
{
    fn retrieve(&self, key: &SearchKey, field: &str) -> Result<Option<FieldValue>> {
        self(key, field)
    }
}

struct Registration {
    definition: Arc<ItemDefinition>,
    retriever: Option<Arc<dyn FieldRetriever>>,
}

/// Content-type definitions and retrievers keyed by content type id.
#[derive(Default)]
pub struct ContentTypeRegistry {
    entries: RwLock<HashMap<i64, Registration>>,
}

impl ContentTypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a definition and its retriever.
    pub fn register(&self, definition: ItemDefinition, retriever: Option<Arc<dyn FieldRetriever>>) {
        let id = definition.content_type_id;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            id,
            Registration {
                definition: Arc::new(definition),
                retriever,
            },
        );
    }

    /// Definition for a content type.
    pub fn definition(&self, content_type_id: i64) -> Option<Arc<ItemDefinition>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&content_type_id)
            .map(|entry| Arc::clone(&entry.definition))
    }

    /// Retriever registered with a content type.
    ///
    /// Fails with `UnknownContentType` when the type was never registered or
    /// has been removed; a registered type without a retriever yields `None`.
    pub fn retriever(&self, content_type_id: i64) -> Result<Option<Arc<dyn FieldRetriever>>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&content_type_id)
            .map(|entry| entry.retriever.clone())
            .ok_or(Error::UnknownContentType { content_type_id })
    }

    /// Removes one content type, or all when `content_type_id` is `None`.
    /// Returns how many were removed.
    pub fn remove(&self, content_type_id: Option<i64>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match content_type_id {
            Some(id) => usize::from(entries.remove(&id).is_some()),
            None => {
                let removed = entries.len();
                entries.clear();
                removed
            }
        }
    }

    /// Registered content type ids, ascending.
    pub fn ids(&self) -> Vec<i64> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<i64> = entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns `true` if the content type is registered.
    pub fn contains(&self, content_type_id: i64) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(&content_type_id)
    }
}

impl fmt::Debug for ContentTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentTypeRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
