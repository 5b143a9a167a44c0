//! Query result rows.
//!
//! Rows are handed to result post-processing as-is; nothing in the engine
//! interprets their contents beyond the system columns a backend fills in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Content id column.
pub const COLUMN_CONTENT_ID: &str = "sys_contentid";
/// Revision column.
pub const COLUMN_REVISION: &str = "sys_revision";
/// Content type column.
pub const COLUMN_CONTENT_TYPE_ID: &str = "sys_contenttypeid";
/// Child definition column (child units only).
pub const COLUMN_CHILD_ID: &str = "sys_childid";
/// Child row column (child units only).
pub const COLUMN_CHILD_ROW_ID: &str = "sys_childrowid";
/// Relevance column.
pub const COLUMN_RELEVANCE: &str = "sys_relevancy";

/// Internal and display value of one column.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnValue {
    /// Value used by downstream processing.
    pub internal: String,
    /// Value shown to users.
    pub display: String,
}

/// One query result row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultRow {
    columns: BTreeMap<String, ColumnValue>,
}

impl ResultRow {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets both values of a column.
    pub fn set(
        &mut self,
        column: impl Into<String>,
        internal: impl Into<String>,
        display: impl Into<String>,
    ) {
        self.columns.insert(
            column.into(),
            ColumnValue {
                internal: internal.into(),
                display: display.into(),
            },
        );
    }

    /// Sets a column whose display value equals its internal value.
    pub fn set_value(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        self.set(column, value.clone(), value);
    }

    /// Sets only the internal value, keeping any display value.
    pub fn set_internal(&mut self, column: &str, internal: impl Into<String>) {
        self.columns.entry(column.to_string()).or_default().internal = internal.into();
    }

    /// Sets only the display value, keeping any internal value.
    pub fn set_display(&mut self, column: &str, display: impl Into<String>) {
        self.columns.entry(column.to_string()).or_default().display = display.into();
    }

    /// Internal value of a column.
    pub fn internal(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(|value| value.internal.as_str())
    }

    /// Display value of a column.
    pub fn display(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(|value| value.display.as_str())
    }

    /// Both values of a column.
    pub fn column(&self, column: &str) -> Option<&ColumnValue> {
        self.columns.get(column)
    }

    /// All column names.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
