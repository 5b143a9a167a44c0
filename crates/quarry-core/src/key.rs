//! Identifiers for indexable units.
//!
//! A content item is indexed as its parent fields plus one fragment per
//! complex-child row. [`SearchKey`] names exactly one of those units.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Revision sentinel meaning "no specific revision".
pub const UNSET_REVISION: i32 = -1;

/// Locator for a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemLocator {
    /// Content item id.
    pub content_id: i32,
    /// Revision, or [`UNSET_REVISION`].
    pub revision: i32,
}

impl ItemLocator {
    /// Creates a locator for a specific revision.
    pub fn new(content_id: i32, revision: i32) -> Self {
        Self {
            content_id,
            revision,
        }
    }

    /// Creates a locator with an unset revision.
    pub fn unversioned(content_id: i32) -> Self {
        Self::new(content_id, UNSET_REVISION)
    }

    /// Returns `true` if the revision is set.
    pub fn has_revision(&self) -> bool {
        self.revision != UNSET_REVISION
    }
}

/// Locator for one row of a complex child field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChildLocator {
    /// Id of the complex child definition.
    pub child_id: i64,
    /// Id of the child row.
    pub row_id: i64,
}

impl ChildLocator {
    /// Creates a child row locator.
    pub fn new(child_id: i64, row_id: i64) -> Self {
        Self { child_id, row_id }
    }
}

/// Composite identifier of one indexable unit.
///
/// Immutable after construction; equality is structural.
///
/// # Examples
///
/// ```
/// use quarry_core::{ChildLocator, ItemLocator, SearchKey};
///
/// let parent = SearchKey::new(311, ItemLocator::new(42, 3));
/// let row = parent.with_child(ChildLocator { child_id: 7, row_id: 1 });
///
/// assert!(parent.is_parent());
/// assert!(row.same_item(&parent));
/// assert_eq!(row.to_string(), "311:42-3/7:1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SearchKey {
    content_type_id: i64,
    item: ItemLocator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    child: Option<ChildLocator>,
}

impl SearchKey {
    /// Key for the parent unit of an item.
    pub fn new(content_type_id: i64, item: ItemLocator) -> Self {
        Self {
            content_type_id,
            item,
            child: None,
        }
    }

    /// Key for a child row of the same item.
    pub fn with_child(&self, child: ChildLocator) -> Self {
        Self {
            content_type_id: self.content_type_id,
            item: self.item,
            child: Some(child),
        }
    }

    /// Content type of the item.
    pub fn content_type_id(&self) -> i64 {
        self.content_type_id
    }

    /// Item locator.
    pub fn item(&self) -> ItemLocator {
        self.item
    }

    /// Content id shortcut.
    pub fn content_id(&self) -> i32 {
        self.item.content_id
    }

    /// Child row locator, if this key names a child unit.
    pub fn child(&self) -> Option<ChildLocator> {
        self.child
    }

    /// Returns `true` if this key names the parent unit.
    pub fn is_parent(&self) -> bool {
        self.child.is_none()
    }

    /// Returns `true` if both keys belong to the same content item,
    /// ignoring revision and child row.
    pub fn same_item(&self, other: &SearchKey) -> bool {
        self.content_type_id == other.content_type_id
            && self.item.content_id == other.item.content_id
    }
}

impl fmt::Display for SearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}",
            self.content_type_id, self.item.content_id, self.item.revision
        )?;
        if let Some(child) = self.child {
            write!(f, "/{}:{}", child.child_id, child.row_id)?;
        }
        Ok(())
    }
}
