//! Query contract and the handle the engine issues for it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use quarry_core::{Error, Result, ResultRow};
use serde::{Deserialize, Serialize};

use crate::handles::HandleId;

/// A structured query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Full-text terms matched against all searchable fields.
    #[serde(default)]
    pub text: String,

    /// Per-field terms; every entry must match.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,

    /// Restrict results to these content types.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_types: Option<Vec<i64>>,

    /// Maximum rows to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

impl QueryRequest {
    /// Full-text query.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Adds a field constraint.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Restricts the content types searched.
    pub fn content_types(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.content_types = Some(ids.into_iter().collect());
        self
    }

    /// Caps the number of rows returned.
    pub fn limit(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Returns `true` if the request has neither text nor field terms.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.fields.values().all(|v| v.trim().is_empty())
    }
}

/// Ordered, possibly truncated result rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResults {
    /// Rows, most relevant first.
    pub rows: Vec<ResultRow>,
    /// Number of matches before truncation.
    pub total: usize,
    /// Whether rows were dropped to honour `max_results`.
    pub truncated: bool,
}

impl QueryResults {
    /// Builds results from ranked rows, applying an optional cap.
    pub fn from_ranked(mut rows: Vec<ResultRow>, max_results: Option<usize>) -> Self {
        let total = rows.len();
        let truncated = max_results.is_some_and(|max| total > max);
        if let Some(max) = max_results {
            rows.truncate(max);
        }
        Self {
            rows,
            total,
            truncated,
        }
    }
}

/// Backend query executor for one caller session.
pub trait SearchQuery: Send + Sync {
    /// Executes a query against committed index data.
    fn execute(&self, request: &QueryRequest) -> Result<QueryResults>;
}

pub(crate) struct QueryCore {
    pub(crate) id: HandleId,
    pub(crate) query: Arc<dyn SearchQuery>,
    closed: AtomicBool,
}

impl QueryCore {
    pub(crate) fn new(query: Arc<dyn SearchQuery>) -> Self {
        Self {
            id: HandleId::next(),
            query,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Query handle issued by [`SearchEngine`](crate::SearchEngine).
///
/// Must be returned with
/// [`release_search_query`](crate::SearchEngine::release_search_query)
/// exactly once.
pub struct QueryHandle {
    core: Arc<QueryCore>,
}

impl QueryHandle {
    pub(crate) fn new(core: Arc<QueryCore>) -> Self {
        Self { core }
    }

    /// Identifier of this handle.
    pub fn id(&self) -> HandleId {
        self.core.id
    }

    /// Returns `true` once released.
    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::SeqCst)
    }

    /// Executes a query.
    pub fn execute(&self, request: &QueryRequest) -> Result<QueryResults> {
        if self.is_closed() {
            return Err(Error::Closed {
                handle: "SearchQuery",
            });
        }
        self.core.query.execute(request)
    }
}

impl fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("id", &self.core.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
