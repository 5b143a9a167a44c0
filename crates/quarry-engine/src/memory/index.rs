//! Committed documents and term matching.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use quarry_core::row::{
    COLUMN_CHILD_ID, COLUMN_CHILD_ROW_ID, COLUMN_CONTENT_ID, COLUMN_CONTENT_TYPE_ID,
    COLUMN_RELEVANCE, COLUMN_REVISION,
};
use quarry_core::{ChildLocator, ResultRow, SearchKey, StoredValue};
use serde::{Deserialize, Serialize};

use crate::query::{QueryRequest, QueryResults};

/// Identity of one unit regardless of revision.
pub(crate) type UnitId = (i64, i32, Option<ChildLocator>);

pub(crate) fn unit_id(key: &SearchKey) -> UnitId {
    (key.content_type_id(), key.content_id(), key.child())
}

/// One indexed unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Document {
    pub(crate) key: SearchKey,
    pub(crate) fields: BTreeMap<String, StoredValue>,
    pub(crate) indexed_at: DateTime<Utc>,
}

/// A change staged by an indexer session.
#[derive(Debug, Clone)]
pub(crate) enum StagedOp {
    Upsert {
        key: SearchKey,
        fields: BTreeMap<String, StoredValue>,
    },
    Delete {
        key: SearchKey,
    },
}

impl StagedOp {
    pub(crate) fn content_type_id(&self) -> i64 {
        match self {
            Self::Upsert { key, .. } | Self::Delete { key } => key.content_type_id(),
        }
    }
}

/// Committed, query-visible documents.
#[derive(Debug, Default)]
pub(crate) struct MemoryIndex {
    documents: BTreeMap<UnitId, Document>,
}

impl MemoryIndex {
    pub(crate) fn from_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        Self {
            documents: documents
                .into_iter()
                .map(|doc| (unit_id(&doc.key), doc))
                .collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.documents.len()
    }

    pub(crate) fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub(crate) fn content_type_ids(&self) -> BTreeSet<i64> {
        self.documents.keys().map(|(type_id, _, _)| *type_id).collect()
    }

    pub(crate) fn get(&self, key: &SearchKey) -> Option<&Document> {
        self.documents.get(&unit_id(key))
    }

    pub(crate) fn apply(&mut self, op: StagedOp) {
        match op {
            StagedOp::Upsert { key, fields } => {
                self.documents.insert(
                    unit_id(&key),
                    Document {
                        key,
                        fields,
                        indexed_at: Utc::now(),
                    },
                );
            }
            StagedOp::Delete { key } => {
                let removed = self.remove_unit(&key);
                if removed == 0 {
                    log::debug!("Skipping delete of unknown unit {key}");
                }
            }
        }
    }

    /// Removes a child row, or a parent together with all its child rows.
    fn remove_unit(&mut self, key: &SearchKey) -> usize {
        let before = self.documents.len();
        if key.is_parent() {
            self.documents.retain(|_, doc| !doc.key.same_item(key));
        } else {
            self.documents.remove(&unit_id(key));
        }
        before - self.documents.len()
    }

    pub(crate) fn clear_type(&mut self, content_type_id: i64) -> usize {
        let before = self.documents.len();
        self.documents
            .retain(|(type_id, _, _), _| *type_id != content_type_id);
        before - self.documents.len()
    }

    /// Keeps only the fields `keep` accepts in documents of one type.
    pub(crate) fn prune_fields(
        &mut self,
        content_type_id: i64,
        mut keep: impl FnMut(&SearchKey, &str) -> bool,
    ) -> usize {
        let mut pruned = 0;
        for doc in self
            .documents
            .values_mut()
            .filter(|doc| doc.key.content_type_id() == content_type_id)
        {
            let before = doc.fields.len();
            let key = doc.key.clone();
            doc.fields.retain(|name, _| keep(&key, name.as_str()));
            pruned += before - doc.fields.len();
        }
        pruned
    }

    pub(crate) fn search(&self, request: &QueryRequest) -> QueryResults {
        if request.is_empty() {
            return QueryResults::default();
        }
        let terms = tokenize(&request.text);
        let field_terms: Vec<(&str, Vec<String>)> = request
            .fields
            .iter()
            .map(|(name, value)| (name.as_str(), tokenize(value)))
            .collect();

        let mut ranked: Vec<(usize, &Document)> = self
            .documents
            .values()
            .filter(|doc| {
                request
                    .content_types
                    .as_ref()
                    .is_none_or(|types| types.contains(&doc.key.content_type_id()))
            })
            .filter(|doc| {
                field_terms.iter().all(|(name, wanted)| {
                    doc.fields
                        .get(*name)
                        .and_then(StoredValue::as_text)
                        .is_some_and(|text| count_all(&tokenize(text), wanted).is_some())
                })
            })
            .filter_map(|doc| score(doc, &terms).map(|score| (score, doc)))
            .collect();

        ranked.sort_by(|(a_score, a), (b_score, b)| {
            b_score.cmp(a_score).then_with(|| a.key.cmp(&b.key))
        });

        let rows = ranked
            .into_iter()
            .map(|(score, doc)| result_row(doc, score))
            .collect();
        QueryResults::from_ranked(rows, request.max_results)
    }
}

/// Lower-cased alphanumeric words.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Total occurrences of `wanted` terms in `words`, `None` unless every term
/// occurs at least once.
fn count_all(words: &[String], wanted: &[String]) -> Option<usize> {
    let mut total = 0;
    for term in wanted {
        let hits = words.iter().filter(|word| *word == term).count();
        if hits == 0 {
            return None;
        }
        total += hits;
    }
    Some(total)
}

/// Term-count relevance over all text fields; `None` when a term is missing.
fn score(doc: &Document, terms: &[String]) -> Option<usize> {
    if terms.is_empty() {
        return Some(1);
    }
    let words: Vec<String> = doc
        .fields
        .values()
        .filter_map(StoredValue::as_text)
        .flat_map(tokenize)
        .collect();
    count_all(&words, terms)
}

fn result_row(doc: &Document, score: usize) -> ResultRow {
    let mut row = ResultRow::new();
    row.set_value(COLUMN_CONTENT_TYPE_ID, doc.key.content_type_id().to_string());
    row.set_value(COLUMN_CONTENT_ID, doc.key.content_id().to_string());
    row.set_value(COLUMN_REVISION, doc.key.item().revision.to_string());
    if let Some(child) = doc.key.child() {
        row.set_value(COLUMN_CHILD_ID, child.child_id.to_string());
        row.set_value(COLUMN_CHILD_ROW_ID, child.row_id.to_string());
    }
    row.set_value(COLUMN_RELEVANCE, score.to_string());
    for (name, value) in &doc.fields {
        if let Some(text) = value.as_text() {
            row.set_value(name.clone(), text);
        }
    }
    row
}

// ============================================================================
// Tests
// ============================================================================
