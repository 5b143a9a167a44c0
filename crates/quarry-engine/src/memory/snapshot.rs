//! JSON persistence for the in-memory backend.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use quarry_core::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::index::Document;
use crate::content_type::ItemDefinition;

const DOCUMENTS_FILE: &str = "documents.json";
const DEFINITIONS_FILE: &str = "definitions.json";

/// Committed documents written on shutdown.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DocumentSnapshot {
    pub(crate) saved_at: DateTime<Utc>,
    pub(crate) documents: Vec<Document>,
}

/// Content-type definitions written by an admin save.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DefinitionSnapshot {
    pub(crate) saved_at: DateTime<Utc>,
    pub(crate) definitions: Vec<ItemDefinition>,
}

/// Snapshot files under one data directory.
#[derive(Debug, Clone)]
pub(crate) struct SnapshotDir {
    root: PathBuf,
}

impl SnapshotDir {
    pub(crate) fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub(crate) fn save_documents(&self, documents: Vec<Document>) -> Result<()> {
        let count = documents.len();
        write_json(
            &self.root.join(DOCUMENTS_FILE),
            &DocumentSnapshot {
                saved_at: Utc::now(),
                documents,
            },
        )?;
        log::info!("Saved {count} documents to {}", self.root.display());
        Ok(())
    }

    pub(crate) fn load_documents(&self) -> Result<Option<DocumentSnapshot>> {
        read_json(&self.root.join(DOCUMENTS_FILE))
    }

    pub(crate) fn save_definitions(&self, definitions: Vec<ItemDefinition>) -> Result<()> {
        write_json(
            &self.root.join(DEFINITIONS_FILE),
            &DefinitionSnapshot {
                saved_at: Utc::now(),
                definitions,
            },
        )
    }

    pub(crate) fn load_definitions(&self) -> Result<Option<DefinitionSnapshot>> {
        read_json(&self.root.join(DEFINITIONS_FILE))
    }
}

/// Writes through a temporary file so a crash never leaves a torn snapshot.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}
