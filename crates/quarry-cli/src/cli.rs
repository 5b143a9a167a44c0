//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Quarry - search engine controller and index queue administration
#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Engine configuration file (TOML)
    #[arg(short, long, env = "QUARRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for index snapshots and the event queue, unless the
    /// configuration names its own
    #[arg(long, env = "QUARRY_DATA_DIR", default_value = ".quarry")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the engine and print its status as JSON
    Status,

    /// Register a content type and the fields it indexes
    Define {
        /// Content type id
        content_type_id: i64,
        /// Content type name
        name: String,
        /// Searchable text fields
        #[arg(short, long = "field")]
        fields: Vec<String>,
        /// Treat-as-binary fields
        #[arg(short, long = "binary")]
        binary: Vec<String>,
    },

    /// Queue an index event
    Enqueue {
        /// Content type id
        #[arg(short = 't', long = "type")]
        content_type_id: i64,
        /// Content id
        #[arg(short, long = "id")]
        content_id: i32,
        /// Revision
        #[arg(short, long, default_value_t = 1)]
        revision: i32,
        /// Queue a delete instead of an update
        #[arg(long, conflicts_with = "fields")]
        delete: bool,
        /// Field value as NAME=VALUE
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },

    /// List pending index events
    Queue {
        /// Maximum number of events to show (0 = all)
        #[arg(short, long, default_value_t = 0)]
        limit: usize,
    },

    /// Remove pending index events
    Purge {
        /// Only events of this content id
        #[arg(long, conflicts_with = "content_type_id")]
        content_id: Option<i32>,
        /// Only events of this content type
        #[arg(short = 't', long = "type")]
        content_type_id: Option<i64>,
    },

    /// Apply pending index events
    Index {
        /// Events per batch (0 = all at once)
        #[arg(short, long, default_value_t = 100)]
        batch: usize,
    },

    /// Run a query and print matching rows as JSON
    Search {
        /// Query text
        text: String,
        /// Restrict to these content types
        #[arg(short = 't', long = "type")]
        content_types: Vec<i64>,
        /// Maximum number of rows
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

// ============================================================================
// Tests
// ============================================================================
