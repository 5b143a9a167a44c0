//! Quarry CLI
//!
//! Command-line interface for the Quarry search engine controller: engine
//! status, content type definitions, the index event queue, and queries.

#![warn(clippy::all)]
#![forbid(unsafe_code)]

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use cli::{Args, Command};

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,quarry=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(args.config.as_deref(), &args.data_dir)?;
    tracing::debug!(data_dir = %args.data_dir.display(), "Configuration loaded");

    match args.command {
        Command::Status => commands::status(&config),
        Command::Define {
            content_type_id,
            name,
            fields,
            binary,
        } => commands::define(&config, content_type_id, &name, &fields, &binary),
        Command::Enqueue {
            content_type_id,
            content_id,
            revision,
            delete,
            fields,
        } => commands::enqueue(
            &config,
            commands::item_key(content_type_id, content_id, revision),
            delete,
            fields,
        ),
        Command::Queue { limit } => commands::queue(&config, limit),
        Command::Purge {
            content_id,
            content_type_id,
        } => commands::purge(&config, content_id, content_type_id),
        Command::Index { batch } => commands::index(&config, batch),
        Command::Search {
            text,
            content_types,
            limit,
        } => commands::search(&config, &text, content_types, limit),
    }
}
