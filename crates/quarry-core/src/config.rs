//! Engine configuration.
//!
//! Configuration is a flat property set with case-insensitive keys. The
//! reserved `classname` key names the backend; every other key is lower-cased
//! and handed to the backend untouched.
//!
//! # File format
//!
//! A TOML file whose top-level scalar values become properties:
//!
//! ```toml
//! className = "memory"
//! dataDir = "/var/lib/quarry"
//! queuePath = "/var/lib/quarry/events.redb"
//! drainWaitMs = 10000
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Reserved key naming the backend implementation.
pub const BACKEND_KEY: &str = "classname";

/// Case-insensitive property set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    properties: BTreeMap<String, String>,
}

impl EngineConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration naming the given backend.
    pub fn for_backend(name: impl Into<String>) -> Self {
        Self::new().with(BACKEND_KEY, name)
    }

    /// Builds a configuration from key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::new();
        for (key, value) in pairs {
            config.set(key.as_ref(), value);
        }
        config
    }

    /// Parses TOML text; nested tables and arrays are rejected.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(text)
            .map_err(|e| Error::config(format!("Invalid configuration: {e}")))?;

        let mut config = Self::new();
        for (key, value) in table {
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Datetime(d) => d.to_string(),
                toml::Value::Array(_) | toml::Value::Table(_) => {
                    return Err(Error::config(format!(
                        "Configuration key '{key}' must be a scalar value"
                    )));
                }
            };
            config.set(&key, value);
        }
        Ok(config)
    }

    /// Loads a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        log::debug!("Loaded engine configuration from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Sets a property (builder style).
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets a property.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.properties.insert(key.to_lowercase(), value.into());
    }

    /// Gets a property.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(&key.to_lowercase()).map(String::as_str)
    }

    /// Gets and parses a property; `None` when absent.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                Error::config(format!("Invalid value '{raw}' for '{key}': {e}"))
            }),
        }
    }

    /// Gets a millisecond duration, falling back to `default`.
    pub fn get_duration_ms(&self, key: &str, default: Duration) -> Result<Duration> {
        Ok(self
            .get_parsed::<u64>(key)?
            .map(Duration::from_millis)
            .unwrap_or(default))
    }

    /// Name of the configured backend.
    pub fn backend_name(&self) -> Result<&str> {
        match self.get(BACKEND_KEY).map(str::trim) {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(Error::config(format!(
                "No search engine backend configured (missing '{BACKEND_KEY}')"
            ))),
        }
    }

    /// Properties passed through to the backend (everything but the backend name).
    pub fn backend_properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .filter(|(key, _)| key.as_str() != BACKEND_KEY)
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}
