//! Error types for the Quarry search front-end.

use std::time::Duration;

/// Boxed source error carried by operational variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the engine controller, its handles, and the index queue.
///
/// Variants fall into three groups:
/// - configuration and construction failures, fatal to initialization
/// - timeouts and contention, which callers may retry
/// - misuse (`IllegalState`), which indicates a programming defect
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing or unresolvable backend configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic
        message: String,
    },

    /// The backend could not be constructed.
    #[error("Backend initialization failed: {message}")]
    BackendInit {
        /// Human-readable error message
        message: String,
        /// Underlying failure if available
        #[source]
        source: Option<BoxError>,
    },

    /// A stale engine instance could not be stopped.
    #[error("Failed to shut down the running search engine after {attempts} attempts")]
    ShutdownFailed {
        /// Number of shutdown attempts made
        attempts: u32,
    },

    /// No engine was initialized within the wait bound.
    #[error("Search engine not initialized after {waited:?}")]
    NotInitialized {
        /// How long the caller waited
        waited: Duration,
    },

    /// The engine is paused, shutting down, or stopped.
    #[error("{message}")]
    EngineUnavailable {
        /// User-facing "try again" message
        message: String,
    },

    /// Another caller holds the locked search admin.
    #[error("Search admin is already locked by {owner}")]
    AdminLocked {
        /// Description of the current lock owner
        owner: String,
    },

    /// Misuse of the controller: double release, foreign handle, bad transition.
    #[error("Illegal state: {message}")]
    IllegalState {
        /// What went wrong
        message: String,
    },

    /// Backend failure while indexing.
    #[error("Index error: {message}")]
    Index {
        /// Human-readable error message
        message: String,
        /// Source error if available
        #[source]
        source: Option<BoxError>,
    },

    /// Backend failure while querying.
    #[error("Query error: {message}")]
    Query {
        /// Human-readable error message
        message: String,
        /// Source error if available
        #[source]
        source: Option<BoxError>,
    },

    /// Admin lookup for a content type that was never registered.
    #[error("Unknown content type: {content_type_id}")]
    UnknownContentType {
        /// Content type that was not found
        content_type_id: i64,
    },

    /// Call on a handle after it was closed.
    #[error("{handle} is closed")]
    Closed {
        /// Kind of handle
        handle: &'static str,
    },

    /// Index queue storage failure.
    #[error("Queue store error: {message}")]
    QueueStore {
        /// Human-readable error message
        message: String,
        /// Source error if available
        #[source]
        source: Option<BoxError>,
    },

    /// I/O error (snapshots, config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience `Result` type alias for Quarry operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns whether the caller may retry the operation later.
    ///
    /// Timeout and contention errors clear up on their own; configuration
    /// and misuse errors do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::NotInitialized { .. } => true,
            Error::EngineUnavailable { .. } => true,
            Error::AdminLocked { .. } => true,
            Error::QueueStore { .. } => true,
            Error::Io(_) => true,
            Error::Config { .. } => false,
            Error::BackendInit { .. } => false,
            Error::ShutdownFailed { .. } => false,
            Error::IllegalState { .. } => false,
            Error::Index { .. } => false,
            Error::Query { .. } => false,
            Error::UnknownContentType { .. } => false,
            Error::Closed { .. } => false,
            Error::Serialization(_) => false,
        }
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Creates a backend construction error with its underlying cause.
    pub fn backend_init<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<BoxError>,
    {
        Error::BackendInit {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates an unavailability error carrying a user-facing message.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Error::EngineUnavailable {
            message: message.into(),
        }
    }

    /// Creates a misuse error.
    pub fn illegal_state<S: Into<String>>(message: S) -> Self {
        Error::IllegalState {
            message: message.into(),
        }
    }

    /// Creates an indexing error.
    pub fn index<S: Into<String>>(message: S) -> Self {
        Error::Index {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an indexing error with a source error.
    pub fn index_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<BoxError>,
    {
        Error::Index {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a query error.
    pub fn query<S: Into<String>>(message: S) -> Self {
        Error::Query {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a queue store error with a source error.
    pub fn queue_store<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<BoxError>,
    {
        Error::QueueStore {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}
