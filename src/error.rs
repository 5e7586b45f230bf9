//! Error types for the onboarding service.

use std::time::Duration;

/// Top-level error type, raised while assembling the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] ObjectStoreError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Record store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Object store errors.
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("Object not found: {location}")]
    NotFound { location: String },

    #[error("Invalid object location {location:?}: {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Registry lookup errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry {source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("Registry lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to load registry data: {0}")]
    Load(String),
}

/// Extraction step failures.
///
/// Low confidence is not an error; it is carried on `ExtractedIdentity`.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Uploaded document not found: {location}")]
    NotFound { location: String },

    #[error("Uploaded document is unreadable: {reason}")]
    UnreadableContent { reason: String },

    #[error("Object store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl ExtractionError {
    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Registration step failures. A duplicate is not an error.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<DatabaseError> for RegistrationError {
    fn from(e: DatabaseError) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

/// Caller input rejected before any step runs.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Unsupported country: {0:?} (expected DK, SE, NO or FI)")]
    UnsupportedCountry(String),

    #[error("Invalid session id: {0}")]
    InvalidSession(String),

    #[error("Missing object location")]
    MissingObjectLocation,

    #[error("Invalid object location: {0}")]
    InvalidObjectLocation(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
