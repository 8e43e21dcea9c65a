use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Trilane
#[derive(Error, Debug)]
pub enum TrilaneError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// An embedding provider could not be initialized
    #[error("Embedding model unavailable ({model}): {reason}")]
    ModelUnavailable { model: String, reason: String },

    /// An embedding provider failed on a given input, or returned nothing
    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    /// The storage engine is unreachable or returned an infrastructure error
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Empty or malformed query input
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Existing collection does not match the expected schema
    #[error("Schema conflict on collection '{collection}': {details}")]
    SchemaConflict { collection: String, details: String },

    /// Collection was loaded without late-interaction vectors
    #[error("Multivector space '{space}' was not populated at load time; rerank is unavailable")]
    MultivectorUnavailable { space: String },

    /// Malformed document identifier during indexing
    #[error("Cannot parse document id '{key}': {reason}")]
    Parse { key: String, reason: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrilaneError {
    /// HTTP status code the service facade reports for this error
    pub fn status_code(&self) -> u16 {
        match self {
            TrilaneError::InvalidQuery(_) => 400,
            TrilaneError::ModelUnavailable { .. }
            | TrilaneError::EmbeddingFailed(_)
            | TrilaneError::MultivectorUnavailable { .. } => 503,
            _ => 500,
        }
    }

    /// Whether the error was caused by the client rather than the service
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Trilane operations
pub type Result<T> = std::result::Result<T, TrilaneError>;
