use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for Flowscope
#[derive(Error, Debug)]
pub enum FlowscopeError {
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

    /// Query rejected before any work was done
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Language model failed to produce a usable label
    #[error("Classification failed: {0}")]
    ClassificationFailure(String),

    /// Selected backend has no live connection
    #[error("Adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// A single strategy exceeded its deadline
    #[error("{strategy} timed out after {}ms", after.as_millis())]
    BackendTimeout { strategy: String, after: Duration },

    /// Backend returned an error
    #[error("{backend} error: {message}")]
    Backend { backend: String, message: String },

    /// Cache layer fault, always recovered as a miss
    #[error("Cache error: {0}")]
    Cache(String),

    /// Every strategy in the race failed
    #[error("All strategies failed: {}", reasons.join("; "))]
    AllStrategiesFailed { reasons: Vec<String> },

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

    /// HTTP transport errors from backend clients
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Error taxonomy exposed to the transport layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    ClassificationFailure,
    AdapterUnavailable,
    BackendTimeout,
    BackendError,
    CacheFailure,
    AllStrategiesFailed,
    Configuration,
}

impl FlowscopeError {
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Map this error onto the taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::ClassificationFailure(_) => ErrorKind::ClassificationFailure,
            Self::AdapterUnavailable(_) => ErrorKind::AdapterUnavailable,
            Self::BackendTimeout { .. } => ErrorKind::BackendTimeout,
            Self::Cache(_) => ErrorKind::CacheFailure,
            Self::AllStrategiesFailed { .. } => ErrorKind::AllStrategiesFailed,
            Self::Config(_)
            | Self::ConfigValidation { .. }
            | Self::ConfigNotFound { .. }
            | Self::InvalidConfigValue { .. } => ErrorKind::Configuration,
            Self::Http(e) if e.is_timeout() => ErrorKind::BackendTimeout,
            _ => ErrorKind::BackendError,
        }
    }

    /// Whether this error is surfaced to the caller as `success = false`
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidInput | ErrorKind::AllStrategiesFailed
        )
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

/// Result type for Flowscope operations
pub type Result<T> = std::result::Result<T, FlowscopeError>;
