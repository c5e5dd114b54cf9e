//! Error types for the deepscout core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the research collaborator, configuration, and persistence
//! surfaces.

use std::path::PathBuf;

/// Top-level error type for the deepscout core library.
#[derive(Debug, thiserror::Error)]
pub enum ScoutError {
    #[error("Research engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the external research collaborator.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed: environment variable '{var}' not set")]
    AuthFailed { var: String },

    #[error("Provider quota exhausted: {message}")]
    QuotaExhausted { message: String },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

impl EngineError {
    /// Whether the provider is telling us to stop spending quota.
    ///
    /// Quota exhaustion gets a distinct operator-facing diagnostic; its
    /// recoverability is the same as any other engine failure.
    pub fn is_quota(&self) -> bool {
        matches!(self, EngineError::QuotaExhausted { .. })
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `ScoutError`.
pub type Result<T> = std::result::Result<T, ScoutError>;
