//! Error types for session registry operations.

/// Error type for session registry operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Session is not live in the registry (strict lookups only).
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A live session already uses this id.
    #[error("Session already exists: {0}")]
    DuplicateSession(String),

    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadConfig {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    ParseConfig(#[from] toml::de::Error),

    /// Config parsed but holds an unusable value.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for session registry operations.
pub type Result<T> = std::result::Result<T, Error>;
