//! Error types for callslicer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Stream errors
    #[error("Malformed stream record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupted data unit on {channel}: {detail}")]
    CorruptFrame { channel: String, detail: String },

    #[error("{held} released records are held behind an unreleased one (limit {limit})")]
    CheckpointBacklog { held: usize, limit: usize },

    // Audio errors
    #[error("Voice decode failed: {message}")]
    Decode { message: String },

    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),

    // Storage errors
    #[error("Blob storage error: {0}")]
    Storage(#[from] object_store::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl CallError {
    /// Whether this error must stop the whole consumer rather than a single call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CallError::CorruptFrame { .. } | CallError::CheckpointBacklog { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, CallError>;
