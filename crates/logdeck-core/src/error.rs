//! Error types for LogDeck

use std::io;
use std::path::{Path, PathBuf};

/// LogDeck error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Log source not found: {0}")]
    SourceNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Stream reset on {source_id}: file rotated or truncated")]
    StreamReset { source_id: String },

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Result type alias for LogDeck
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }

    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        Error::BadRequest(msg.into())
    }

    pub fn stream_reset<S: Into<String>>(source_id: S) -> Self {
        Error::StreamReset {
            source_id: source_id.into(),
        }
    }

    /// Map an I/O error on `path` to the not-found / permission taxonomy
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.display().to_string()),
            _ => Error::IoError(err),
        }
    }

    /// True for errors caused by the caller rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::BadRequest(_)
                | Error::InvalidCursor(_)
                | Error::SourceNotFound(_)
                | Error::FileNotFound(_)
                | Error::PermissionDenied(_)
        )
    }
}
