// Vidshelf Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VidshelfError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Media record not found: {0}")]
    MediaNotFound(i64),

    #[error("Scan run not found: {0}")]
    ScanRunNotFound(i64),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("FFprobe error: {0}")]
    FFprobe(String),

    #[error("FFmpeg error: {0}")]
    FFmpeg(String),

    #[error("Transcoder timed out after {0}s")]
    TranscoderTimeout(u64),

    #[error("Hash error: {0}")]
    Hash(String),

    #[error("Invalid command: {0}")]
    Validation(String),

    #[error("Scan already in progress")]
    ScanInProgress,

    #[error("Watched directory does not exist: {0}")]
    WatchedRootMissing(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for VidshelfError {
    fn from(err: anyhow::Error) -> Self {
        VidshelfError::Other(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for VidshelfError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        VidshelfError::LockPoisoned(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VidshelfError>;
