// src/error.rs

//! Error taxonomy shared by every module of the sync utility.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("Video not found for script: {}", .0.display())]
    VideoNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeouts, DNS and connection failures.
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bad status {status} from {url}")]
    Status { status: u16, url: String },

    /// Empty bodies, missing fields and other malformed responses.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Couldn't switch device to HSSP mode: {0}")]
    ModeNegotiation(String),

    #[error("Upload failed on all {0} cache endpoints")]
    UploadExhausted(usize),

    #[error("Player error: {0}")]
    Player(String),
}

impl HandyError {
    /// Transient failures that an idempotent request may retry.
    pub fn is_transient(&self) -> bool {
        match self {
            HandyError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            HandyError::Status { status, .. } => crate::handy::transport::RETRY_STATUSES.contains(status),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, HandyError>;
