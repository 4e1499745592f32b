//! Error types shared by every docsync component.

use thiserror::Error;

/// Result alias used across the core crate.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised while talking to Graph, the token endpoint or the document store.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing credentials, missing site configuration, invalid input.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The token endpoint answered with a non-success status.
    #[error("Authentication failed with status {status}: {body}")]
    Auth { status: u16, body: String },

    /// Graph answered with a non-success status (other than 404).
    #[error("Graph API error {status}: {message}")]
    GraphApi { status: u16, message: String },

    /// Graph answered 404 for the addressed resource.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Segment-by-segment path walk could not find a folder.
    #[error("Folder \"{segment}\" not found. Available: [{}]", available.join(", "))]
    SegmentNotFound {
        segment: String,
        available: Vec<String>,
    },

    /// A paged or delta response broke the link contract.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Persistence failure inside the document store.
    #[error("Store error: {0}")]
    Store(String),

    /// Payload exceeds what a single PUT upload accepts.
    #[error("File too large for simple upload: {size} bytes (limit {limit})")]
    UploadTooLarge { size: usize, limit: usize },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// True when the error is a plain 404 from Graph.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}
