use std::path::PathBuf;

/// All fatal errors surfaced by the core pipeline.
///
/// Per-criterion parse trouble is never an error: a criterion that cannot be
/// understood yields zero relations and the batch keeps going.
#[derive(Debug, thiserror::Error)]
pub enum EligError {
    /// Config file missing or malformed.
    #[error("config file {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// Variable/unit dictionary unreadable or malformed beyond the skip threshold.
    #[error("resource file {path}: {reason}")]
    Resource { path: PathBuf, reason: String },

    /// Input JSON malformed. Fatal for the batch.
    #[error("malformed ingest JSON: {0}")]
    Ingest(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EligError>;
