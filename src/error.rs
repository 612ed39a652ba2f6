//! Error types for the scoring pipeline.

use thiserror::Error;

use crate::types::RunStatus;

/// Result type alias using the pipeline error type.
pub type Result<T> = std::result::Result<T, ScoreError>;

/// Unified error type for the scoring pipeline.
///
/// Missing input data is never an error: metrics and pillar components
/// degrade to `None` and weights are renormalized over what remains. The
/// variants here cover the cases that must surface to a caller.
#[derive(Error, Debug)]
pub enum ScoreError {
    /// No pillar could be computed for an instrument. The instrument is
    /// unscoreable this run; the caller records it as failed and moves on.
    #[error("no pillars computable for instrument {asset_id}")]
    NoPillarsComputable { asset_id: String },

    /// A run ID that does not exist in the store.
    #[error("run not found: {0}")]
    RunNotFound(String),

    /// An operation that requires a `running` run hit a terminal one.
    #[error("run {run_id} is {status}, not running")]
    RunNotActive { run_id: String, status: RunStatus },

    /// The publish transaction failed. Production is unchanged and the run
    /// has been marked failed; the whole run must be retried.
    #[error("publish failed for run {run_id}: {message}")]
    Publish { run_id: String, message: String },

    /// Storage-level error from the underlying SQLite store.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// JSON serialization error for persisted payloads.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// A worker task died mid-batch. The run is marked failed.
    #[error("worker failure in run {run_id}: {message}")]
    Worker { run_id: String, message: String },
}

impl ScoreError {
    /// Whether this error is scoped to a single instrument (the run keeps
    /// going) rather than to the run as a whole.
    pub const fn is_instrument_level(&self) -> bool {
        matches!(self, Self::NoPillarsComputable { .. })
    }
}
