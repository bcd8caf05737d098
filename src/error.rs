use std::path::PathBuf;

use thiserror::Error;

use crate::ml::LearnerKind;

/// Errors reported by the training engine.
///
/// Usage errors (`AlreadyRunning`, `NotRunning`, `NotFound`, ...) are surfaced to
/// the host as `{ok: false, error}` replies and never abort the process.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("training already running")]
    AlreadyRunning,
    #[error("not running")]
    NotRunning,
    #[error("previous training loop has not exited yet")]
    LoopStillActive,
    #[error("training loop exited without returning its trainer")]
    TrainerLost,
    #[error("operation unavailable while training is running")]
    TrainingActive,
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("model record error: {0}")]
    Record(#[from] burn::record::RecorderError),
    #[error("checkpoint encoding failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("checkpoint decoding failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("checkpoint incompatible with live policy: {0}")]
    IncompatibleModel(Mismatch),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),
}

/// Details of a checkpoint that does not fit the running learner.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Mismatch {
    #[error("learner kind {found:?} (expected {expected:?})")]
    Kind {
        expected: LearnerKind,
        found: LearnerKind,
    },
    #[error("observation length {found} (expected {expected})")]
    ObservationLen { expected: usize, found: usize },
    #[error("hidden size {found} (expected {expected})")]
    Hidden { expected: usize, found: usize },
}
