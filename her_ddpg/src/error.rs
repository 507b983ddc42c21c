//! Error types shared across the training pipeline.

use std::fmt;
use std::io;

use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;

/// Errors that abort a training run.
#[derive(Debug)]
pub enum TrainingError {
    /// Configuration was missing keys or had invalid values.
    Config(ConfigError),
    /// A batch was requested from a buffer holding fewer transitions.
    InsufficientData { requested: usize, available: usize },
    /// A rollout worker panicked or returned an error.
    WorkerFailure { worker_id: usize, reason: String },
    /// An episode violated the states/actions/rewards length invariant.
    MalformedEpisode(String),
    /// Checkpoint save or load failed.
    Checkpoint(CheckpointError),
    /// Filesystem error writing run artifacts.
    Io(io::Error),
    /// Serialization of weights or logs failed.
    Serialization(String),
}

impl fmt::Display for TrainingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingError::Config(e) => write!(f, "configuration error: {}", e),
            TrainingError::InsufficientData { requested, available } => write!(
                f,
                "requested batch of {} but buffer holds {} transitions",
                requested, available
            ),
            TrainingError::WorkerFailure { worker_id, reason } => {
                write!(f, "rollout worker {} failed: {}", worker_id, reason)
            }
            TrainingError::MalformedEpisode(msg) => write!(f, "malformed episode: {}", msg),
            TrainingError::Checkpoint(e) => write!(f, "checkpoint error: {}", e),
            TrainingError::Io(e) => write!(f, "IO error: {}", e),
            TrainingError::Serialization(msg) => write!(f, "serialization error: {}", msg),
        }
    }
}

impl std::error::Error for TrainingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrainingError::Config(e) => Some(e),
            TrainingError::Checkpoint(e) => Some(e),
            TrainingError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for TrainingError {
    fn from(e: ConfigError) -> Self {
        TrainingError::Config(e)
    }
}

impl From<CheckpointError> for TrainingError {
    fn from(e: CheckpointError) -> Self {
        TrainingError::Checkpoint(e)
    }
}

impl From<io::Error> for TrainingError {
    fn from(e: io::Error) -> Self {
        TrainingError::Io(e)
    }
}

impl From<serde_json::Error> for TrainingError {
    fn from(e: serde_json::Error) -> Self {
        TrainingError::Serialization(e.to_string())
    }
}

/// Result alias for training operations.
pub type Result<T> = std::result::Result<T, TrainingError>;
