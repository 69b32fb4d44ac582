//! Runtime error type.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use aether_kernel::LatticeError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Kernel(#[from] LatticeError),

    #[error("snapshot {path} is corrupt: {reason}")]
    SnapshotCorrupt { path: PathBuf, reason: String },

    #[error("hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("checkpoint log {path} is corrupt at byte {offset}: {reason}")]
    CheckpointLogCorrupt { path: PathBuf, offset: u64, reason: String },

    #[error("checkpoint sequence violation: expected {expected}, got {got}")]
    SequenceViolation { expected: u64, got: u64 },
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
