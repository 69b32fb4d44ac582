#![forbid(unsafe_code)]

//! Aether runtime.
//!
//! Wraps the lattice kernel with backups, an append-only checkpoint log,
//! session management, re-runs and drift detection.
//!
//! No toppling logic lives here; stepping, hashing and invariants are
//! delegated to the kernel.

pub mod error;
pub mod proto_types;
pub mod checkpoint_log;
pub mod snapshot_codec;
pub mod snapshot;
pub mod session;
pub mod rerun;
pub mod drift;

pub use error::{Result, RuntimeError};
