//! Hand-written protobuf types for the checkpoint log.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Field numbers are part of the log format; never renumber.

use prost::Message;

// ── Checkpoint ─────────────────────────────────────────────────

/// One completed step of a model.
#[derive(Clone, PartialEq, Message)]
pub struct CheckpointRecord {
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
    #[prost(uint64, tag = "2")]
    pub step: u64,
    /// Last layer flushed during the step, absent on the in-memory backend.
    #[prost(uint64, optional, tag = "3")]
    pub last_flushed_layer: Option<u64>,
    #[prost(uint64, tag = "4")]
    pub side: u64,
    #[prost(string, tag = "5")]
    pub hash: String,
    #[prost(bool, tag = "6")]
    pub changed: bool,
    #[prost(message, optional, tag = "7")]
    pub backup: Option<BackupMark>,
}

// ── Backup ─────────────────────────────────────────────────────

/// Written when the step was also backed up.
#[derive(Clone, PartialEq, Message)]
pub struct BackupMark {
    #[prost(string, tag = "1")]
    pub name: String,
}
