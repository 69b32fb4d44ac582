//! Re-run orchestrator — rebuild a model from its configuration.
//!
//! No shortcuts, no cached state: a fresh engine stepped from step 0.
//! Runs use `BigInt` cells, so the result never depends on a narrower
//! value type the original run may have used.

use num_bigint::BigInt;

use aether_kernel::config::ModelConfig;
use aether_kernel::engine::ToppleEngine;
use aether_kernel::hashing::grid_hash;
use aether_kernel::Evolving;

use crate::error::{Result, RuntimeError};
use crate::proto_types::CheckpointRecord;

/// Rebuild the model at `steps` (or at stability, if earlier) and return it
/// with its hash.
pub fn rebuild_model(config: &ModelConfig, steps: u64) -> Result<(ToppleEngine<BigInt>, String)> {
    let mut engine = ToppleEngine::<BigInt>::new(config.clone())?;
    while engine.current_step() < steps && engine.step()? {}
    let hash = grid_hash(&engine)?;
    Ok((engine, hash))
}

/// Rebuild and return only the hash.
pub fn rebuild_hash(config: &ModelConfig, steps: u64) -> Result<String> {
    let (_, hash) = rebuild_model(config, steps)?;
    Ok(hash)
}

/// Re-run `config` against a checkpoint log, failing at the first record
/// whose hash differs. Returns the number of records checked.
pub fn verify_records(config: &ModelConfig, records: &[CheckpointRecord]) -> Result<usize> {
    let mut engine = ToppleEngine::<BigInt>::new(config.clone())?;
    for record in records {
        while engine.current_step() < record.step {
            if !engine.step()? {
                break;
            }
        }
        let actual = grid_hash(&engine)?;
        if engine.current_step() != record.step || actual != record.hash {
            return Err(RuntimeError::HashMismatch {
                expected: format!("step {} {}", record.step, record.hash),
                actual: format!("step {} {}", engine.current_step(), actual),
            });
        }
    }
    Ok(records.len())
}
