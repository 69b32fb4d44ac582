//! Backups — durable copies of a model.
//!
//! Layout:
//!   <dir>/<name>/grid.bin         canonical orthant (see `snapshot_codec`)
//!   <dir>/<name>/properties.json  config, step, side, hash
//!
//! `grid.bin` is written and synced first; `properties.json` last, so a
//! backup without properties is incomplete and ignored. Restore recomputes
//! the grid hash and refuses a model whose hash or invariants disagree.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use aether_kernel::arithmetic::{CellValue, FixedWidthValue};
use aether_kernel::config::ModelConfig;
use aether_kernel::disk_engine::DiskToppleEngine;
use aether_kernel::engine::ToppleEngine;
use aether_kernel::hashing::{grid_hash, to_hex};
use aether_kernel::invariants::try_validate_invariants;
use aether_kernel::state::GridSnapshot;
use aether_kernel::{Automaton, FORMAT_VERSION};

use crate::error::{Result, RuntimeError};
use crate::snapshot_codec::{
    decode_properties, encode_properties, write_grid, BackupProperties, GridReader,
};

pub const GRID_FILE: &str = "grid.bin";
pub const PROPERTIES_FILE: &str = "properties.json";
/// Prefix of backups named after the step they hold.
pub const STEP_BACKUP_PREFIX: &str = "step-";

/// Step encoded in a `step-N` backup name.
pub fn backup_step(name: &str) -> Option<u64> {
    name.strip_prefix(STEP_BACKUP_PREFIX)?.parse().ok()
}

/// Back up `model` to `<dir>/<name>/`. Returns the backup directory.
pub fn backup<A: Automaton + ?Sized>(model: &A, dir: &Path, name: &str) -> Result<PathBuf> {
    let target = dir.join(name);
    fs::create_dir_all(&target)?;
    let properties_path = target.join(PROPERTIES_FILE);
    if properties_path.exists() {
        // an older backup under the same name is replaced as a whole
        fs::remove_file(&properties_path)?;
    }

    let grid_path = target.join(GRID_FILE);
    let mut file = File::create(&grid_path)?;
    let cell_count = {
        let mut writer = BufWriter::new(&mut file);
        let count = write_grid(model, &mut writer)?;
        writer.flush()?;
        count
    };
    file.sync_all()?;

    let hash = grid_hash(model)?;
    let state = model.state();
    let properties = BackupProperties {
        format_version: FORMAT_VERSION,
        config: model.config().clone(),
        value_type: <A::Value as CellValue>::TYPE_NAME.to_string(),
        step: state.step(),
        changed: state.last_changed(),
        side: model.side(),
        cell_count,
        hash,
        grid_sha256: file_digest(&grid_path)?,
    };
    let mut file = File::create(&properties_path)?;
    file.write_all(encode_properties(&properties)?.as_bytes())?;
    file.sync_all()?;

    info!(
        backup = %target.display(),
        step = properties.step,
        side = properties.side,
        "backup written"
    );
    Ok(target)
}

/// Properties of a complete backup.
pub fn read_properties(dir: &Path, name: &str) -> Result<BackupProperties> {
    let path = dir.join(name).join(PROPERTIES_FILE);
    let content = fs::read_to_string(&path)?;
    decode_properties(&content).map_err(|e| RuntimeError::SnapshotCorrupt {
        path,
        reason: e.to_string(),
    })
}

/// Restore into an in-memory engine.
pub fn restore_memory<V: CellValue>(dir: &Path, name: &str) -> Result<ToppleEngine<V>> {
    restore_memory_with(dir, name, |config| config)
}

/// Restore into an in-memory engine, adjusting the stored config first
/// (for example the worker count).
pub fn restore_memory_with<V, F>(dir: &Path, name: &str, adjust: F) -> Result<ToppleEngine<V>>
where
    V: CellValue,
    F: FnOnce(ModelConfig) -> ModelConfig,
{
    let properties = read_properties(dir, name)?;
    let grid_path = dir.join(name).join(GRID_FILE);
    let reader = open_grid(&grid_path, &properties)?;
    let values = reader.read_all::<V>().map_err(|reason| corrupt(&grid_path, reason))?;
    let snapshot = GridSnapshot {
        dimension: properties.config.dimension,
        family: properties.config.family,
        step: properties.step,
        changed: properties.changed,
        side: properties.side,
        values,
    };
    let engine = ToppleEngine::from_snapshot(adjust(properties.config.clone()), snapshot)?;
    verify(&engine, &properties)?;
    info!(backup = %dir.join(name).display(), step = properties.step, "restored in memory");
    Ok(engine)
}

/// Restore into a disk-backed engine, streaming layer by layer.
pub fn restore_disk<V: FixedWidthValue>(dir: &Path, name: &str) -> Result<DiskToppleEngine<V>> {
    restore_disk_with(dir, name, |config| config)
}

pub fn restore_disk_with<V, F>(dir: &Path, name: &str, adjust: F) -> Result<DiskToppleEngine<V>>
where
    V: FixedWidthValue,
    F: FnOnce(ModelConfig) -> ModelConfig,
{
    let properties = read_properties(dir, name)?;
    let grid_path = dir.join(name).join(GRID_FILE);
    let mut reader = open_grid(&grid_path, &properties)?;
    let engine = DiskToppleEngine::from_layers(
        adjust(properties.config.clone()),
        properties.state(),
        properties.side,
        |layer| {
            reader
                .read_layer::<V>(layer)
                .map_err(|reason| aether_kernel::LatticeError::InvalidArgument(format!(
                    "{}: {}",
                    grid_path.display(),
                    reason
                )))
        },
    )?;
    reader.finish().map_err(|reason| corrupt(&grid_path, reason))?;
    verify(&engine, &properties)?;
    info!(backup = %dir.join(name).display(), step = properties.step, "restored on disk");
    Ok(engine)
}

/// Names of complete backups under `dir`. Other names first, in name order,
/// then `step-N` backups by step.
pub fn list_backups(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().join(PROPERTIES_FILE).is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort_by(|a, b| (backup_step(a), a).cmp(&(backup_step(b), b)));
    Ok(names)
}

/// SHA-256 of a file's bytes. Lowercase hex string.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(to_hex(&hasher.finalize()))
}

fn open_grid(path: &Path, properties: &BackupProperties) -> Result<GridReader<BufReader<File>>> {
    let digest = file_digest(path)?;
    if digest != properties.grid_sha256 {
        warn!(grid = %path.display(), "grid file checksum mismatch");
        return Err(RuntimeError::HashMismatch {
            expected: properties.grid_sha256.clone(),
            actual: digest,
        });
    }
    let reader =
        GridReader::new(BufReader::new(File::open(path)?)).map_err(|reason| corrupt(path, reason))?;
    let header = reader.header();
    let config = &properties.config;
    if header.dimension != config.dimension
        || header.family != config.family
        || header.side != properties.side
        || header.cell_count != properties.cell_count
        || header.state.step() != properties.step
    {
        return Err(corrupt(path, "grid header disagrees with properties".to_string()));
    }
    Ok(reader)
}

fn verify<A: Automaton + ?Sized>(model: &A, properties: &BackupProperties) -> Result<()> {
    let actual = grid_hash(model)?;
    if actual != properties.hash {
        warn!(expected = %properties.hash, actual = %actual, "backup hash mismatch");
        return Err(RuntimeError::HashMismatch {
            expected: properties.hash.clone(),
            actual,
        });
    }
    let total = model.config().initial_total()?;
    try_validate_invariants(model, &total).map_err(RuntimeError::InvariantViolation)
}

fn corrupt(path: &Path, reason: String) -> RuntimeError {
    RuntimeError::SnapshotCorrupt {
        path: path.to_path_buf(),
        reason,
    }
}
