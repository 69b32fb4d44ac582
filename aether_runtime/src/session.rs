//! Session manager — a model, its checkpoint log and periodic backups.
//!
//! Each session gets its own directory:
//!   <base_dir>/<name>/checkpoints.log
//!   <base_dir>/<name>/backups/step-NNNNNNNN/
//!
//! Step-before-persist order:
//!   1. model.step()              — may fail (overflow, I/O); nothing persisted
//!   2. backup if interval reached
//!   3. checkpoint_log.append()   — last, so a record naming a backup only
//!      exists once that backup is complete
//!
//! Concurrency: `SharedSession` serializes access with a Mutex; no global
//! mutable state.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::info;

use aether_kernel::hashing::grid_hash;
use aether_kernel::{Automaton, Evolving};

use crate::checkpoint_log::CheckpointLog;
use crate::error::{Result, RuntimeError};
use crate::proto_types::{BackupMark, CheckpointRecord};
use crate::snapshot;

pub const CHECKPOINT_LOG_FILE: &str = "checkpoints.log";
pub const BACKUP_DIR: &str = "backups";

pub fn backup_name(step: u64) -> String {
    format!("{}{:08}", snapshot::STEP_BACKUP_PREFIX, step)
}

/// An isolated evolving model with its own checkpoint log.
pub struct Session<M> {
    name: String,
    dir: PathBuf,
    model: M,
    log: CheckpointLog,
    backup_interval: u64,
}

impl<M: Automaton + Evolving> Session<M> {
    /// Start a session for a fresh model. Fails if the session directory
    /// already holds checkpoints; use `resume` for those.
    pub fn create(base_dir: &Path, name: &str, model: M, backup_interval: u64) -> Result<Self> {
        let dir = base_dir.join(name);
        let log = CheckpointLog::open(&dir.join(CHECKPOINT_LOG_FILE))?;
        if log.last_sequence() > 0 {
            return Err(RuntimeError::InvariantViolation(format!(
                "session {} already has {} checkpoints",
                name,
                log.last_sequence()
            )));
        }
        info!(session = name, step = model.current_step(), "session created");
        Ok(Self {
            name: name.to_string(),
            dir,
            model,
            log,
            backup_interval,
        })
    }

    /// Reopen a session from its latest backup.
    ///
    /// `restore` rebuilds the model from `(backups_dir, backup_name)`. The
    /// restored hash must match the checkpoint recorded for that step; the
    /// model is then stepped forward to the last checkpoint, each step
    /// checked against the log.
    pub fn resume<F>(base_dir: &Path, name: &str, backup_interval: u64, restore: F) -> Result<Self>
    where
        F: FnOnce(&Path, &str) -> Result<M>,
    {
        let dir = base_dir.join(name);
        let log = CheckpointLog::open(&dir.join(CHECKPOINT_LOG_FILE))?;
        let records = log.load_all()?;
        let backups_dir = dir.join(BACKUP_DIR);
        let latest = snapshot::list_backups(&backups_dir)?.pop().ok_or_else(|| {
            let reason = format!("session {} has no backup to resume from", name);
            RuntimeError::InvariantViolation(reason)
        })?;
        let mut model = restore(&backups_dir, &latest)?;

        let restored_step = model.current_step();
        let mut pending = records.iter().filter(|r| r.step >= restored_step).peekable();
        if let Some(record) = pending.peek() {
            if record.step == restored_step {
                check_record(&model, record)?;
                pending.next();
            }
        }
        for record in pending {
            model.step()?;
            check_record(&model, record)?;
        }
        info!(session = name, backup = %latest, step = model.current_step(), "session resumed");
        Ok(Self {
            name: name.to_string(),
            dir,
            model,
            log,
            backup_interval,
        })
    }

    /// Step once, record the checkpoint, back up on the interval.
    pub fn advance(&mut self) -> Result<bool> {
        let mut last_flushed_layer = None;
        let changed = self
            .model
            .step_observed(&mut |event| last_flushed_layer = Some(event.layer))?;
        let step = self.model.current_step();

        let backup = if self.backup_interval > 0 && step % self.backup_interval == 0 {
            let name = backup_name(step);
            snapshot::backup(&self.model, &self.dir.join(BACKUP_DIR), &name)?;
            Some(BackupMark { name })
        } else {
            None
        };

        let record = CheckpointRecord {
            sequence: self.log.last_sequence() + 1,
            step,
            last_flushed_layer,
            side: self.model.side(),
            hash: grid_hash(&self.model)?,
            changed,
            backup,
        };
        self.log.append(&record)?;
        Ok(changed)
    }

    /// Advance until stable or `max_steps` more steps ran. Returns the
    /// number of steps taken.
    pub fn run(&mut self, max_steps: u64) -> Result<u64> {
        let mut taken = 0;
        while taken < max_steps && !self.model.is_stable() {
            self.advance()?;
            taken += 1;
        }
        Ok(taken)
    }

    /// Back up the current state now, outside the interval.
    pub fn backup_now(&self) -> Result<PathBuf> {
        let name = backup_name(self.model.current_step());
        snapshot::backup(&self.model, &self.dir.join(BACKUP_DIR), &name)
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn log(&self) -> &CheckpointLog {
        &self.log
    }

    pub fn current_hash(&self) -> Result<String> {
        Ok(grid_hash(&self.model)?)
    }

    pub fn current_step(&self) -> u64 {
        self.model.current_step()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.dir.join(BACKUP_DIR)
    }
}

fn check_record<A: Automaton + ?Sized>(model: &A, record: &CheckpointRecord) -> Result<()> {
    let actual = grid_hash(model)?;
    if actual != record.hash {
        return Err(RuntimeError::HashMismatch {
            expected: record.hash.clone(),
            actual,
        });
    }
    Ok(())
}

/// Thread-safe session handle using Mutex.
pub struct SharedSession<M> {
    inner: Mutex<Session<M>>,
}

impl<M: Automaton + Evolving> SharedSession<M> {
    pub fn new(session: Session<M>) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    /// Step under lock.
    pub fn advance(&self) -> Result<bool> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).advance()
    }

    pub fn current_hash(&self) -> Result<String> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).current_hash()
    }

    pub fn current_step(&self) -> u64 {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).current_step()
    }

    pub fn into_inner(self) -> Session<M> {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
