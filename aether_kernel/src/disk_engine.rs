/// Disk-backed toppling engine.
///
/// The canonical orthant lives in a file in a private scratch directory.
/// A step sweeps the outer layers in order, holding old layers `k-1..=k+1`
/// and the matching new layers in memory. New layer `k-1` is final once
/// source layer `k` has been toppled; it is handed to a writer thread and
/// never read again during the step. The new generation goes to a fresh
/// file (`step=N.data`) that replaces the old one when the sweep is done.
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::arithmetic::FixedWidthValue;
use crate::config::ModelConfig;
use crate::engine::{settled_side, CellStepper};
use crate::error::{LatticeError, Result};
use crate::model::{Automaton, Capabilities, EngineState, Evolving, LayerFlushed};
use crate::rule::Family;
use crate::state::GridSnapshot;
use crate::storage::file::encode_values;
use crate::storage::{to_usize, FileBackedArray, RaggedShape};
use crate::symmetry::NeighborTable;

/// Layers queued for the writer before the sweep blocks.
const WRITE_QUEUE_DEPTH: usize = 4;

pub fn step_file_name(step: u64) -> String {
    format!("step={}.data", step)
}

pub struct DiskToppleEngine<V: FixedWidthValue> {
    config: ModelConfig,
    table: NeighborTable,
    scratch: PathBuf,
    grid: FileBackedArray<V>,
    state: EngineState,
}

impl<V: FixedWidthValue> fmt::Debug for DiskToppleEngine<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskToppleEngine")
            .field("dimension", &self.config.dimension)
            .field("family", &self.config.family)
            .field("side", &self.grid.side())
            .field("state", &self.state)
            .field("scratch", &self.scratch)
            .finish_non_exhaustive()
    }
}

impl<V: FixedWidthValue> DiskToppleEngine<V> {
    pub fn new(config: ModelConfig) -> Result<Self> {
        config.validate_seed_range::<V>()?;
        let side = config.initial_side()?;
        let seeds = config.seeds_as::<V>()?;
        Self::build(config, EngineState::Initialized, side, |grid| {
            for (cell, value) in &seeds {
                grid.write_cell(cell, value)?;
            }
            Ok(())
        })
    }

    /// Rebuild from persisted layers, `layer(k)` returning layer `k` of a
    /// grid with `side` layers.
    pub fn from_layers<F>(
        config: ModelConfig,
        state: EngineState,
        side: u64,
        mut layer: F,
    ) -> Result<Self>
    where
        F: FnMut(u64) -> Result<Vec<V>>,
    {
        config.validate()?;
        Self::build(config, state, side, |grid| {
            for k in 0..side {
                grid.write_layer(k, &layer(k)?)?;
            }
            if grid.read_layer(side.saturating_sub(1))?.iter().any(|v| !v.is_zero()) {
                return Err(LatticeError::InvalidArgument(
                    "restored outer layer is not empty".to_string(),
                ));
            }
            Ok(())
        })
    }

    pub fn from_snapshot(config: ModelConfig, snapshot: GridSnapshot<V>) -> Result<Self> {
        snapshot.check_matches(&config)?;
        let shape = RaggedShape::new(snapshot.dimension, snapshot.side)?;
        if snapshot.values.len() as u64 != shape.cell_count(snapshot.side) {
            return Err(LatticeError::InvalidArgument(format!(
                "snapshot has {} values for side {}",
                snapshot.values.len(),
                snapshot.side
            )));
        }
        let state = snapshot.state();
        Self::from_layers(config, state, snapshot.side, |k| {
            let start = shape.layer_start(k) as usize;
            let len = shape.layer_len(k) as usize;
            Ok(snapshot.values[start..start + len].to_vec())
        })
    }

    fn build<F>(config: ModelConfig, state: EngineState, side: u64, fill: F) -> Result<Self>
    where
        F: FnOnce(&FileBackedArray<V>) -> Result<()>,
    {
        let table = NeighborTable::new(config.dimension)?;
        let scratch = create_scratch_dir(&config.scratch_parent())?;
        let first_path = scratch.join(step_file_name(state.step()));
        let populated = FileBackedArray::create(first_path, config.dimension, side)
            .and_then(|grid| {
                fill(&grid)?;
                grid.sync()?;
                Ok(grid)
            });
        let grid = match populated {
            Ok(grid) => grid,
            Err(e) => {
                let _ = fs::remove_dir_all(&scratch);
                return Err(e);
            }
        };
        info!(
            dimension = config.dimension,
            family = config.family.name(),
            side,
            scratch = %scratch.display(),
            "disk model ready"
        );
        Ok(DiskToppleEngine {
            config,
            table,
            scratch,
            grid,
            state,
        })
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch
    }

    pub fn grid(&self) -> &FileBackedArray<V> {
        &self.grid
    }

    pub fn snapshot(&self) -> Result<GridSnapshot<V>> {
        GridSnapshot::capture(self)
    }

    /// Sweep the old grid into `next`. Returns `(changed, last_nonzero,
    /// extra_nonzero)` for the two outermost new layers.
    fn sweep(
        &self,
        shape: &RaggedShape,
        next: &FileBackedArray<V>,
        writer: &LayerWriter,
        step: u64,
        observer: &mut dyn FnMut(LayerFlushed),
    ) -> Result<(bool, bool, bool)> {
        let side = self.grid.side();
        let mut old_layers: BTreeMap<u64, Vec<V>> = BTreeMap::new();
        let mut new_layers: BTreeMap<u64, Vec<V>> = BTreeMap::new();
        let mut stepper = CellStepper::new(self.config.family, &self.table);
        let mut outcome = (false, false, false);

        let mut flush = |layer: u64,
                         old_layers: &mut BTreeMap<u64, Vec<V>>,
                         new_layers: &mut BTreeMap<u64, Vec<V>>|
         -> Result<()> {
            let len = to_usize(shape.layer_len(layer))?;
            let fresh = new_layers.remove(&layer).unwrap_or_else(|| vec![V::zero(); len]);
            let nonzero = fresh.iter().any(|v| !v.is_zero());
            let differs = match old_layers.remove(&layer) {
                Some(old) => old != fresh,
                None => nonzero,
            };
            outcome.0 |= differs;
            if layer + 1 == side {
                outcome.1 = nonzero;
            } else if layer == side {
                outcome.2 = nonzero;
            }
            let (offset, _) = next.layer_span(layer);
            writer.write(offset, encode_values(&fresh))?;
            observer(LayerFlushed { step, layer });
            Ok(())
        };

        for k in 0..side {
            for layer in k.saturating_sub(1)..=k + 1 {
                if layer < side && !old_layers.contains_key(&layer) {
                    old_layers.insert(layer, self.grid.read_layer(layer)?);
                }
                if !new_layers.contains_key(&layer) {
                    new_layers.insert(layer, vec![V::zero(); to_usize(shape.layer_len(layer))?]);
                }
            }
            {
                let old = &old_layers;
                let new = &mut new_layers;
                let mut read = |cell: &[i64]| -> Result<V> {
                    let layer = cell[0] as u64;
                    if layer >= side {
                        return Ok(V::zero());
                    }
                    let values = old.get(&layer).ok_or_else(|| window_miss(cell))?;
                    Ok(values[(shape.offset(cell) - shape.layer_start(layer)) as usize])
                };
                let mut emit = |cell: &[i64], amount: &V| -> Result<()> {
                    let layer = cell[0] as u64;
                    let values = new.get_mut(&layer).ok_or_else(|| window_miss(cell))?;
                    let slot =
                        &mut values[(shape.offset(cell) - shape.layer_start(layer)) as usize];
                    *slot = slot
                        .add_checked(amount)
                        .ok_or_else(|| LatticeError::overflow(cell, V::TYPE_NAME, "accumulate"))?;
                    Ok(())
                };
                shape.for_each_in_layer(k, |cell| stepper.topple(cell, &mut read, &mut emit))?;
            }
            if k >= 1 {
                flush(k - 1, &mut old_layers, &mut new_layers)?;
            }
        }
        flush(side - 1, &mut old_layers, &mut new_layers)?;
        flush(side, &mut old_layers, &mut new_layers)?;
        Ok(outcome)
    }
}

fn window_miss(cell: &[i64]) -> LatticeError {
    LatticeError::InvalidArgument(format!("cell {:?} outside the layer window", cell))
}

/// A fresh, private directory under `parent`.
fn create_scratch_dir(parent: &Path) -> Result<PathBuf> {
    fs::create_dir_all(parent)
        .map_err(|e| LatticeError::storage(parent, "create scratch parent", e))?;
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    for attempt in 0..1000u32 {
        let dir = parent.join(format!("aether-{}-{}-{}", std::process::id(), stamp, attempt));
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(LatticeError::storage(&dir, "create scratch directory", e)),
        }
    }
    Err(LatticeError::storage(
        parent,
        "create scratch directory",
        io::Error::new(io::ErrorKind::AlreadyExists, "no free directory name"),
    ))
}

/// Background writer for flushed layers.
struct LayerWriter {
    path: PathBuf,
    sender: Option<SyncSender<(u64, Vec<u8>)>>,
    handle: Option<JoinHandle<io::Result<()>>>,
}

impl LayerWriter {
    fn spawn(file: File, path: PathBuf) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<(u64, Vec<u8>)>(WRITE_QUEUE_DEPTH);
        let handle = thread::Builder::new()
            .name("aether-layer-writer".to_string())
            .spawn(move || -> io::Result<()> {
                let mut file = file;
                for (offset, bytes) in receiver {
                    file.seek(SeekFrom::Start(offset))?;
                    file.write_all(&bytes)?;
                }
                file.flush()
            })
            .map_err(|e| LatticeError::storage(&path, "spawn layer writer", e))?;
        Ok(LayerWriter {
            path,
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    fn write(&self, offset: u64, bytes: Vec<u8>) -> Result<()> {
        let sender = self.sender.as_ref().ok_or_else(|| self.stopped())?;
        sender.send((offset, bytes)).map_err(|_| self.stopped())
    }

    fn stopped(&self) -> LatticeError {
        LatticeError::storage(
            &self.path,
            "queue layer",
            io::Error::new(io::ErrorKind::BrokenPipe, "layer writer stopped"),
        )
    }

    /// Close the queue and wait for every write to land.
    fn finish(mut self) -> Result<()> {
        drop(self.sender.take());
        match self.handle.take().map(JoinHandle::join) {
            None | Some(Ok(Ok(()))) => Ok(()),
            Some(Ok(Err(e))) => Err(LatticeError::storage(&self.path, "write layer", e)),
            Some(Err(_)) => Err(LatticeError::storage(
                &self.path,
                "write layer",
                io::Error::new(io::ErrorKind::Other, "layer writer panicked"),
            )),
        }
    }
}

impl<V: FixedWidthValue> Evolving for DiskToppleEngine<V> {
    fn step(&mut self) -> Result<bool> {
        self.step_observed(&mut |_| {})
    }

    fn step_observed(&mut self, observer: &mut dyn FnMut(LayerFlushed)) -> Result<bool> {
        if self.state.is_stable() {
            return Ok(false);
        }
        let step = self.state.step() + 1;
        let side = self.grid.side();
        let mut shape = self.grid.shape().clone();
        shape.reserve(side + 1)?;

        let next_path = self.scratch.join(step_file_name(step));
        let mut next = FileBackedArray::<V>::create(&next_path, self.config.dimension, side + 1)?;
        let spawned = next
            .clone_handle()
            .and_then(|file| LayerWriter::spawn(file, next_path.clone()));
        let writer = match spawned {
            Ok(writer) => writer,
            Err(e) => {
                let _ = next.remove();
                return Err(e);
            }
        };
        let swept = self.sweep(&shape, &next, &writer, step, observer);
        let written = writer.finish();
        let (changed, last_nonzero, extra_nonzero) = match (swept, written) {
            (Ok(outcome), Ok(())) => outcome,
            (_, Err(e)) | (Err(e), _) => {
                let _ = next.remove();
                return Err(e);
            }
        };

        let new_side = settled_side(side, last_nonzero, extra_nonzero);
        next.resize(new_side)?;
        next.sync()?;
        let old = std::mem::replace(&mut self.grid, next);
        if let Err(e) = old.remove() {
            warn!(error = %e, "could not remove previous generation");
        }
        self.state = self.state.advance(changed);

        debug!(step, side = new_side, changed, "disk step");
        if new_side > side {
            info!(step, side = new_side, "grid grew");
        }
        if !changed {
            info!(step, "model is stable");
        }
        Ok(changed)
    }

    fn current_step(&self) -> u64 {
        self.state.step()
    }

    fn is_stable(&self) -> bool {
        self.state.is_stable()
    }
}

impl<V: FixedWidthValue> Automaton for DiskToppleEngine<V> {
    type Value = V;

    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn family(&self) -> Family {
        self.config.family
    }

    fn side(&self) -> u64 {
        self.grid.side()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            is_symmetric: true,
            has_disk_backend: true,
        }
    }

    fn state(&self) -> EngineState {
        self.state
    }

    fn canonical_value(&self, cell: &[i64]) -> Result<V> {
        self.grid.read_cell(cell)
    }

    fn for_each_canonical(&self, visit: &mut dyn FnMut(&[i64], &V) -> Result<()>) -> Result<()> {
        self.grid.for_each_cell(|cell, value| visit(cell, value))
    }
}

impl<V: FixedWidthValue> Drop for DiskToppleEngine<V> {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.scratch) {
            warn!(
                scratch = %self.scratch.display(),
                error = %e,
                "could not remove scratch directory"
            );
        }
    }
}
