/// In-memory toppling engine.
///
/// Double buffered: generation k is read-only while generation k+1 is
/// accumulated in a fresh buffer. Each canonical cell pushes what it sends
/// into its neighbor images, so a cell only touches its own layer and the
/// two adjacent ones. With `workers > 1` the outer layers are split into
/// contiguous chunks, each worker filling a private accumulator that is
/// merged afterwards; the result is the same as sequential stepping.
use std::fmt;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::arithmetic::CellValue;
use crate::config::ModelConfig;
use crate::error::{LatticeError, Result};
use crate::model::{Automaton, Capabilities, EngineState, Evolving};
use crate::rule::{Family, NeighborState, Toppling};
use crate::state::{create_initial_grid, GridSnapshot};
use crate::storage::{to_usize, DenseRaggedArray, RaggedShape};
use crate::symmetry::NeighborTable;

// ---------------------------------------------------------------------------
// Per-cell stepping, shared with the disk engine
// ---------------------------------------------------------------------------

/// Scratch state for toppling cells one at a time.
pub(crate) struct CellStepper<'a, V> {
    family: Family,
    dimension: usize,
    table: &'a NeighborTable,
    neighbors: Vec<NeighborState<V>>,
    toppling: Toppling<V>,
    target: Vec<i64>,
}

impl<'a, V: CellValue> CellStepper<'a, V> {
    pub(crate) fn new(family: Family, table: &'a NeighborTable) -> Self {
        let dimension = table.dimension();
        CellStepper {
            family,
            dimension,
            table,
            neighbors: Vec::with_capacity(2 * dimension),
            toppling: Toppling::new(),
            target: vec![0; dimension],
        }
    }

    /// Topple one canonical cell. `read` returns generation-k values (zero
    /// past the last layer); `emit` adds an amount to a generation-k+1 cell.
    pub(crate) fn topple<R, E>(&mut self, cell: &[i64], read: &mut R, emit: &mut E) -> Result<()>
    where
        R: FnMut(&[i64]) -> Result<V>,
        E: FnMut(&[i64], &V) -> Result<()>,
    {
        let value = read(cell)?;
        let entries = self.table.entries(cell);
        self.neighbors.clear();
        for entry in entries.iter() {
            entry.target(cell, &mut self.target);
            self.neighbors.push(NeighborState {
                entry: *entry,
                value: read(&self.target)?,
            });
        }
        self.family
            .topple(self.dimension, &value, &self.neighbors, &mut self.toppling)
            .map_err(|operation| LatticeError::overflow(cell, V::TYPE_NAME, operation))?;

        if !self.toppling.keep.is_zero() {
            emit(cell, &self.toppling.keep)?;
        }
        for (index, share) in &self.toppling.transfers {
            let entry = self.neighbors[*index].entry;
            let amount = share
                .mul_small_checked(entry.share_multiplier)
                .ok_or_else(|| LatticeError::overflow(cell, V::TYPE_NAME, "share multiplier"))?;
            entry.target(cell, &mut self.target);
            emit(&self.target, &amount)?;
        }
        Ok(())
    }
}

/// Side after a step. `next` holds `old_side + 1` layers; the result keeps
/// exactly one all-zero outer layer.
pub(crate) fn settled_side(old_side: u64, last_nonzero: bool, extra_nonzero: bool) -> u64 {
    if extra_nonzero {
        old_side + 2
    } else if last_nonzero {
        old_side + 1
    } else {
        old_side
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct Accumulator<V> {
    base: usize,
    values: Vec<V>,
}

pub struct ToppleEngine<V> {
    config: ModelConfig,
    table: NeighborTable,
    grid: DenseRaggedArray<V>,
    state: EngineState,
    pool: Option<ThreadPool>,
}

impl<V: CellValue> fmt::Debug for ToppleEngine<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToppleEngine")
            .field("dimension", &self.config.dimension)
            .field("family", &self.config.family)
            .field("side", &self.grid.side())
            .field("state", &self.state)
            .field("workers", &self.config.workers)
            .finish_non_exhaustive()
    }
}

impl<V: CellValue> ToppleEngine<V> {
    pub fn new(config: ModelConfig) -> Result<Self> {
        config.validate_seed_range::<V>()?;
        let grid = create_initial_grid(&config)?;
        Self::assemble(config, grid, EngineState::Initialized)
    }

    /// Resume from a snapshot taken of a model built from `config`.
    pub fn from_snapshot(config: ModelConfig, snapshot: GridSnapshot<V>) -> Result<Self> {
        config.validate()?;
        snapshot.check_matches(&config)?;
        let state = snapshot.state();
        let grid = snapshot.into_grid()?;
        if !grid.layer_is_zero(grid.side().saturating_sub(1)) {
            return Err(LatticeError::InvalidArgument(
                "snapshot outer layer is not empty".to_string(),
            ));
        }
        Self::assemble(config, grid, state)
    }

    fn assemble(
        config: ModelConfig,
        grid: DenseRaggedArray<V>,
        state: EngineState,
    ) -> Result<Self> {
        let pool = if config.workers > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.workers)
                .thread_name(|i| format!("aether-step-{}", i))
                .build()
                .map_err(|e| LatticeError::InvalidArgument(format!("thread pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };
        Ok(ToppleEngine {
            table: NeighborTable::new(config.dimension)?,
            config,
            grid,
            state,
            pool,
        })
    }

    pub fn grid(&self) -> &DenseRaggedArray<V> {
        &self.grid
    }

    pub fn snapshot(&self) -> GridSnapshot<V> {
        GridSnapshot {
            dimension: self.config.dimension,
            family: self.config.family,
            step: self.state.step(),
            changed: self.state.last_changed(),
            side: self.grid.side(),
            values: self.grid.values().to_vec(),
        }
    }

    /// Generation k+1 with one extra outer layer.
    fn compute_next(&self) -> Result<DenseRaggedArray<V>> {
        let side = self.grid.side();
        let next_side = side + 1;
        let mut shape = self.grid.shape().clone();
        shape.reserve(next_side)?;

        let chunks = match &self.pool {
            Some(pool) => layer_chunks(&shape, side, pool.current_num_threads()),
            None => vec![(0, side)],
        };
        if chunks.len() == 1 {
            let acc = self.topple_layers(0, side, &shape, next_side)?;
            return DenseRaggedArray::from_values(self.config.dimension, next_side, acc.values);
        }

        let pool = self.pool.as_ref().ok_or_else(|| {
            LatticeError::InvalidArgument("parallel step without a thread pool".to_string())
        })?;
        let partials: Vec<Result<Accumulator<V>>> = pool.install(|| {
            chunks
                .par_iter()
                .map(|&(lo, hi)| self.topple_layers(lo, hi, &shape, next_side))
                .collect()
        });
        let mut next = DenseRaggedArray::zeroed(self.config.dimension, next_side)?;
        for partial in partials {
            let partial = partial?;
            for (i, value) in partial.values.iter().enumerate() {
                if !value.is_zero() {
                    next.add_at(partial.base + i, value).ok_or_else(|| {
                        LatticeError::overflow(&[], V::TYPE_NAME, "merge worker accumulators")
                    })?;
                }
            }
        }
        Ok(next)
    }

    /// Topple source layers `[lo, hi)` into an accumulator spanning
    /// `lo - 1 ..= hi` of the next generation.
    fn topple_layers(
        &self,
        lo: u64,
        hi: u64,
        shape: &RaggedShape,
        next_side: u64,
    ) -> Result<Accumulator<V>> {
        let base_layer = lo.saturating_sub(1);
        let end_layer = (hi + 1).min(next_side);
        let base = to_usize(shape.layer_start(base_layer))?;
        let end = to_usize(shape.layer_start(end_layer))?;
        let mut values = vec![V::zero(); end - base];

        let grid = &self.grid;
        let mut read = |cell: &[i64]| -> Result<V> { Ok(grid.value_or_zero(cell)) };
        let mut emit = |cell: &[i64], amount: &V| -> Result<()> {
            let slot = &mut values[shape.offset(cell) as usize - base];
            *slot = slot
                .add_checked(amount)
                .ok_or_else(|| LatticeError::overflow(cell, V::TYPE_NAME, "accumulate"))?;
            Ok(())
        };
        let mut stepper = CellStepper::new(self.config.family, &self.table);
        for layer in lo..hi {
            shape.for_each_in_layer(layer, |cell| stepper.topple(cell, &mut read, &mut emit))?;
        }
        Ok(Accumulator { base, values })
    }
}

/// Split `[0, side)` into contiguous layer ranges of roughly equal cell
/// counts.
fn layer_chunks(shape: &RaggedShape, side: u64, workers: usize) -> Vec<(u64, u64)> {
    let workers = (workers.max(1) as u64).min(side.max(1));
    let target = (shape.cell_count(side) / workers).max(1);
    let mut chunks = Vec::with_capacity(workers as usize);
    let mut start = 0;
    let mut filled = 0;
    for layer in 0..side {
        filled += shape.layer_len(layer);
        if filled >= target && (chunks.len() as u64) < workers - 1 {
            chunks.push((start, layer + 1));
            start = layer + 1;
            filled = 0;
        }
    }
    if start < side {
        chunks.push((start, side));
    }
    chunks
}

fn differs<V: CellValue>(old: &[V], next: &[V]) -> bool {
    let shared = old.len().min(next.len());
    old[..shared] != next[..shared]
        || old[shared..].iter().any(|v| !v.is_zero())
        || next[shared..].iter().any(|v| !v.is_zero())
}

impl<V: CellValue> Evolving for ToppleEngine<V> {
    fn step(&mut self) -> Result<bool> {
        if self.state.is_stable() {
            return Ok(false);
        }
        let old_side = self.grid.side();
        let mut next = self.compute_next()?;
        let side = settled_side(
            old_side,
            !next.layer_is_zero(old_side - 1),
            !next.layer_is_zero(old_side),
        );
        if side > next.side() {
            next.grow_to(side)?;
        } else {
            next.truncate_to(side);
        }

        let changed = differs(self.grid.values(), next.values());
        self.grid = next;
        self.state = self.state.advance(changed);
        let step = self.state.step();
        debug!(step, side, changed, "memory step");
        if side > old_side {
            info!(step, side, "grid grew");
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

impl<V: CellValue> Automaton for ToppleEngine<V> {
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
            has_disk_backend: false,
        }
    }

    fn state(&self) -> EngineState {
        self.state
    }

    fn canonical_value(&self, cell: &[i64]) -> Result<V> {
        Ok(self.grid.value_or_zero(cell))
    }

    fn for_each_canonical(&self, visit: &mut dyn FnMut(&[i64], &V) -> Result<()>) -> Result<()> {
        self.grid.for_each_cell(|cell, value| visit(cell, value))
    }
}
