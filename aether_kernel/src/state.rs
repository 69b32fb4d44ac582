/// Grid state construction and snapshots.
use crate::arithmetic::CellValue;
use crate::config::ModelConfig;
use crate::error::{LatticeError, Result};
use crate::model::{Automaton, EngineState};
use crate::rule::Family;
use crate::storage::DenseRaggedArray;

/// A full copy of a model's canonical orthant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSnapshot<V> {
    pub dimension: usize,
    pub family: Family,
    pub step: u64,
    pub changed: Option<bool>,
    pub side: u64,
    /// Row-major ragged order.
    pub values: Vec<V>,
}

impl<V: CellValue> GridSnapshot<V> {
    /// Copy the state of any automaton.
    pub fn capture<A>(automaton: &A) -> Result<Self>
    where
        A: Automaton<Value = V> + ?Sized,
    {
        let mut values = Vec::new();
        automaton.for_each_canonical(&mut |_, value| {
            values.push(value.clone());
            Ok(())
        })?;
        let state = automaton.state();
        Ok(GridSnapshot {
            dimension: automaton.dimension(),
            family: automaton.family(),
            step: state.step(),
            changed: state.last_changed(),
            side: automaton.side(),
            values,
        })
    }

    pub fn state(&self) -> EngineState {
        EngineState::restore(self.step, self.changed)
    }

    pub fn into_grid(self) -> Result<DenseRaggedArray<V>> {
        DenseRaggedArray::from_values(self.dimension, self.side, self.values)
    }

    /// Check the snapshot belongs to a model built from `config`.
    pub fn check_matches(&self, config: &ModelConfig) -> Result<()> {
        if self.dimension != config.dimension || self.family != config.family {
            return Err(LatticeError::InvalidArgument(format!(
                "snapshot is a {}-dimensional {} grid, config wants {}-dimensional {}",
                self.dimension,
                self.family.name(),
                config.dimension,
                config.family.name()
            )));
        }
        Ok(())
    }
}

/// Initial canonical orthant for `config`.
pub fn create_initial_grid<V: CellValue>(config: &ModelConfig) -> Result<DenseRaggedArray<V>> {
    config.validate()?;
    let mut grid = DenseRaggedArray::zeroed(config.dimension, config.initial_side()?)?;
    for (cell, value) in config.seeds_as::<V>()? {
        grid.set(&cell, value)?;
    }
    Ok(grid)
}
