//! Model traits.
//!
//! `Region` describes shape, `Grid` adds values, `Evolving` adds stepping and
//! `Automaton` is what the engines implement: a symmetric model stored as
//! its canonical orthant. Capabilities are flags, not subtypes.

use num_bigint::BigInt;

use crate::arithmetic::CellValue;
use crate::config::ModelConfig;
use crate::coordinates::Coordinates;
use crate::error::Result;
use crate::region::Region;
use crate::rule::Family;
use crate::symmetry::fold_multiplicity;
use crate::transforms::{AsymmetricSection, WholeGrid};

/// A region that can be read.
pub trait Grid: Region {
    type Value: CellValue;

    /// `Err(OutOfBounds)` outside the region.
    fn value_at(&self, coordinates: &Coordinates) -> Result<Self::Value>;
}

impl<G: Grid + ?Sized> Grid for &G {
    type Value = G::Value;

    fn value_at(&self, coordinates: &Coordinates) -> Result<Self::Value> {
        (**self).value_at(coordinates)
    }
}

/// Engine lifecycle. `Stable` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Initialized,
    Stepped { step: u64 },
    Stable { step: u64 },
}

impl EngineState {
    pub fn step(&self) -> u64 {
        match *self {
            EngineState::Initialized => 0,
            EngineState::Stepped { step } | EngineState::Stable { step } => step,
        }
    }

    pub fn is_stable(&self) -> bool {
        matches!(self, EngineState::Stable { .. })
    }

    /// State after a step that produced `changed`.
    pub fn advance(&self, changed: bool) -> EngineState {
        let step = self.step() + 1;
        if changed {
            EngineState::Stepped { step }
        } else {
            EngineState::Stable { step }
        }
    }

    /// Rebuild from a persisted step counter and last `changed` flag.
    pub fn restore(step: u64, changed: Option<bool>) -> EngineState {
        match (step, changed) {
            (0, _) | (_, None) => EngineState::Initialized,
            (step, Some(false)) => EngineState::Stable { step },
            (step, Some(true)) => EngineState::Stepped { step },
        }
    }

    /// The `changed` flag of the last step, `None` before the first.
    pub fn last_changed(&self) -> Option<bool> {
        match self {
            EngineState::Initialized => None,
            EngineState::Stepped { .. } => Some(true),
            EngineState::Stable { .. } => Some(false),
        }
    }
}

/// Checkpoint boundary emitted by disk-backed stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerFlushed {
    /// The step being computed.
    pub step: u64,
    pub layer: u64,
}

pub trait Evolving {
    /// Compute the next generation. Returns whether any cell changed.
    /// After the model becomes stable this is a no-op returning `false`.
    fn step(&mut self) -> Result<bool>;

    /// Like `step`, reporting every flushed layer.
    fn step_observed(&mut self, observer: &mut dyn FnMut(LayerFlushed)) -> Result<bool> {
        let _ = observer;
        self.step()
    }

    fn current_step(&self) -> u64;

    fn is_stable(&self) -> bool;
}

impl<E: Evolving + ?Sized> Evolving for &mut E {
    fn step(&mut self) -> Result<bool> {
        (**self).step()
    }

    fn step_observed(&mut self, observer: &mut dyn FnMut(LayerFlushed)) -> Result<bool> {
        (**self).step_observed(observer)
    }

    fn current_step(&self) -> u64 {
        (**self).current_step()
    }

    fn is_stable(&self) -> bool {
        (**self).is_stable()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub is_symmetric: bool,
    pub has_disk_backend: bool,
}

/// A symmetric model stored as its canonical orthant.
///
/// The orthant spans `side` outer layers (`0 <= x0 < side`); the last layer
/// is all zero between steps.
pub trait Automaton {
    type Value: CellValue;

    /// The configuration the model was built from.
    fn config(&self) -> &ModelConfig;

    fn dimension(&self) -> usize;

    fn family(&self) -> Family;

    fn side(&self) -> u64;

    fn capabilities(&self) -> Capabilities;

    fn state(&self) -> EngineState;

    /// Value of a canonical cell; zero past the last layer.
    fn canonical_value(&self, cell: &[i64]) -> Result<Self::Value>;

    /// Every stored canonical cell in row-major order.
    fn for_each_canonical(
        &self,
        visit: &mut dyn FnMut(&[i64], &Self::Value) -> Result<()>,
    ) -> Result<()>;

    /// `sum value(p) * fold_multiplicity(p)` over the orthant.
    fn total_quantity(&self) -> Result<BigInt> {
        let mut total = BigInt::from(0);
        self.for_each_canonical(&mut |cell, value| {
            if !value.is_zero() {
                total += value.to_bigint() * BigInt::from(fold_multiplicity(cell));
            }
            Ok(())
        })?;
        Ok(total)
    }

    fn asymmetric_section(&self) -> AsymmetricSection<&Self>
    where
        Self: Sized,
    {
        AsymmetricSection::new(self)
    }

    fn whole_grid(&self) -> WholeGrid<&Self>
    where
        Self: Sized,
    {
        WholeGrid::new(self)
    }
}

impl<A: Automaton + ?Sized> Automaton for &A {
    type Value = A::Value;

    fn config(&self) -> &ModelConfig {
        (**self).config()
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn family(&self) -> Family {
        (**self).family()
    }

    fn side(&self) -> u64 {
        (**self).side()
    }

    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn state(&self) -> EngineState {
        (**self).state()
    }

    fn canonical_value(&self, cell: &[i64]) -> Result<Self::Value> {
        (**self).canonical_value(cell)
    }

    fn for_each_canonical(
        &self,
        visit: &mut dyn FnMut(&[i64], &Self::Value) -> Result<()>,
    ) -> Result<()> {
        (**self).for_each_canonical(visit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine() {
        let s = EngineState::Initialized;
        assert_eq!(s.step(), 0);
        let s = s.advance(true);
        assert_eq!(s, EngineState::Stepped { step: 1 });
        let s = s.advance(false);
        assert!(s.is_stable());
        assert_eq!(s.step(), 2);
        assert_eq!(s.last_changed(), Some(false));
    }

    #[test]
    fn test_restore_state() {
        assert_eq!(EngineState::restore(0, None), EngineState::Initialized);
        assert_eq!(EngineState::restore(7, Some(true)), EngineState::Stepped { step: 7 });
        assert_eq!(EngineState::restore(7, Some(false)), EngineState::Stable { step: 7 });
    }
}
