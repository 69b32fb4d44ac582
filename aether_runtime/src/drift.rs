//! Drift detection — determinism verification and model comparison.
//!
//! All quantities are exact integers (`BigInt`); nothing is approximated.

use num_bigint::BigInt;
use num_traits::Signed;

use aether_kernel::arithmetic::CellValue;
use aether_kernel::config::ModelConfig;
use aether_kernel::{Automaton, LatticeError};

use crate::error::{Result, RuntimeError};
use crate::rerun;

/// Re-run the same configuration twice and require identical hashes.
pub fn verify_determinism(config: &ModelConfig, steps: u64) -> Result<String> {
    let first = rerun::rebuild_hash(config, steps)?;
    let second = rerun::rebuild_hash(config, steps)?;
    if first != second {
        return Err(RuntimeError::HashMismatch {
            expected: first,
            actual: second,
        });
    }
    Ok(first)
}

/// Cell-by-cell comparison of two models of the same dimension, e.g. the
/// memory and disk backends of one configuration. Cells past a model's
/// side count as zero.
pub fn compare_models<A, B>(a: &A, b: &B) -> Result<DriftReport>
where
    A: Automaton + ?Sized,
    B: Automaton + ?Sized,
{
    if a.dimension() != b.dimension() {
        return Err(LatticeError::InvalidArgument(format!(
            "cannot compare a {}-dimensional model with a {}-dimensional one",
            a.dimension(),
            b.dimension()
        ))
        .into());
    }

    let mut differing_cells = 0u64;
    let mut first_difference = None;
    let mut max_abs_difference = BigInt::from(0);

    let mut note = |cell: &[i64], value_a: BigInt, value_b: BigInt| {
        if value_a == value_b {
            return;
        }
        let difference = (&value_b - &value_a).abs();
        if difference > max_abs_difference {
            max_abs_difference = difference;
        }
        differing_cells += 1;
        if first_difference.is_none() {
            first_difference = Some(CellDrift {
                cell: cell.to_vec(),
                value_a,
                value_b,
            });
        }
    };

    // walk the larger orthant, query the other one
    if a.side() >= b.side() {
        a.for_each_canonical(&mut |cell, value| {
            note(cell, value.to_bigint(), b.canonical_value(cell)?.to_bigint());
            Ok(())
        })?;
    } else {
        b.for_each_canonical(&mut |cell, value| {
            note(cell, a.canonical_value(cell)?.to_bigint(), value.to_bigint());
            Ok(())
        })?;
    }

    let total_a = a.total_quantity()?;
    let total_b = b.total_quantity()?;
    Ok(DriftReport {
        step_a: a.state().step(),
        step_b: b.state().step(),
        side_a: a.side(),
        side_b: b.side(),
        total_delta: &total_b - &total_a,
        total_a,
        total_b,
        differing_cells,
        max_abs_difference,
        first_difference,
    })
}

/// One differing canonical cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellDrift {
    pub cell: Vec<i64>,
    pub value_a: BigInt,
    pub value_b: BigInt,
}

/// Structured drift report — all numeric fields are exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftReport {
    pub step_a: u64,
    pub step_b: u64,
    pub side_a: u64,
    pub side_b: u64,
    pub total_a: BigInt,
    pub total_b: BigInt,
    pub total_delta: BigInt,
    /// Canonical cells whose values differ.
    pub differing_cells: u64,
    pub max_abs_difference: BigInt,
    /// First differing cell in row-major order.
    pub first_difference: Option<CellDrift>,
}

impl DriftReport {
    pub fn is_identical(&self) -> bool {
        self.differing_cells == 0 && self.step_a == self.step_b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_kernel::engine::ToppleEngine;
    use aether_kernel::{Evolving, Family};

    #[test]
    fn test_same_model_has_no_drift() {
        let config = ModelConfig::single_source(2, Family::Aether, 500);
        let mut a = ToppleEngine::<i64>::new(config.clone()).unwrap();
        let mut b = ToppleEngine::<BigInt>::new(config).unwrap();
        for _ in 0..4 {
            a.step().unwrap();
            b.step().unwrap();
        }
        let report = compare_models(&a, &b).unwrap();
        assert!(report.is_identical());
        assert_eq!(report.total_delta, BigInt::from(0));
    }

    #[test]
    fn test_step_difference_is_drift() {
        let config = ModelConfig::single_source(2, Family::Sunflower, 2000);
        let mut a = ToppleEngine::<i64>::new(config.clone()).unwrap();
        let b = ToppleEngine::<i64>::new(config).unwrap();
        a.step().unwrap();
        let report = compare_models(&a, &b).unwrap();
        assert!(!report.is_identical());
        assert_eq!(report.step_a, 1);
        assert_eq!(report.side_b, 2);
        // conservation holds on both sides
        assert_eq!(report.total_delta, BigInt::from(0));
        let first = report.first_difference.unwrap();
        assert_eq!(first.cell, vec![0, 0]);
        assert_eq!(first.value_a, BigInt::from(400));
        assert_eq!(first.value_b, BigInt::from(2000));
        assert_eq!(report.max_abs_difference, BigInt::from(1600));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let a = ToppleEngine::<i64>::new(ModelConfig::single_source(2, Family::Aether, 1)).unwrap();
        let b = ToppleEngine::<i64>::new(ModelConfig::single_source(3, Family::Aether, 1)).unwrap();
        assert!(compare_models(&a, &b).is_err());
    }

    #[test]
    fn test_determinism() {
        let config = ModelConfig::single_source(3, Family::Aether, -1000);
        let hash = verify_determinism(&config, 8).unwrap();
        assert_eq!(hash.len(), 64);
    }
}
