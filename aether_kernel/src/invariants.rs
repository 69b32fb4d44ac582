/// Model invariant checks.
///
/// Two flavors, as everywhere in the kernel: `validate_*` panics on the
/// first failure (tests, debug assertions), `try_validate_*` returns
/// `Err(message)` so restore paths can reject a model without aborting.

use std::collections::BTreeSet;

use num_bigint::BigInt;

use crate::arithmetic::CellValue;
use crate::coordinates::Coordinates;
use crate::model::Automaton;
use crate::region::{Region, RegionExt};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Conservation and the empty outer layer. Panics on the first failure.
pub fn validate_invariants<A: Automaton + ?Sized>(automaton: &A, expected_total: &BigInt) {
    if let Err(message) = try_validate_invariants(automaton, expected_total) {
        panic!("Invariant violation: {}", message);
    }
}

pub fn try_validate_invariants<A: Automaton + ?Sized>(
    automaton: &A,
    expected_total: &BigInt,
) -> Result<(), String> {
    try_check_outer_layer(automaton)?;
    try_check_conservation(automaton, expected_total)?;
    Ok(())
}

/// Total quantity must equal `expected`.
pub fn check_conservation<A: Automaton + ?Sized>(automaton: &A, expected: &BigInt) {
    if let Err(message) = try_check_conservation(automaton, expected) {
        panic!("Invariant violation: {}", message);
    }
}

pub fn try_check_conservation<A: Automaton + ?Sized>(
    automaton: &A,
    expected: &BigInt,
) -> Result<(), String> {
    let total = automaton
        .total_quantity()
        .map_err(|e| format!("[INVARIANT:conservation] could not total the grid: {}", e))?;
    if &total != expected {
        return Err(format!(
            "[INVARIANT:conservation] total quantity {} at step {}, expected {}",
            total,
            automaton.state().step(),
            expected
        ));
    }
    Ok(())
}

/// Every cell of the outermost stored layer is zero.
pub fn check_outer_layer<A: Automaton + ?Sized>(automaton: &A) {
    if let Err(message) = try_check_outer_layer(automaton) {
        panic!("Invariant violation: {}", message);
    }
}

pub fn try_check_outer_layer<A: Automaton + ?Sized>(automaton: &A) -> Result<(), String> {
    let outer = automaton.side().saturating_sub(1) as i64;
    let mut offending: Option<Vec<i64>> = None;
    automaton
        .for_each_canonical(&mut |cell, value| {
            if offending.is_none() && cell.first() == Some(&outer) && !value.is_zero() {
                offending = Some(cell.to_vec());
            }
            Ok(())
        })
        .map_err(|e| format!("[INVARIANT:outer_layer] could not read the grid: {}", e))?;
    match offending {
        Some(cell) => Err(format!(
            "[INVARIANT:outer_layer] cell {:?} on outer layer {} is not zero",
            cell, outer
        )),
        None => Ok(()),
    }
}

/// Enumerating the region in any axis order visits the same points, and
/// every visited point is contained in the region.
pub fn check_bounds_consistency<R: Region + ?Sized>(region: &R) {
    if let Err(message) = try_check_bounds_consistency(region) {
        panic!("Invariant violation: {}", message);
    }
}

pub fn try_check_bounds_consistency<R: Region + ?Sized>(region: &R) -> Result<(), String> {
    let dimension = region.dimension();
    let mut reference: Option<BTreeSet<Vec<i64>>> = None;
    for order in permutations(dimension) {
        let mut points = BTreeSet::new();
        let mut outside: Option<Vec<i64>> = None;
        region
            .for_each_point_in_order(&order, |point: &Coordinates| {
                if outside.is_none() && !region.contains(point.as_slice()) {
                    outside = Some(point.as_slice().to_vec());
                }
                points.insert(point.as_slice().to_vec());
            })
            .map_err(|e| {
                format!("[INVARIANT:bounds] enumeration in order {:?} failed: {}", order, e)
            })?;
        if let Some(point) = outside {
            return Err(format!(
                "[INVARIANT:bounds] order {:?} visits {:?} which the region does not contain",
                order, point
            ));
        }
        if let Some(expected) = &reference {
            if *expected != points {
                return Err(format!(
                    "[INVARIANT:bounds] order {:?} visits {} points, identity order visits {}",
                    order,
                    points.len(),
                    expected.len()
                ));
            }
        } else {
            reference = Some(points);
        }
    }
    Ok(())
}

/// All orderings of `0..n`, identity first.
pub fn permutations(n: usize) -> Vec<Vec<usize>> {
    fn extend(prefix: &mut Vec<usize>, used: &mut [bool], out: &mut Vec<Vec<usize>>) {
        if prefix.len() == used.len() {
            out.push(prefix.clone());
            return;
        }
        for axis in 0..used.len() {
            if !used[axis] {
                used[axis] = true;
                prefix.push(axis);
                extend(prefix, used, out);
                prefix.pop();
                used[axis] = false;
            }
        }
    }
    let mut out = Vec::new();
    extend(&mut Vec::with_capacity(n), &mut vec![false; n], &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::engine::ToppleEngine;
    use crate::model::Evolving;
    use crate::rule::Family;

    #[test]
    fn test_permutations_count_and_identity() {
        let all = permutations(4);
        assert_eq!(all.len(), 24);
        assert_eq!(all[0], vec![0, 1, 2, 3]);
        assert_eq!(permutations(0), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn test_evolving_model_keeps_invariants() {
        let mut engine =
            ToppleEngine::<i64>::new(ModelConfig::single_source(3, Family::Aether, -800)).unwrap();
        let total = BigInt::from(-800);
        for _ in 0..15 {
            engine.step().unwrap();
            validate_invariants(&engine, &total);
        }
    }

    #[test]
    fn test_conservation_failure_is_reported() {
        let config = ModelConfig::single_source(2, Family::Sunflower, 100);
        let engine = ToppleEngine::<i64>::new(config).unwrap();
        let err = try_check_conservation(&engine, &BigInt::from(99)).unwrap_err();
        assert!(err.contains("[INVARIANT:conservation]"));
    }

    #[test]
    #[should_panic(expected = "Invariant violation")]
    fn test_validate_panics() {
        let config = ModelConfig::single_source(2, Family::Sunflower, 100);
        let engine = ToppleEngine::<i64>::new(config).unwrap();
        check_conservation(&engine, &BigInt::from(1));
    }

    #[test]
    fn test_sections_are_consistent() {
        let config = ModelConfig::single_source(3, Family::Sunflower, 2000);
        let mut engine = ToppleEngine::<i64>::new(config).unwrap();
        for _ in 0..6 {
            engine.step().unwrap();
        }
        check_bounds_consistency(&engine.asymmetric_section());
        check_bounds_consistency(&engine.whole_grid());
    }
}
