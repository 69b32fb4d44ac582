//! Region transforms over live models: bounds consistency, cross-section
//! round trips, sub-region validation.

use proptest::prelude::*;

use aether_kernel::config::ModelConfig;
use aether_kernel::engine::ToppleEngine;
use aether_kernel::invariants::try_check_bounds_consistency;
use aether_kernel::transforms::{Slope, WholeGrid};
use aether_kernel::{
    Automaton, AxisBounds, Coordinates, Evolving, Family, Grid, LatticeError, Region, RegionExt,
};

fn stepped(dimension: usize, family: Family, seed: i64, steps: usize) -> ToppleEngine<i64> {
    let mut engine =
        ToppleEngine::<i64>::new(ModelConfig::single_source(dimension, family, seed)).unwrap();
    for _ in 0..steps {
        engine.step().unwrap();
    }
    engine
}

fn family() -> impl Strategy<Value = Family> {
    prop_oneof![Just(Family::Aether), Just(Family::Sunflower)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn asymmetric_section_bounds_are_consistent(
        dimension in 1usize..=5,
        family in family(),
        seed in -2000i64..2000,
        steps in 0usize..4,
    ) {
        let engine = stepped(dimension, family, seed, steps);
        let section = engine.asymmetric_section();
        prop_assert_eq!(try_check_bounds_consistency(&section), Ok(()));
    }

    #[test]
    fn bounded_views_are_consistent(
        dimension in 2usize..=4,
        family in family(),
        seed in -1500i64..1500,
        steps in 0usize..3,
        low in -1i64..=0,
        width in 0i64..4,
        pin in 0i64..2,
    ) {
        let engine = stepped(dimension, family, seed, steps);
        let mut bounds = vec![AxisBounds::UNCONSTRAINED; dimension];
        bounds[0] = AxisBounds::range(Some(low), Some(low + width));
        bounds[dimension - 1] = AxisBounds::range(Some(low - 1), Some(low + width + 1));

        let boxed = engine.whole_grid().sub_region(bounds).unwrap();
        prop_assert_eq!(try_check_bounds_consistency(&boxed), Ok(()));

        let orthant_box = engine
            .asymmetric_section()
            .sub_region(vec![AxisBounds::range(Some(1), Some(2)); dimension]);
        if let Ok(orthant_box) = orthant_box {
            prop_assert_eq!(try_check_bounds_consistency(&orthant_box), Ok(()));
        }

        let section = engine.asymmetric_section().cross_section(dimension - 1, pin).unwrap();
        prop_assert_eq!(try_check_bounds_consistency(&section), Ok(()));
    }

    #[test]
    fn diagonal_views_are_consistent(
        dimension in 2usize..=3,
        seed in -1500i64..1500,
        steps in 0usize..3,
        offset in -1i64..=1,
        negative in any::<bool>(),
    ) {
        let engine = stepped(dimension, Family::Aether, seed, steps);
        let slope = if negative { Slope::Negative } else { Slope::Positive };
        let diagonal =
            engine.whole_grid().diagonal_cross_section(0, dimension - 1, slope, offset).unwrap();
        prop_assert_eq!(try_check_bounds_consistency(&diagonal), Ok(()));
        let orthant = engine
            .asymmetric_section()
            .diagonal_cross_section(dimension - 1, 0, Slope::Positive, 0)
            .unwrap();
        prop_assert_eq!(try_check_bounds_consistency(&orthant), Ok(()));
    }
}

#[test]
fn asymmetric_section_matches_canonical_layout() {
    let engine = stepped(3, Family::Sunflower, 3000, 4);
    let section = engine.asymmetric_section();
    let side = engine.side() as i64;
    assert_eq!(section.min_coordinate(0), 0);
    assert_eq!(section.max_coordinate(0), side - 1);
    let mut stored = 0u64;
    engine
        .for_each_canonical(&mut |_, _| {
            stored += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(section.point_count(), stored);
    for point in section.points() {
        let c = point.as_slice();
        assert!(c[0] >= c[1] && c[1] >= c[2] && c[2] >= 0);
    }
}

#[test]
fn owned_cross_section_round_trips_every_step() {
    let engine =
        ToppleEngine::<i64>::new(ModelConfig::single_source(3, Family::Aether, -2500)).unwrap();
    let mut section = WholeGrid::new(engine).cross_section(1, 1).unwrap();
    for _ in 0..12 {
        section.step().unwrap();
        let whole = section.source();
        for point in section.points() {
            let c = point.as_slice();
            let full = Coordinates::new(vec![c[0], 1, c[1]]);
            assert_eq!(section.value_at(&point).unwrap(), whole.value_at(&full).unwrap());
        }
        assert_eq!(section.axis_label(0), "x");
        assert_eq!(section.axis_label(1), "z");
    }
}

#[test]
fn owned_diagonal_round_trips_every_step() {
    let engine =
        ToppleEngine::<i64>::new(ModelConfig::single_source(2, Family::Sunflower, 6000)).unwrap();
    let mut diagonal = WholeGrid::new(engine)
        .diagonal_cross_section(1, 0, Slope::Negative, 2)
        .unwrap();
    // normalized: y = -x + 2  <=>  x = -y + 2, so the kept axis is x
    assert_eq!(diagonal.relation(), (0, 1, Slope::Negative, 2));
    for _ in 0..10 {
        diagonal.step().unwrap();
        let whole = diagonal.source();
        assert!(diagonal.point_count() > 0);
        for point in diagonal.points() {
            let x = point.get(0);
            let full = Coordinates::new(vec![x, 2 - x]);
            assert_eq!(diagonal.value_at(&point).unwrap(), whole.value_at(&full).unwrap());
        }
    }
}

#[test]
fn sub_region_with_inverted_bounds_is_rejected() {
    let engine = stepped(2, Family::Aether, 100, 1);
    let err = engine
        .whole_grid()
        .sub_region(vec![AxisBounds::range(Some(3), Some(1)), AxisBounds::UNCONSTRAINED])
        .unwrap_err();
    assert!(matches!(err, LatticeError::InvalidArgument(_)));
}

#[test]
fn sub_region_outside_the_grid_is_inconsistent() {
    let engine = stepped(2, Family::Aether, 100, 1);
    let err = engine
        .whole_grid()
        .sub_region(vec![AxisBounds::range(Some(50), Some(60)), AxisBounds::UNCONSTRAINED])
        .unwrap_err();
    match err {
        LatticeError::InconsistentBounds { transform, axis, .. } => {
            assert_eq!(transform, "sub-region");
            assert_eq!(axis, Some(0));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn sub_region_conflicting_with_orthant_order_is_inconsistent() {
    let engine = stepped(2, Family::Aether, 100, 3);
    // x in [0, 0] but y in [1, 1] violates x >= y
    let err = engine
        .asymmetric_section()
        .sub_region(vec![AxisBounds::fixed(0), AxisBounds::fixed(1)])
        .unwrap_err();
    assert!(matches!(err, LatticeError::InconsistentBounds { .. }));
}

#[test]
fn cross_section_past_the_edge_is_inconsistent() {
    let engine = stepped(3, Family::Aether, 100, 1);
    let edge = engine.side() as i64;
    let err = engine.whole_grid().cross_section(2, edge).unwrap_err();
    assert!(matches!(err, LatticeError::InconsistentBounds { .. }));
}

#[test]
fn diagonal_that_misses_the_grid_is_inconsistent() {
    let engine = stepped(2, Family::Aether, 100, 1);
    let err = engine
        .asymmetric_section()
        .diagonal_cross_section(0, 1, Slope::Positive, 1)
        .unwrap_err();
    assert!(matches!(err, LatticeError::InconsistentBounds { .. }));
}

#[test]
fn cross_section_of_one_dimension_is_invalid() {
    let engine = stepped(1, Family::Aether, 100, 1);
    let err = engine.whole_grid().cross_section(0, 0).unwrap_err();
    assert!(matches!(err, LatticeError::InvalidArgument(_)));
}

#[test]
fn value_outside_a_view_is_out_of_bounds() {
    let engine = stepped(2, Family::Aether, 100, 2);
    let section = engine.asymmetric_section();
    let err = section.value_at(&Coordinates::new(vec![0, 1])).unwrap_err();
    assert!(matches!(err, LatticeError::OutOfBounds { .. }));
}
