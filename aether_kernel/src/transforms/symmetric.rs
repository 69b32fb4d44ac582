//! Views of a symmetric automaton.
//!
//! `AsymmetricSection` exposes the stored canonical orthant
//! `side - 1 >= x0 >= x1 >= ... >= x(N-1) >= 0`; `WholeGrid` exposes the
//! full box `[-(side - 1), side - 1]^N`, folding every query onto the
//! orthant.

use crate::coordinates::{Coordinates, PartialCoordinates};
use crate::error::{LatticeError, Result};
use crate::model::{Automaton, Evolving, Grid, LayerFlushed};
use crate::region::{clamp_to_partial, Region};
use crate::symmetry::fold;

fn outer(automaton: &impl Automaton) -> i64 {
    automaton.side() as i64 - 1
}

#[derive(Debug, Clone)]
pub struct AsymmetricSection<A> {
    automaton: A,
}

impl<A: Automaton> AsymmetricSection<A> {
    pub fn new(automaton: A) -> Self {
        AsymmetricSection { automaton }
    }

    pub fn automaton(&self) -> &A {
        &self.automaton
    }

    pub fn into_inner(self) -> A {
        self.automaton
    }
}

impl<A: Automaton> Region for AsymmetricSection<A> {
    fn dimension(&self) -> usize {
        self.automaton.dimension()
    }

    // x_i >= x_j for every j > i, and x_i >= 0
    fn min_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64 {
        (axis..self.dimension())
            .filter_map(|j| partial.lower(j))
            .fold(0, i64::max)
    }

    // x_i <= x_j for every j < i, and x_i <= side - 1
    fn max_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64 {
        (0..=axis)
            .filter_map(|j| partial.upper(j))
            .fold(outer(&self.automaton), i64::min)
    }
}

impl<A: Automaton> Grid for AsymmetricSection<A> {
    type Value = A::Value;

    fn value_at(&self, coordinates: &Coordinates) -> Result<A::Value> {
        if !self.contains(coordinates.as_slice()) {
            return Err(LatticeError::out_of_bounds(coordinates.as_slice()));
        }
        self.automaton.canonical_value(coordinates.as_slice())
    }
}

impl<A: Automaton + Evolving> Evolving for AsymmetricSection<A> {
    fn step(&mut self) -> Result<bool> {
        self.automaton.step()
    }

    fn step_observed(&mut self, observer: &mut dyn FnMut(LayerFlushed)) -> Result<bool> {
        self.automaton.step_observed(observer)
    }

    fn current_step(&self) -> u64 {
        self.automaton.current_step()
    }

    fn is_stable(&self) -> bool {
        self.automaton.is_stable()
    }
}

#[derive(Debug, Clone)]
pub struct WholeGrid<A> {
    automaton: A,
}

impl<A: Automaton> WholeGrid<A> {
    pub fn new(automaton: A) -> Self {
        WholeGrid { automaton }
    }

    pub fn automaton(&self) -> &A {
        &self.automaton
    }

    pub fn into_inner(self) -> A {
        self.automaton
    }
}

impl<A: Automaton> Region for WholeGrid<A> {
    fn dimension(&self) -> usize {
        self.automaton.dimension()
    }

    fn min_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64 {
        let edge = outer(&self.automaton);
        clamp_to_partial(partial, axis, -edge, edge).0
    }

    fn max_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64 {
        let edge = outer(&self.automaton);
        clamp_to_partial(partial, axis, -edge, edge).1
    }
}

impl<A: Automaton> Grid for WholeGrid<A> {
    type Value = A::Value;

    fn value_at(&self, coordinates: &Coordinates) -> Result<A::Value> {
        if !self.contains(coordinates.as_slice()) {
            return Err(LatticeError::out_of_bounds(coordinates.as_slice()));
        }
        self.automaton.canonical_value(&fold(coordinates.as_slice()))
    }
}

impl<A: Automaton + Evolving> Evolving for WholeGrid<A> {
    fn step(&mut self) -> Result<bool> {
        self.automaton.step()
    }

    fn step_observed(&mut self, observer: &mut dyn FnMut(LayerFlushed)) -> Result<bool> {
        self.automaton.step_observed(observer)
    }

    fn current_step(&self) -> u64 {
        self.automaton.current_step()
    }

    fn is_stable(&self) -> bool {
        self.automaton.is_stable()
    }
}
