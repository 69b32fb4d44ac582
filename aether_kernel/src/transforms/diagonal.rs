//! Diagonal cross-section: the points where `second = slope * first + offset`.
//!
//! The second axis is removed; the first keeps its place. Axes passed in
//! either order are normalized so that `first < second`.

use crate::coordinates::{AxisBounds, Coordinates, PartialCoordinates};
use crate::error::{LatticeError, Result};
use crate::model::{Evolving, Grid, LayerFlushed};
use crate::region::Region;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slope {
    Positive,
    Negative,
}

impl Slope {
    pub fn value(&self) -> i64 {
        match self {
            Slope::Positive => 1,
            Slope::Negative => -1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiagonalCrossSection<S> {
    source: S,
    first: usize,
    second: usize,
    slope: Slope,
    offset: i64,
}

impl<S: Region> DiagonalCrossSection<S> {
    pub fn new(
        source: S,
        first_axis: usize,
        second_axis: usize,
        slope: Slope,
        offset: i64,
    ) -> Result<Self> {
        let dimension = source.dimension();
        if dimension < 2 {
            return Err(LatticeError::InvalidArgument(
                "a diagonal cross-section needs at least two axes".to_string(),
            ));
        }
        if first_axis >= dimension || second_axis >= dimension || first_axis == second_axis {
            return Err(LatticeError::InvalidArgument(format!(
                "axes {} and {} must be distinct axes of a {}-dimensional region",
                first_axis, second_axis, dimension
            )));
        }
        // b = m*a + o  <=>  a = m*b - m*o  for m in {1, -1}
        let (first, second, offset) = if first_axis < second_axis {
            (first_axis, second_axis, offset)
        } else {
            (second_axis, first_axis, -slope.value() * offset)
        };
        let section = DiagonalCrossSection {
            source,
            first,
            second,
            slope,
            offset,
        };
        section.validate()?;
        Ok(section)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Normalized `(first, second, slope, offset)`.
    pub fn relation(&self) -> (usize, usize, Slope, i64) {
        (self.first, self.second, self.slope, self.offset)
    }

    fn second_of(&self, first: i64) -> i64 {
        self.slope.value() * first + self.offset
    }

    fn source_axis(&self, axis: usize) -> usize {
        if axis < self.second {
            axis
        } else {
            axis + 1
        }
    }

    fn to_source(&self, partial: &PartialCoordinates) -> PartialCoordinates {
        partial.insert_axis(self.second, AxisBounds::UNCONSTRAINED)
    }

    fn pinned(&self, source_partial: &PartialCoordinates, first: i64) -> PartialCoordinates {
        let mut out = source_partial.with_pin(self.first, first);
        out.pin(self.second, self.second_of(first));
        out
    }

    /// Values of the first axis where the relation meets the source.
    /// Empty when `lo > hi`.
    fn first_range(&self, source_partial: &PartialCoordinates) -> (i64, i64) {
        let mut lo = self.source.min_coordinate_within(self.first, source_partial);
        let mut hi = self.source.max_coordinate_within(self.first, source_partial);
        while lo <= hi && !self.source.is_satisfiable(&self.pinned(source_partial, lo)) {
            lo += 1;
        }
        while hi >= lo && !self.source.is_satisfiable(&self.pinned(source_partial, hi)) {
            hi -= 1;
        }
        (lo, hi)
    }

    fn axis_range(&self, axis: usize, partial: &PartialCoordinates) -> (i64, i64) {
        let source_partial = self.to_source(partial);
        let (lo, hi) = self.first_range(&source_partial);
        if axis == self.first {
            return (lo, hi);
        }
        let target = self.source_axis(axis);
        if lo == hi {
            let pinned = self.pinned(&source_partial, lo);
            return (
                self.source.min_coordinate_within(target, &pinned),
                self.source.max_coordinate_within(target, &pinned),
            );
        }
        let mut range: Option<(i64, i64)> = None;
        for first in lo..=hi {
            let pinned = self.pinned(&source_partial, first);
            if !self.source.is_satisfiable(&pinned) {
                continue;
            }
            let min = self.source.min_coordinate_within(target, &pinned);
            let max = self.source.max_coordinate_within(target, &pinned);
            range = Some(match range {
                Some((a, b)) => (a.min(min), b.max(max)),
                None => (min, max),
            });
        }
        range.unwrap_or((0, -1))
    }

    /// Fails when the relation no longer meets the source.
    pub fn validate(&self) -> Result<()> {
        let partial = PartialCoordinates::unconstrained(self.dimension());
        let (lo, hi) = self.first_range(&self.to_source(&partial));
        if lo <= hi {
            return Ok(());
        }
        Err(LatticeError::InconsistentBounds {
            transform: "diagonal cross-section",
            axis: Some(self.first),
            partial: partial.to_string(),
            reason: format!(
                "{} = {} * {} + {} never meets the source",
                self.source.axis_label(self.second),
                self.slope.value(),
                self.source.axis_label(self.first),
                self.offset
            ),
        })
    }
}

impl<S: Region> Region for DiagonalCrossSection<S> {
    fn dimension(&self) -> usize {
        self.source.dimension() - 1
    }

    fn min_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64 {
        self.axis_range(axis, partial).0
    }

    fn max_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64 {
        self.axis_range(axis, partial).1
    }

    fn axis_label(&self, axis: usize) -> String {
        self.source.axis_label(self.source_axis(axis))
    }
}

impl<S: Grid> Grid for DiagonalCrossSection<S> {
    type Value = S::Value;

    fn value_at(&self, coordinates: &Coordinates) -> Result<S::Value> {
        if !self.contains(coordinates.as_slice()) {
            return Err(LatticeError::out_of_bounds(coordinates.as_slice()));
        }
        let mut full = coordinates.as_slice().to_vec();
        full.insert(self.second, self.second_of(coordinates.get(self.first)));
        self.source.value_at(&Coordinates::new(full))
    }
}

impl<S: Region + Evolving> Evolving for DiagonalCrossSection<S> {
    fn step(&mut self) -> Result<bool> {
        let changed = self.source.step()?;
        self.validate()?;
        Ok(changed)
    }

    fn step_observed(&mut self, observer: &mut dyn FnMut(LayerFlushed)) -> Result<bool> {
        let changed = self.source.step_observed(observer)?;
        self.validate()?;
        Ok(changed)
    }

    fn current_step(&self) -> u64 {
        self.source.current_step()
    }

    fn is_stable(&self) -> bool {
        self.source.is_stable()
    }
}
