//! Intersection of a region with an axis-aligned box.

use crate::coordinates::{AxisBounds, Coordinates, PartialCoordinates};
use crate::error::{LatticeError, Result};
use crate::model::{Evolving, Grid, LayerFlushed};
use crate::region::Region;

#[derive(Debug, Clone)]
pub struct SubRegion<S> {
    source: S,
    bounds: Vec<AxisBounds>,
}

impl<S: Region> SubRegion<S> {
    /// `bounds` has one entry per axis; open ends follow the source.
    pub fn new(source: S, bounds: Vec<AxisBounds>) -> Result<Self> {
        if bounds.len() != source.dimension() {
            return Err(LatticeError::InvalidArgument(format!(
                "{} axis bounds for a {}-dimensional region",
                bounds.len(),
                source.dimension()
            )));
        }
        if let Some(axis) = bounds.iter().position(AxisBounds::is_empty) {
            return Err(LatticeError::InvalidArgument(format!(
                "min is greater than max on axis {} ({})",
                source.axis_label(axis),
                bounds[axis]
            )));
        }
        let region = SubRegion { source, bounds };
        region.validate()?;
        Ok(region)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    pub fn bounds(&self) -> &[AxisBounds] {
        &self.bounds
    }

    fn constrain(&self, partial: &PartialCoordinates) -> PartialCoordinates {
        let mut out = partial.clone();
        for (axis, bounds) in self.bounds.iter().enumerate() {
            out.restrict(axis, *bounds);
        }
        out
    }

    /// Fails when the box no longer meets the source.
    pub fn validate(&self) -> Result<()> {
        let partial = self.constrain(&PartialCoordinates::unconstrained(self.dimension()));
        for axis in 0..self.dimension() {
            let lo = self.source.min_coordinate_within(axis, &partial);
            let hi = self.source.max_coordinate_within(axis, &partial);
            if lo > hi {
                return Err(LatticeError::InconsistentBounds {
                    transform: "sub-region",
                    axis: Some(axis),
                    partial: partial.to_string(),
                    reason: format!(
                        "{} in {} does not meet the source range [{}, {}]",
                        self.source.axis_label(axis),
                        self.bounds[axis],
                        self.source.min_coordinate(axis),
                        self.source.max_coordinate(axis)
                    ),
                });
            }
        }
        Ok(())
    }
}

impl<S: Region> Region for SubRegion<S> {
    fn dimension(&self) -> usize {
        self.source.dimension()
    }

    fn min_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64 {
        self.source.min_coordinate_within(axis, &self.constrain(partial))
    }

    fn max_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64 {
        self.source.max_coordinate_within(axis, &self.constrain(partial))
    }

    fn axis_label(&self, axis: usize) -> String {
        self.source.axis_label(axis)
    }
}

impl<S: Grid> Grid for SubRegion<S> {
    type Value = S::Value;

    fn value_at(&self, coordinates: &Coordinates) -> Result<S::Value> {
        if !self.contains(coordinates.as_slice()) {
            return Err(LatticeError::out_of_bounds(coordinates.as_slice()));
        }
        self.source.value_at(coordinates)
    }
}

impl<S: Region + Evolving> Evolving for SubRegion<S> {
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
