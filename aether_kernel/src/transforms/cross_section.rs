//! Axis-aligned cross-section: one axis pinned, dimension drops by one.

use crate::coordinates::{AxisBounds, Coordinates, PartialCoordinates};
use crate::error::{LatticeError, Result};
use crate::model::{Evolving, Grid, LayerFlushed};
use crate::region::Region;

#[derive(Debug, Clone)]
pub struct CrossSection<S> {
    source: S,
    axis: usize,
    coordinate: i64,
}

impl<S: Region> CrossSection<S> {
    pub fn new(source: S, axis: usize, coordinate: i64) -> Result<Self> {
        if source.dimension() < 2 {
            return Err(LatticeError::InvalidArgument(
                "a cross-section needs at least two axes".to_string(),
            ));
        }
        if axis >= source.dimension() {
            return Err(LatticeError::InvalidArgument(format!(
                "axis {} out of range for a {}-dimensional region",
                axis,
                source.dimension()
            )));
        }
        let section = CrossSection { source, axis, coordinate };
        section.validate()?;
        Ok(section)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn coordinate(&self) -> i64 {
        self.coordinate
    }

    fn source_axis(&self, axis: usize) -> usize {
        if axis < self.axis {
            axis
        } else {
            axis + 1
        }
    }

    fn to_source(&self, partial: &PartialCoordinates) -> PartialCoordinates {
        partial.insert_axis(self.axis, AxisBounds::fixed(self.coordinate))
    }

    /// Fails when the pinned coordinate left the source.
    pub fn validate(&self) -> Result<()> {
        let pinned = self.to_source(&PartialCoordinates::unconstrained(self.dimension()));
        if self.source.is_satisfiable(&pinned) {
            return Ok(());
        }
        Err(LatticeError::InconsistentBounds {
            transform: "cross-section",
            axis: Some(self.axis),
            partial: pinned.to_string(),
            reason: format!(
                "{} = {} is outside the source range [{}, {}]",
                self.source.axis_label(self.axis),
                self.coordinate,
                self.source.min_coordinate(self.axis),
                self.source.max_coordinate(self.axis)
            ),
        })
    }
}

impl<S: Region> Region for CrossSection<S> {
    fn dimension(&self) -> usize {
        self.source.dimension() - 1
    }

    fn min_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64 {
        self.source
            .min_coordinate_within(self.source_axis(axis), &self.to_source(partial))
    }

    fn max_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64 {
        self.source
            .max_coordinate_within(self.source_axis(axis), &self.to_source(partial))
    }

    fn axis_label(&self, axis: usize) -> String {
        self.source.axis_label(self.source_axis(axis))
    }
}

impl<S: Grid> Grid for CrossSection<S> {
    type Value = S::Value;

    fn value_at(&self, coordinates: &Coordinates) -> Result<S::Value> {
        if !self.contains(coordinates.as_slice()) {
            return Err(LatticeError::out_of_bounds(coordinates.as_slice()));
        }
        let mut full = coordinates.as_slice().to_vec();
        full.insert(self.axis, self.coordinate);
        self.source.value_at(&Coordinates::new(full))
    }
}

impl<S: Region + Evolving> Evolving for CrossSection<S> {
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
