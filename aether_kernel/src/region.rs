//! The bounds model.
//!
//! A region is a set of lattice points described only by bound functions.
//! Two laws hold for every implementation:
//!
//! * conditioned bounds refine unconditioned ones: fixing or narrowing
//!   coordinates never widens the range reported for another axis;
//! * traversal-order independence: nested enumeration in any axis order
//!   visits the same point set.
//!
//! Queries also honor the constraint the partial puts on the queried axis
//! itself, so `min <= max` for every axis is exactly "some point of the
//! region satisfies the partial".

use crate::coordinates::{self, AxisBounds, Coordinates, PartialCoordinates};
use crate::error::{LatticeError, Result};
use crate::transforms::{CrossSection, DiagonalCrossSection, Slope, SubRegion};

pub trait Region {
    fn dimension(&self) -> usize;

    /// Smallest coordinate on `axis` among points satisfying `partial`.
    /// Greater than the max when no point does.
    fn min_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64;

    fn max_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64;

    fn min_coordinate(&self, axis: usize) -> i64 {
        self.min_coordinate_within(axis, &PartialCoordinates::unconstrained(self.dimension()))
    }

    fn max_coordinate(&self, axis: usize) -> i64 {
        self.max_coordinate_within(axis, &PartialCoordinates::unconstrained(self.dimension()))
    }

    fn axis_label(&self, axis: usize) -> String {
        coordinates::axis_label(self.dimension(), axis)
    }

    fn is_satisfiable(&self, partial: &PartialCoordinates) -> bool {
        if partial.dimension() != self.dimension() || partial.is_empty() {
            return false;
        }
        (0..self.dimension()).all(|axis| {
            self.min_coordinate_within(axis, partial) <= self.max_coordinate_within(axis, partial)
        })
    }

    fn contains(&self, coordinates: &[i64]) -> bool {
        coordinates.len() == self.dimension()
            && self.is_satisfiable(&PartialCoordinates::pinned(coordinates))
    }
}

impl<R: Region + ?Sized> Region for &R {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn min_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64 {
        (**self).min_coordinate_within(axis, partial)
    }

    fn max_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64 {
        (**self).max_coordinate_within(axis, partial)
    }

    fn axis_label(&self, axis: usize) -> String {
        (**self).axis_label(axis)
    }
}

impl<R: Region + ?Sized> Region for Box<R> {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn min_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64 {
        (**self).min_coordinate_within(axis, partial)
    }

    fn max_coordinate_within(&self, axis: usize, partial: &PartialCoordinates) -> i64 {
        (**self).max_coordinate_within(axis, partial)
    }

    fn axis_label(&self, axis: usize) -> String {
        (**self).axis_label(axis)
    }
}

/// Enumeration and transform constructors for every region.
pub trait RegionExt: Region {
    /// Visit every point with nested loops, `order[0]` outermost.
    fn for_each_point_in_order<F>(&self, order: &[usize], mut visit: F) -> Result<()>
    where
        F: FnMut(&Coordinates),
    {
        check_permutation(order, self.dimension())?;
        let mut partial = PartialCoordinates::unconstrained(self.dimension());
        let mut point = vec![0i64; self.dimension()];
        enumerate(self, order, 0, &mut partial, &mut point, &mut visit);
        Ok(())
    }

    fn for_each_point<F>(&self, mut visit: F)
    where
        F: FnMut(&Coordinates),
    {
        let order: Vec<usize> = (0..self.dimension()).collect();
        let mut partial = PartialCoordinates::unconstrained(self.dimension());
        let mut point = vec![0i64; self.dimension()];
        enumerate(self, &order, 0, &mut partial, &mut point, &mut visit);
    }

    fn points(&self) -> Vec<Coordinates> {
        let mut out = Vec::new();
        self.for_each_point(|c| out.push(c.clone()));
        out
    }

    fn point_count(&self) -> u64 {
        let mut count = 0u64;
        self.for_each_point(|_| count += 1);
        count
    }

    fn sub_region(self, bounds: Vec<AxisBounds>) -> Result<SubRegion<Self>>
    where
        Self: Sized,
    {
        SubRegion::new(self, bounds)
    }

    fn cross_section(self, axis: usize, coordinate: i64) -> Result<CrossSection<Self>>
    where
        Self: Sized,
    {
        CrossSection::new(self, axis, coordinate)
    }

    fn diagonal_cross_section(
        self,
        first_axis: usize,
        second_axis: usize,
        slope: Slope,
        offset: i64,
    ) -> Result<DiagonalCrossSection<Self>>
    where
        Self: Sized,
    {
        DiagonalCrossSection::new(self, first_axis, second_axis, slope, offset)
    }
}

impl<R: Region + ?Sized> RegionExt for R {}

fn check_permutation(order: &[usize], dimension: usize) -> Result<()> {
    let mut seen = vec![false; dimension];
    if order.len() != dimension {
        return Err(LatticeError::InvalidArgument(format!(
            "traversal order {:?} does not cover {} axes",
            order, dimension
        )));
    }
    for &axis in order {
        if axis >= dimension || seen[axis] {
            return Err(LatticeError::InvalidArgument(format!(
                "traversal order {:?} is not a permutation of the axes",
                order
            )));
        }
        seen[axis] = true;
    }
    Ok(())
}

fn enumerate<R, F>(
    region: &R,
    order: &[usize],
    depth: usize,
    partial: &mut PartialCoordinates,
    point: &mut Vec<i64>,
    visit: &mut F,
) where
    R: Region + ?Sized,
    F: FnMut(&Coordinates),
{
    if depth == order.len() {
        visit(&Coordinates::from(point.as_slice()));
        return;
    }
    let axis = order[depth];
    let lo = region.min_coordinate_within(axis, partial);
    let hi = region.max_coordinate_within(axis, partial);
    let saved = partial.axis(axis);
    for value in lo..=hi {
        partial.set(axis, AxisBounds::fixed(value));
        point[axis] = value;
        enumerate(region, order, depth + 1, partial, point, visit);
    }
    partial.set(axis, saved);
}

/// Intersect `[lower, upper]` with the constraint `partial` puts on `axis`.
pub(crate) fn clamp_to_partial(
    partial: &PartialCoordinates,
    axis: usize,
    lower: i64,
    upper: i64,
) -> (i64, i64) {
    partial.axis(axis).clamp(lower, upper)
}
