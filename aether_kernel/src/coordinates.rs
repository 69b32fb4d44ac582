//! Lattice points and partial assignments.

use std::fmt;

/// A full lattice point. The dimension is the length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinates(Vec<i64>);

impl Coordinates {
    pub fn new(values: Vec<i64>) -> Self {
        Coordinates(values)
    }

    pub fn origin(dimension: usize) -> Self {
        Coordinates(vec![0; dimension])
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, axis: usize) -> i64 {
        self.0[axis]
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<i64> {
        self.0
    }
}

impl From<Vec<i64>> for Coordinates {
    fn from(values: Vec<i64>) -> Self {
        Coordinates(values)
    }
}

impl From<&[i64]> for Coordinates {
    fn from(values: &[i64]) -> Self {
        Coordinates(values.to_vec())
    }
}

impl AsRef<[i64]> for Coordinates {
    fn as_ref(&self) -> &[i64] {
        &self.0
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

/// Closed interval constraint on one axis. `None` ends are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisBounds {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl AxisBounds {
    pub const UNCONSTRAINED: AxisBounds = AxisBounds { min: None, max: None };

    pub fn fixed(value: i64) -> Self {
        AxisBounds {
            min: Some(value),
            max: Some(value),
        }
    }

    pub fn range(min: Option<i64>, max: Option<i64>) -> Self {
        AxisBounds { min, max }
    }

    /// The pinned value, if the interval is a single point.
    pub fn fixed_value(&self) -> Option<i64> {
        match (self.min, self.max) {
            (Some(a), Some(b)) if a == b => Some(a),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!((self.min, self.max), (Some(a), Some(b)) if a > b)
    }

    pub fn is_unconstrained(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn intersect(&self, other: &AxisBounds) -> AxisBounds {
        let min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        AxisBounds { min, max }
    }

    /// Raise `lower` / lower `upper` to this interval.
    pub fn clamp(&self, lower: i64, upper: i64) -> (i64, i64) {
        let lo = self.min.map_or(lower, |m| m.max(lower));
        let hi = self.max.map_or(upper, |m| m.min(upper));
        (lo, hi)
    }
}

impl fmt::Display for AxisBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(v) = self.fixed_value() {
            return write!(f, "{}", v);
        }
        match (self.min, self.max) {
            (None, None) => write!(f, "_"),
            (lo, hi) => {
                let lo = lo.map_or_else(|| "-inf".to_string(), |v| v.to_string());
                let hi = hi.map_or_else(|| "+inf".to_string(), |v| v.to_string());
                write!(f, "[{}, {}]", lo, hi)
            }
        }
    }
}

/// One optional constraint per axis.
///
/// Bound queries are answered "given these constraints"; transforms push
/// their own boxes and pins in here before delegating to their source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialCoordinates {
    axes: Vec<AxisBounds>,
}

impl PartialCoordinates {
    pub fn unconstrained(dimension: usize) -> Self {
        PartialCoordinates {
            axes: vec![AxisBounds::UNCONSTRAINED; dimension],
        }
    }

    /// Builds from per-axis fixed values, `None` leaving the axis free.
    pub fn from_fixed(values: &[Option<i64>]) -> Self {
        PartialCoordinates {
            axes: values
                .iter()
                .map(|v| v.map_or(AxisBounds::UNCONSTRAINED, AxisBounds::fixed))
                .collect(),
        }
    }

    pub fn from_bounds(axes: Vec<AxisBounds>) -> Self {
        PartialCoordinates { axes }
    }

    pub fn pinned(coordinates: &[i64]) -> Self {
        PartialCoordinates {
            axes: coordinates.iter().map(|&v| AxisBounds::fixed(v)).collect(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.axes.len()
    }

    pub fn axis(&self, axis: usize) -> AxisBounds {
        self.axes[axis]
    }

    pub fn axes(&self) -> &[AxisBounds] {
        &self.axes
    }

    pub fn lower(&self, axis: usize) -> Option<i64> {
        self.axes[axis].min
    }

    pub fn upper(&self, axis: usize) -> Option<i64> {
        self.axes[axis].max
    }

    pub fn fixed(&self, axis: usize) -> Option<i64> {
        self.axes[axis].fixed_value()
    }

    /// Intersect the constraint on `axis` with `bounds`.
    pub fn restrict(&mut self, axis: usize, bounds: AxisBounds) {
        self.axes[axis] = self.axes[axis].intersect(&bounds);
    }

    pub fn with_restriction(&self, axis: usize, bounds: AxisBounds) -> Self {
        let mut out = self.clone();
        out.restrict(axis, bounds);
        out
    }

    /// Intersect with `value` on `axis`. Pinning outside the existing
    /// constraint leaves an empty interval.
    pub fn pin(&mut self, axis: usize, value: i64) {
        self.restrict(axis, AxisBounds::fixed(value));
    }

    pub fn with_pin(&self, axis: usize, value: i64) -> Self {
        self.with_restriction(axis, AxisBounds::fixed(value))
    }

    pub fn set(&mut self, axis: usize, bounds: AxisBounds) {
        self.axes[axis] = bounds;
    }

    pub fn insert_axis(&self, axis: usize, bounds: AxisBounds) -> Self {
        let mut axes = self.axes.clone();
        axes.insert(axis, bounds);
        PartialCoordinates { axes }
    }

    pub fn remove_axis(&self, axis: usize) -> Self {
        let mut axes = self.axes.clone();
        axes.remove(axis);
        PartialCoordinates { axes }
    }

    /// True if some axis has an empty interval.
    pub fn is_empty(&self) -> bool {
        self.axes.iter().any(AxisBounds::is_empty)
    }

    /// The full point, if every axis is pinned.
    pub fn to_coordinates(&self) -> Option<Coordinates> {
        self.axes
            .iter()
            .map(AxisBounds::fixed_value)
            .collect::<Option<Vec<_>>>()
            .map(Coordinates)
    }
}

impl fmt::Display for PartialCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, a) in self.axes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", a)?;
        }
        write!(f, ")")
    }
}

/// Default label for `axis` in a `dimension`-dimensional region.
///
/// `x, y, z` up to three axes; letters ending at `z` up to 26 axes;
/// `x1, x2, ...` beyond that.
pub fn axis_label(dimension: usize, axis: usize) -> String {
    if dimension <= 3 {
        ["x", "y", "z"][axis].to_string()
    } else if dimension <= 26 {
        let first = b'z' - (dimension as u8 - 1);
        char::from(first + axis as u8).to_string()
    } else {
        format!("x{}", axis + 1)
    }
}
