//! Canonical-orthant storage.
//!
//! Both backends use the same ragged row-major layout. The offset of a
//! canonical cell `x` is `sum_i C(x_i + N - i - 1, N - i)`; outer layer
//! `k` (all cells with `x0 == k`) occupies the contiguous range
//! `[C(k + N - 1, N), C(k + N, N))`, so adding a layer appends.

pub mod dense;
pub mod file;

pub use dense::DenseRaggedArray;
pub use file::FileBackedArray;

use crate::arithmetic::checked_binomial;
use crate::error::{check_dimension, LatticeError, Result};

/// Binomial-table index for the ragged layout.
#[derive(Debug, Clone)]
pub struct RaggedShape {
    dimension: usize,
    capacity: u64,
    // binomials[m][n] == C(n, m) for m <= dimension
    binomials: Vec<Vec<u64>>,
}

impl RaggedShape {
    /// A shape able to index grids up to `side` layers.
    pub fn new(dimension: usize, side: u64) -> Result<Self> {
        check_dimension(dimension)?;
        let mut shape = RaggedShape {
            dimension,
            capacity: 0,
            binomials: vec![Vec::new(); dimension + 1],
        };
        shape.reserve(side)?;
        Ok(shape)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Extend the table to cover grids up to `side` layers.
    pub fn reserve(&mut self, side: u64) -> Result<()> {
        if side <= self.capacity && !self.binomials[0].is_empty() {
            return Ok(());
        }
        let d = self.dimension as u64;
        // every offset and layer length is below the total cell count
        let fits = side
            .checked_add(d - 1)
            .and_then(|n| checked_binomial(n, d))
            .map_or(false, |total| total < u64::MAX);
        let columns = side
            .checked_add(d + 1)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|_| fits)
            .ok_or_else(|| too_large(self.dimension, side))?;
        let start = self.binomials[0].len();
        for n in start..columns {
            for m in 0..=self.dimension {
                let value = if m == 0 {
                    1
                } else if n == 0 {
                    0
                } else {
                    self.binomials[m - 1][n - 1].saturating_add(self.binomials[m][n - 1])
                };
                self.binomials[m].push(value);
            }
        }
        self.capacity = side;
        Ok(())
    }

    fn binomial(&self, n: u64, m: usize) -> u64 {
        self.binomials[m][n as usize]
    }

    /// Cells in a grid of `side` layers: `C(side + N - 1, N)`.
    pub fn cell_count(&self, side: u64) -> u64 {
        debug_assert!(side <= self.capacity);
        if side == 0 {
            return 0;
        }
        self.binomial(side + self.dimension as u64 - 1, self.dimension)
    }

    pub fn layer_start(&self, layer: u64) -> u64 {
        self.cell_count(layer)
    }

    pub fn layer_len(&self, layer: u64) -> u64 {
        self.binomial(layer + self.dimension as u64 - 1, self.dimension - 1)
    }

    /// Row-major offset of a canonical cell.
    pub fn offset(&self, cell: &[i64]) -> u64 {
        debug_assert!(cell.len() == self.dimension);
        debug_assert!(cell[0] as u64 <= self.capacity);
        let d = self.dimension;
        cell.iter()
            .enumerate()
            .map(|(i, &x)| self.binomial(x as u64 + (d - i) as u64 - 1, d - i))
            .sum()
    }

    /// Next canonical cell with the same `x0`; false at the end of the layer.
    pub fn next_in_layer(cell: &mut [i64]) -> bool {
        for i in (1..cell.len()).rev() {
            if cell[i] < cell[i - 1] {
                cell[i] += 1;
                for v in cell[i + 1..].iter_mut() {
                    *v = 0;
                }
                return true;
            }
        }
        false
    }

    /// Next canonical cell in row-major order.
    pub fn advance(cell: &mut [i64]) {
        if !Self::next_in_layer(cell) {
            cell[0] += 1;
            for v in cell[1..].iter_mut() {
                *v = 0;
            }
        }
    }

    /// First cell of `layer`.
    pub fn layer_origin(&self, layer: u64) -> Vec<i64> {
        let mut cell = vec![0i64; self.dimension];
        cell[0] = layer as i64;
        cell
    }

    /// Visit the cells of `layer` in storage order.
    pub fn for_each_in_layer<F>(&self, layer: u64, mut visit: F) -> Result<()>
    where
        F: FnMut(&[i64]) -> Result<()>,
    {
        let mut cell = self.layer_origin(layer);
        loop {
            visit(&cell)?;
            if !Self::next_in_layer(&mut cell) {
                return Ok(());
            }
        }
    }
}

fn too_large(dimension: usize, side: u64) -> LatticeError {
    LatticeError::InvalidArgument(format!(
        "canonical orthant with dimension {} and side {} cannot be indexed",
        dimension, side
    ))
}

pub(crate) fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| LatticeError::InvalidArgument(format!("{} cells do not fit in memory", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_follow_row_major_order() {
        for dimension in 1..=5 {
            let shape = RaggedShape::new(dimension, 6).unwrap();
            let mut cell = vec![0i64; dimension];
            let total = shape.cell_count(6);
            for expected in 0..total {
                assert_eq!(shape.offset(&cell), expected, "{:?}", cell);
                RaggedShape::advance(&mut cell);
            }
            assert_eq!(cell[0], 6);
        }
    }

    #[test]
    fn test_two_dimensional_layout() {
        let shape = RaggedShape::new(2, 4).unwrap();
        // x(x+1)/2 + y
        assert_eq!(shape.offset(&[3, 2]), 8);
        assert_eq!(shape.layer_start(3), 6);
        assert_eq!(shape.layer_len(3), 4);
        assert_eq!(shape.cell_count(4), 10);
    }

    #[test]
    fn test_layer_lengths_sum_to_total() {
        let shape = RaggedShape::new(4, 9).unwrap();
        let sum: u64 = (0..9).map(|k| shape.layer_len(k)).sum();
        assert_eq!(sum, shape.cell_count(9));
        assert_eq!(shape.cell_count(9), checked_binomial(12, 4).unwrap());
        for k in 0..9 {
            let mut count = 0;
            shape.for_each_in_layer(k, |_| {
                count += 1;
                Ok(())
            }).unwrap();
            assert_eq!(count, shape.layer_len(k));
        }
    }

    #[test]
    fn test_reserve_grows_table() {
        let mut shape = RaggedShape::new(3, 2).unwrap();
        shape.reserve(10).unwrap();
        assert_eq!(shape.capacity(), 10);
        assert_eq!(shape.offset(&[9, 9, 9]), shape.cell_count(10) - 1);
    }

    #[test]
    fn test_unindexable_orthant_rejected() {
        assert!(RaggedShape::new(40, 1 << 40).is_err());
    }
}
