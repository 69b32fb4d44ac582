//! In-memory ragged array over the canonical orthant.

use crate::arithmetic::CellValue;
use crate::error::{LatticeError, Result};
use crate::storage::{to_usize, RaggedShape};

#[derive(Debug, Clone)]
pub struct DenseRaggedArray<V> {
    shape: RaggedShape,
    side: u64,
    values: Vec<V>,
}

impl<V: CellValue> DenseRaggedArray<V> {
    pub fn zeroed(dimension: usize, side: u64) -> Result<Self> {
        let shape = RaggedShape::new(dimension, side)?;
        let len = to_usize(shape.cell_count(side))?;
        Ok(DenseRaggedArray {
            shape,
            side,
            values: vec![V::zero(); len],
        })
    }

    /// Wrap values already in row-major ragged order.
    pub fn from_values(dimension: usize, side: u64, values: Vec<V>) -> Result<Self> {
        let shape = RaggedShape::new(dimension, side)?;
        let expected = shape.cell_count(side);
        if values.len() as u64 != expected {
            return Err(LatticeError::InvalidArgument(format!(
                "{} values for a {}-dimensional orthant of side {} (expected {})",
                values.len(),
                dimension,
                side,
                expected
            )));
        }
        Ok(DenseRaggedArray { shape, side, values })
    }

    pub fn dimension(&self) -> usize {
        self.shape.dimension()
    }

    pub fn side(&self) -> u64 {
        self.side
    }

    pub fn shape(&self) -> &RaggedShape {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn into_values(self) -> Vec<V> {
        self.values
    }

    pub fn get(&self, cell: &[i64]) -> Option<&V> {
        if cell[0] < 0 || cell[0] as u64 >= self.side {
            return None;
        }
        self.values.get(self.shape.offset(cell) as usize)
    }

    /// Value of a canonical cell; cells past the last layer read as zero.
    pub fn value_or_zero(&self, cell: &[i64]) -> V {
        self.get(cell).cloned().unwrap_or_else(V::zero)
    }

    pub fn set(&mut self, cell: &[i64], value: V) -> Result<()> {
        if cell[0] < 0 || cell[0] as u64 >= self.side {
            return Err(LatticeError::out_of_bounds(cell));
        }
        let index = self.shape.offset(cell) as usize;
        self.values[index] = value;
        Ok(())
    }

    /// Add in place; `None` on overflow.
    pub fn add_at(&mut self, index: usize, amount: &V) -> Option<()> {
        let slot = &mut self.values[index];
        *slot = slot.add_checked(amount)?;
        Some(())
    }

    pub fn layer(&self, layer: u64) -> &[V] {
        let start = self.shape.layer_start(layer) as usize;
        let len = self.shape.layer_len(layer) as usize;
        &self.values[start..start + len]
    }

    pub fn layer_is_zero(&self, layer: u64) -> bool {
        layer >= self.side || self.layer(layer).iter().all(CellValue::is_zero)
    }

    /// Append zero layers up to `side`.
    pub fn grow_to(&mut self, side: u64) -> Result<()> {
        if side <= self.side {
            return Ok(());
        }
        self.shape.reserve(side)?;
        let len = to_usize(self.shape.cell_count(side))?;
        self.values.resize(len, V::zero());
        self.side = side;
        Ok(())
    }

    /// Drop outer layers past `side`.
    pub fn truncate_to(&mut self, side: u64) {
        if side >= self.side {
            return;
        }
        self.values.truncate(self.shape.cell_count(side) as usize);
        self.side = side;
    }

    /// Visit every stored cell in row-major order.
    pub fn for_each_cell<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&[i64], &V) -> Result<()>,
    {
        let mut cell = vec![0i64; self.dimension()];
        for value in &self.values {
            visit(&cell, value)?;
            RaggedShape::advance(&mut cell);
        }
        Ok(())
    }
}
