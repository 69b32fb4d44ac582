//! Hyperoctahedral folding and the canonical neighbor table.
//!
//! Configurations are symmetric under sign flips and axis permutations, so
//! only the canonical orthant `x0 >= x1 >= ... >= x(N-1) >= 0` is stored.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use num_bigint::BigUint;

use crate::error::{check_dimension, Result};

/// Canonical representative of `coordinates`: absolute values, sorted
/// descending.
/// Coordinates must not be `i64::MIN`; config validation rejects those.
pub fn fold(coordinates: &[i64]) -> Vec<i64> {
    let mut out: Vec<i64> = coordinates.iter().map(|v| v.abs()).collect();
    out.sort_unstable_by(|a, b| b.cmp(a));
    out
}

/// In-place variant of [`fold`].
pub fn fold_into(coordinates: &mut [i64]) {
    for v in coordinates.iter_mut() {
        *v = v.abs();
    }
    coordinates.sort_unstable_by(|a, b| b.cmp(a));
}

pub fn is_canonical(coordinates: &[i64]) -> bool {
    coordinates.windows(2).all(|w| w[0] >= w[1]) && coordinates.last().map_or(true, |&v| v >= 0)
}

/// Size of the orbit of a canonical point:
/// `2^(nonzero coordinates) * N! / prod(tie block sizes!)`.
pub fn fold_multiplicity(canonical: &[i64]) -> BigUint {
    debug_assert!(is_canonical(canonical));
    let nonzero = canonical.iter().filter(|&&v| v != 0).count();
    let mut result = BigUint::from(1u32) << nonzero;
    result *= factorial(canonical.len());
    let mut start = 0;
    while start < canonical.len() {
        let mut end = start + 1;
        while end < canonical.len() && canonical[end] == canonical[start] {
            end += 1;
        }
        result /= factorial(end - start);
        start = end;
    }
    result
}

fn factorial(n: usize) -> BigUint {
    (1..=n as u64).fold(BigUint::from(1u32), |acc, k| acc * k)
}

/// One canonical neighbor image of a canonical cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborEntry {
    /// The neighbor is the cell with `axis` moved by `delta`.
    pub axis: usize,
    pub delta: i8,
    /// Full-lattice neighbors of the cell folding onto this image.
    pub symmetry_count: u32,
    /// Full-lattice neighbors of the image folding back onto the cell. A
    /// share sent along this edge is received this many times.
    pub share_multiplier: u32,
}

impl NeighborEntry {
    pub fn target(&self, cell: &[i64], out: &mut [i64]) {
        out.copy_from_slice(cell);
        out[self.axis] += i64::from(self.delta);
    }
}

/// Neighbor entries per neighborhood type, built lazily and shared.
///
/// The type of a canonical cell is given by its gaps
/// `min(x_i - x_(i+1), 2)` (with `x_N = 0`); cells of the same type have
/// identical entries.
#[derive(Debug)]
pub struct NeighborTable {
    dimension: usize,
    cache: RwLock<HashMap<u64, Arc<[NeighborEntry]>>>,
}

impl NeighborTable {
    pub fn new(dimension: usize) -> Result<Self> {
        check_dimension(dimension)?;
        Ok(NeighborTable {
            dimension,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of neighborhood types built so far.
    pub fn cached_types(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn entries(&self, cell: &[i64]) -> Arc<[NeighborEntry]> {
        debug_assert_eq!(cell.len(), self.dimension);
        let key = type_key(cell);
        if let Some(found) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(found);
        }
        let built: Arc<[NeighborEntry]> = build_entries(&representative(cell)).into();
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cache.entry(key).or_insert(built))
    }
}

fn capped_gaps(cell: &[i64]) -> impl Iterator<Item = i64> + '_ {
    (0..cell.len()).map(move |i| {
        let next = cell.get(i + 1).copied().unwrap_or(0);
        (cell[i] - next).min(2)
    })
}

fn type_key(cell: &[i64]) -> u64 {
    capped_gaps(cell)
        .enumerate()
        .fold(0u64, |key, (i, gap)| key + gap as u64 * 3u64.pow(i as u32))
}

/// The smallest cell sharing `cell`'s neighborhood type.
fn representative(cell: &[i64]) -> Vec<i64> {
    let gaps: Vec<i64> = capped_gaps(cell).collect();
    let mut out = vec![0i64; cell.len()];
    let mut running = 0;
    for i in (0..cell.len()).rev() {
        running += gaps[i];
        out[i] = running;
    }
    out
}

fn build_entries(cell: &[i64]) -> Vec<NeighborEntry> {
    let dimension = cell.len();
    let mut entries: Vec<NeighborEntry> = Vec::with_capacity(2 * dimension);
    let mut scratch = cell.to_vec();
    for axis in 0..dimension {
        for delta in [1i64, -1] {
            scratch.copy_from_slice(cell);
            scratch[axis] += delta;
            fold_into(&mut scratch);
            let (changed_axis, changed_delta) = single_difference(cell, &scratch);
            match entries
                .iter_mut()
                .find(|e| e.axis == changed_axis && i64::from(e.delta) == changed_delta)
            {
                Some(entry) => entry.symmetry_count += 1,
                None => entries.push(NeighborEntry {
                    axis: changed_axis,
                    delta: changed_delta as i8,
                    symmetry_count: 1,
                    share_multiplier: 0,
                }),
            }
        }
    }
    let mut target = cell.to_vec();
    for entry in entries.iter_mut() {
        entry.target(cell, &mut target);
        entry.share_multiplier = folds_back(&target, cell);
    }
    entries
}

/// Where the folded neighbor differs from the cell. A unit move changes
/// exactly one entry of the sorted absolute values.
fn single_difference(cell: &[i64], folded: &[i64]) -> (usize, i64) {
    let mut found = (0, 0);
    for (axis, (a, b)) in cell.iter().zip(folded).enumerate() {
        if a != b {
            debug_assert_eq!(found.1, 0, "unit move changed two axes");
            found = (axis, b - a);
        }
    }
    found
}

fn folds_back(from: &[i64], cell: &[i64]) -> u32 {
    let mut scratch = from.to_vec();
    let mut count = 0;
    for axis in 0..from.len() {
        for delta in [1i64, -1] {
            scratch.copy_from_slice(from);
            scratch[axis] += delta;
            fold_into(&mut scratch);
            if scratch == cell {
                count += 1;
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(entries: &[NeighborEntry], axis: usize, delta: i8) -> NeighborEntry {
        *entries
            .iter()
            .find(|e| e.axis == axis && e.delta == delta)
            .unwrap()
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold(&[-3, 5, 0]), vec![5, 3, 0]);
        assert_eq!(fold(&[-1, -1]), vec![1, 1]);
        assert!(is_canonical(&[4, 4, 1, 0]));
        assert!(!is_canonical(&[1, 2]));
        assert!(!is_canonical(&[0, -1]));
    }

    #[test]
    fn test_fold_multiplicity() {
        assert_eq!(fold_multiplicity(&[0, 0]), BigUint::from(1u32));
        assert_eq!(fold_multiplicity(&[1, 0]), BigUint::from(4u32));
        assert_eq!(fold_multiplicity(&[1, 1]), BigUint::from(4u32));
        assert_eq!(fold_multiplicity(&[2, 1]), BigUint::from(8u32));
        assert_eq!(fold_multiplicity(&[2, 1, 0]), BigUint::from(24u32));
        assert_eq!(fold_multiplicity(&[3]), BigUint::from(2u32));
    }

    #[test]
    fn test_origin_entries_2d() {
        let table = NeighborTable::new(2).unwrap();
        let entries = table.entries(&[0, 0]);
        assert_eq!(entries.len(), 1);
        let e = entry(&entries, 0, 1);
        assert_eq!((e.symmetry_count, e.share_multiplier), (4, 1));
    }

    #[test]
    fn test_axis_cell_entries_2d() {
        let table = NeighborTable::new(2).unwrap();
        let entries = table.entries(&[1, 0]);
        assert_eq!(entries.len(), 3);
        let down = entry(&entries, 0, -1);
        assert_eq!((down.symmetry_count, down.share_multiplier), (1, 4));
        let out = entry(&entries, 0, 1);
        assert_eq!((out.symmetry_count, out.share_multiplier), (1, 1));
        let side = entry(&entries, 1, 1);
        assert_eq!((side.symmetry_count, side.share_multiplier), (2, 2));
    }

    #[test]
    fn test_entries_cover_all_neighbors() {
        let table = NeighborTable::new(4).unwrap();
        for cell in [[0, 0, 0, 0], [3, 3, 1, 0], [5, 2, 2, 2], [1, 1, 1, 1]] {
            let total: u32 = table.entries(&cell).iter().map(|e| e.symmetry_count).sum();
            assert_eq!(total, 8);
        }
    }

    #[test]
    fn test_edge_counts_balance_between_orbits() {
        // mult(p) * count(p -> c) == mult(c) * multiplier(p -> c)
        let table = NeighborTable::new(3).unwrap();
        let mut target = [0i64; 3];
        for cell in [[0, 0, 0], [1, 0, 0], [2, 1, 1], [4, 4, 0], [3, 2, 1]] {
            for e in table.entries(&cell).iter() {
                e.target(&cell, &mut target);
                let left = fold_multiplicity(&cell) * e.symmetry_count;
                let right = fold_multiplicity(&target) * e.share_multiplier;
                assert_eq!(left, right, "{:?} -> {:?}", cell, target);
            }
        }
    }

    #[test]
    fn test_same_type_shares_entries() {
        let table = NeighborTable::new(3).unwrap();
        let a = table.entries(&[7, 4, 0]);
        let b = table.entries(&[9, 2, 0]);
        assert_eq!(&*a, &*b);
        assert_eq!(table.cached_types(), 1);
    }
}
