/// Toppling rules.
///
/// A rule looks at one canonical cell and the generation-k values of its
/// canonical neighbor images and decides what the cell keeps and what it
/// sends along each edge. Rules never read generation k+1.
use serde::{Deserialize, Serialize};

use crate::arithmetic::CellValue;
use crate::symmetry::NeighborEntry;

/// Automaton family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Downhill sharing by levels.
    #[default]
    Aether,
    /// Equal shares of `floor(v / (2N + 1))` to every strictly lower neighbor.
    Sunflower,
}

impl Family {
    pub fn name(&self) -> &'static str {
        match self {
            Family::Aether => "aether",
            Family::Sunflower => "sunflower",
        }
    }

    /// Stable byte tag used in hashes and file metadata.
    pub fn tag(&self) -> u8 {
        match self {
            Family::Aether => 0,
            Family::Sunflower => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Family> {
        match tag {
            0 => Some(Family::Aether),
            1 => Some(Family::Sunflower),
            _ => None,
        }
    }

    /// Evaluate one cell. On overflow the error names the operation.
    pub fn topple<V: CellValue>(
        &self,
        dimension: usize,
        value: &V,
        neighbors: &[NeighborState<V>],
        out: &mut Toppling<V>,
    ) -> Result<(), &'static str> {
        out.transfers.clear();
        match self {
            Family::Aether => topple_aether(value, neighbors, out),
            Family::Sunflower => topple_sunflower(dimension, value, neighbors, out),
        }
    }
}

/// A neighbor image and its generation-k value.
#[derive(Debug, Clone)]
pub struct NeighborState<V> {
    pub entry: NeighborEntry,
    pub value: V,
}

/// Outcome for one cell: what stays, and the per-edge share sent to each
/// neighbor (indexes into the neighbor slice). The receiver gets the share
/// times the entry's `share_multiplier`.
#[derive(Debug, Clone)]
pub struct Toppling<V> {
    pub keep: V,
    pub transfers: Vec<(usize, V)>,
}

impl<V: CellValue> Toppling<V> {
    pub fn new() -> Self {
        Toppling {
            keep: V::zero(),
            transfers: Vec::new(),
        }
    }
}

impl<V: CellValue> Default for Toppling<V> {
    fn default() -> Self {
        Self::new()
    }
}

fn topple_sunflower<V: CellValue>(
    dimension: usize,
    value: &V,
    neighbors: &[NeighborState<V>],
    out: &mut Toppling<V>,
) -> Result<(), &'static str> {
    let divisor = 2 * dimension as u32 + 1;
    let (share, _) = value.div_rem_floor(divisor);
    out.keep = value.clone();
    if share.is_zero() {
        return Ok(());
    }
    let mut eligible = 0u32;
    for (index, neighbor) in neighbors.iter().enumerate() {
        if neighbor.value < *value {
            eligible += neighbor.entry.symmetry_count;
            out.transfers.push((index, share.clone()));
        }
    }
    // shares owed to ineligible neighbors stay in the cell
    let given = share.mul_small_checked(eligible).ok_or("sunflower share")?;
    out.keep = value.sub_checked(&given).ok_or("sunflower keep")?;
    Ok(())
}

fn topple_aether<V: CellValue>(
    value: &V,
    neighbors: &[NeighborState<V>],
    out: &mut Toppling<V>,
) -> Result<(), &'static str> {
    out.keep = value.clone();
    let mut lower: Vec<usize> = (0..neighbors.len())
        .filter(|&i| neighbors[i].value < *value)
        .collect();
    if lower.is_empty() {
        return Ok(());
    }
    // highest level first; ties keep table order
    lower.sort_by(|&a, &b| neighbors[b].value.cmp(&neighbors[a].value));

    let mut share_count: u32 =
        1 + lower.iter().map(|&i| neighbors[i].entry.symmetry_count).sum::<u32>();
    let mut given: Vec<V> = vec![V::zero(); lower.len()];
    let mut remaining = value.clone();
    let mut level: Option<&V> = None;

    for (position, &index) in lower.iter().enumerate() {
        let neighbor = &neighbors[index];
        if level != Some(&neighbor.value) {
            let to_share = remaining.sub_checked(&neighbor.value).ok_or("aether level difference")?;
            let (share, remainder) = to_share.div_rem_floor(share_count);
            if !share.is_zero() {
                remaining = neighbor
                    .value
                    .add_checked(&remainder)
                    .and_then(|v| v.add_checked(&share))
                    .ok_or("aether keep")?;
                for slot in given[position..].iter_mut() {
                    *slot = slot.add_checked(&share).ok_or("aether share")?;
                }
            }
            level = Some(&neighbor.value);
        }
        share_count -= neighbor.entry.symmetry_count;
    }

    out.keep = remaining;
    for (position, amount) in given.into_iter().enumerate() {
        if !amount.is_zero() {
            out.transfers.push((lower[position], amount));
        }
    }
    Ok(())
}
