//! Model configuration.
//!
//! JSON shape:
//!
//! ```json
//! {
//!   "dimension": 2,
//!   "family": "aether",
//!   "initial": { "kind": "single_source", "value": "-3000" },
//!   "workers": 4,
//!   "scratch_dir": "/var/tmp/aether"
//! }
//! ```
//!
//! Seed values are arbitrary precision; they may be written as JSON
//! integers or decimal strings.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};

use crate::arithmetic::CellValue;
use crate::error::{check_dimension, LatticeError, Result};
use crate::rule::Family;
use crate::symmetry::{fold, fold_multiplicity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    pub dimension: usize,
    #[serde(default)]
    pub family: Family,
    pub initial: InitialConfiguration,
    /// Worker threads for in-memory stepping; 0 and 1 mean sequential.
    #[serde(default)]
    pub workers: usize,
    /// Parent of the private scratch directory used by disk-backed models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum InitialConfiguration {
    /// One nonzero cell at the origin.
    SingleSource {
        #[serde(with = "decimal")]
        value: BigInt,
    },
    /// Explicit cells. Members of one symmetry orbit must agree.
    Cells { cells: Vec<SeedCell> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedCell {
    pub coordinates: Vec<i64>,
    #[serde(with = "decimal")]
    pub value: BigInt,
}

impl ModelConfig {
    pub fn single_source(dimension: usize, family: Family, value: impl Into<BigInt>) -> Self {
        ModelConfig {
            dimension,
            family,
            initial: InitialConfiguration::SingleSource { value: value.into() },
            workers: 0,
            scratch_dir: None,
        }
    }

    pub fn with_cells(dimension: usize, family: Family, cells: Vec<SeedCell>) -> Self {
        ModelConfig {
            dimension,
            family,
            initial: InitialConfiguration::Cells { cells },
            workers: 0,
            scratch_dir: None,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: ModelConfig = serde_json::from_str(raw)
            .map_err(|e| LatticeError::InvalidArgument(format!("model config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| LatticeError::storage(path, "read model config", e))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        check_dimension(self.dimension)?;
        self.canonical_seeds().map(|_| ())
    }

    pub fn scratch_parent(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Nonzero seeds folded into the canonical orthant, in coordinate order.
    pub fn canonical_seeds(&self) -> Result<BTreeMap<Vec<i64>, BigInt>> {
        let mut seeds = BTreeMap::new();
        match &self.initial {
            InitialConfiguration::SingleSource { value } => {
                if !Zero::is_zero(value) {
                    seeds.insert(vec![0; self.dimension], value.clone());
                }
            }
            InitialConfiguration::Cells { cells } => {
                let mut listed: BTreeMap<Vec<i64>, &BigInt> = BTreeMap::new();
                for cell in cells {
                    if cell.coordinates.len() != self.dimension {
                        return Err(LatticeError::InvalidArgument(format!(
                            "seed {:?} has {} coordinates, model dimension is {}",
                            cell.coordinates,
                            cell.coordinates.len(),
                            self.dimension
                        )));
                    }
                    if cell.coordinates.contains(&i64::MIN) {
                        return Err(LatticeError::InvalidArgument(format!(
                            "seed {:?} has a coordinate whose magnitude does not fit in i64",
                            cell.coordinates
                        )));
                    }
                    let canonical = fold(&cell.coordinates);
                    match listed.get(&canonical) {
                        Some(previous) if **previous != cell.value => {
                            return Err(LatticeError::InvalidArgument(format!(
                                "seed {:?} = {} conflicts with {} elsewhere in its orbit; \
                                 the configuration is not symmetric",
                                cell.coordinates, cell.value, previous
                            )));
                        }
                        Some(_) => {}
                        None => {
                            listed.insert(canonical, &cell.value);
                        }
                    }
                }
                for (canonical, value) in listed {
                    if !Zero::is_zero(value) {
                        seeds.insert(canonical, value.clone());
                    }
                }
            }
        }
        Ok(seeds)
    }

    /// Total quantity of the initial configuration over the full lattice.
    pub fn initial_total(&self) -> Result<BigInt> {
        let mut total = BigInt::from(0);
        for (cell, value) in self.canonical_seeds()? {
            total += value * BigInt::from(fold_multiplicity(&cell));
        }
        Ok(total)
    }

    /// Layers in the initial grid: one past the outermost seed, plus an
    /// all-zero margin layer.
    pub fn initial_side(&self) -> Result<u64> {
        let outermost = self
            .canonical_seeds()?
            .keys()
            .map(|c| c[0])
            .max()
            .unwrap_or(0);
        Ok(outermost as u64 + 2)
    }

    /// Reject seeds that could overflow `V` during evolution.
    pub fn validate_seed_range<V: CellValue>(&self) -> Result<()> {
        let seeds = self.canonical_seeds()?;
        for (cell, value) in &seeds {
            if V::from_bigint(value).is_none() {
                return Err(LatticeError::overflow(cell, V::TYPE_NAME, "seed conversion"));
            }
        }
        if let (Family::Aether, InitialConfiguration::SingleSource { value }) =
            (self.family, &self.initial)
        {
            let difference = max_neighbor_difference(self.dimension, value);
            if V::from_bigint(&difference).is_none() {
                return Err(LatticeError::overflow(
                    &vec![0; self.dimension],
                    V::TYPE_NAME,
                    "seed range check",
                ));
            }
        }
        Ok(())
    }

    /// Seeds converted to the instance value type.
    pub fn seeds_as<V: CellValue>(&self) -> Result<Vec<(Vec<i64>, V)>> {
        self.canonical_seeds()?
            .into_iter()
            .map(|(cell, value)| {
                V::from_bigint(&value)
                    .map(|v| (cell.clone(), v))
                    .ok_or_else(|| LatticeError::overflow(&cell, V::TYPE_NAME, "seed conversion"))
            })
            .collect()
    }
}

/// Largest difference between neighboring cells over the whole evolution of
/// a single-source Aether model.
pub fn max_neighbor_difference(dimension: usize, source: &BigInt) -> BigInt {
    if !source.is_negative() {
        return source.clone();
    }
    if dimension == 1 {
        return -source;
    }
    let half: BigInt = -source / 2;
    let scaled: BigInt = half * BigInt::from(2 * dimension as u64 + 1);
    (source + scaled).abs()
}

/// Most negative single-source seed whose evolution keeps neighbor
/// differences within `max_allowed`.
pub fn min_allowed_single_source(dimension: usize, max_allowed: &BigInt) -> Result<BigInt> {
    check_dimension(dimension)?;
    if max_allowed.is_negative() {
        return Err(LatticeError::InvalidArgument("max allowed value is negative".to_string()));
    }
    if Zero::is_zero(max_allowed) {
        return Ok(Zero::zero());
    }
    if dimension == 1 {
        return Ok(-max_allowed);
    }
    let double_dimension_minus_one = BigInt::from(2 * dimension as u64 - 1);
    if *max_allowed < double_dimension_minus_one {
        return Ok(BigInt::from(-1));
    }
    let candidate = (max_allowed * 2) / -&double_dimension_minus_one;
    // the estimate can be one too conservative
    let lower = &candidate - 1;
    if max_neighbor_difference(dimension, &lower) > *max_allowed {
        Ok(candidate)
    } else {
        Ok(lower)
    }
}

/// BigInt as a decimal string; accepts JSON integers on input.
mod decimal {
    use num_bigint::BigInt;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Integer(i64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Integer(v) => Ok(BigInt::from(v)),
            Raw::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid integer {:?}", s))),
        }
    }
}
