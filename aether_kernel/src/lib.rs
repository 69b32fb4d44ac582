#![forbid(unsafe_code)]

//! Aether / Sunflower lattice kernel.
//!
//! Dimension-generic bounds model, region transforms, ragged canonical
//! storage (memory and file) and the toppling engines that evolve it.

/// On-disk grid format version. Bump on any layout change.
pub const FORMAT_VERSION: u32 = 1;

/// Largest supported lattice dimension. Neighborhood types are keyed by a
/// base-3 signature that has to fit in a `u64`.
pub const MAX_DIMENSION: usize = 40;

pub mod error;
pub mod arithmetic;
pub mod coordinates;
pub mod region;
pub mod symmetry;
pub mod transforms;
pub mod storage;
pub mod config;
pub mod rule;
pub mod state;
pub mod model;
pub mod engine;
pub mod disk_engine;
pub mod invariants;
pub mod hashing;

pub use coordinates::{AxisBounds, Coordinates, PartialCoordinates};
pub use error::{LatticeError, Result};
pub use model::{Automaton, Capabilities, EngineState, Evolving, Grid, LayerFlushed};
pub use region::{Region, RegionExt};
pub use rule::Family;
