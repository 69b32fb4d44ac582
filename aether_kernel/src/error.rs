//! Kernel error taxonomy.
//!
//! Every variant carries enough context (coordinates, axis, partial
//! coordinates, file path) to reproduce the failure. Nothing here is
//! retried: overflow means "switch to the BigInt instantiation", storage
//! failures are surfaced as-is.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LatticeError {
    /// A caller asked for a point outside the region.
    #[error("coordinates {coordinates:?} are outside the region")]
    OutOfBounds { coordinates: Vec<i64> },

    /// A transform's declared bounds no longer describe any point.
    #[error("{transform}: bounds are unsatisfiable (axis {axis:?}, partial {partial}): {reason}")]
    InconsistentBounds {
        transform: &'static str,
        axis: Option<usize>,
        partial: String,
        reason: String,
    },

    /// Read/write failure on a file-backed grid.
    #[error("storage failure on {path:?} ({context}): {source}")]
    StorageIo {
        path: PathBuf,
        context: String,
        #[source]
        source: io::Error,
    },

    /// A fixed-width instantiation left its range.
    #[error(
        "{value_type} overflow during {operation} at {coordinates:?}; \
         use the arbitrary precision instantiation"
    )]
    ArithmeticOverflow {
        coordinates: Vec<i64>,
        value_type: &'static str,
        operation: &'static str,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported dimension {dimension}: must be between 1 and {max}")]
    UnsupportedDimension { dimension: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, LatticeError>;

impl LatticeError {
    pub fn storage(
        path: impl Into<PathBuf>,
        context: impl Into<String>,
        source: io::Error,
    ) -> Self {
        LatticeError::StorageIo {
            path: path.into(),
            context: context.into(),
            source,
        }
    }

    pub fn overflow(
        coordinates: &[i64],
        value_type: &'static str,
        operation: &'static str,
    ) -> Self {
        LatticeError::ArithmeticOverflow {
            coordinates: coordinates.to_vec(),
            value_type,
            operation,
        }
    }

    pub fn out_of_bounds(coordinates: &[i64]) -> Self {
        LatticeError::OutOfBounds {
            coordinates: coordinates.to_vec(),
        }
    }
}

/// Reject dimensions the kernel cannot index.
pub fn check_dimension(dimension: usize) -> Result<()> {
    if dimension == 0 || dimension > crate::MAX_DIMENSION {
        return Err(LatticeError::UnsupportedDimension {
            dimension,
            max: crate::MAX_DIMENSION,
        });
    }
    Ok(())
}
