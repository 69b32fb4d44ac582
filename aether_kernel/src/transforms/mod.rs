//! Region transforms.
//!
//! Every transform is itself a `Region` (and a `Grid` when its source is
//! one), so transforms compose. Transforms that own an evolving source
//! forward `step` and re-check their bounds afterwards.

pub mod cross_section;
pub mod diagonal;
pub mod sub_region;
pub mod symmetric;

pub use cross_section::CrossSection;
pub use diagonal::{DiagonalCrossSection, Slope};
pub use sub_region::SubRegion;
pub use symmetric::{AsymmetricSection, WholeGrid};
