//! Numerical substrate for cluster post-processing: snapshot loading,
//! unit conversion, SPH rasterization and radial binning.
//!
//! The analysis layer composes these primitives; nothing in this crate
//! knows about catalogs, figures or the pipeline driver.

pub mod binning;
pub mod constants;
pub mod error;
pub mod fortran;
pub mod gadget;
pub mod kernel;
pub mod ramses;
pub mod render;
pub mod snapshot;
pub mod units;

pub use error::SphError;
pub use render::{RasterArray, RasterGrid, Rasterizer};
pub use snapshot::{Family, FamilyData, SnapLayout, SnapProperties, Snapshot};
pub use units::{convert, convert_slice, Dimension, Unit};

use std::path::Path;

/// Loads a snapshot from either a RAMSES `output_NNNNN` directory or a
/// single-file GADGET-2 binary, deciding by what is on disk.
pub fn load_snapshot(path: &Path, mu: f64) -> Result<Snapshot, SphError> {
    if path.is_dir() {
        ramses::read_ramses(path, mu)
    } else {
        gadget::read_gadget(path, mu)
    }
}
