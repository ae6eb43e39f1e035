//! Error kinds shared across the toolkit.

use thiserror::Error;

/// The error taxonomy of the analysis core. Catalog and configuration
/// failures are fatal to the process; per-snapshot failures are caught by
/// the pipeline driver and logged.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The snapshot lacks the RAMSES-style `boxsize` property.
    #[error("not a RAMSES snapshot: {0}")]
    NotRamses(String),

    /// An operation referenced a family or field the snapshot does not hold.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Rasterization or plotting of one family in one snapshot failed.
    #[error("plot error: {0}")]
    PipelinePlot(String),

    /// A catalog lookup produced no match.
    #[error("no catalog match: {0}")]
    SimBackend(String),

    /// A catalog or configuration file is corrupt or unreadable.
    #[error("configuration failure: {0}")]
    ConfigFailure(String),
}

impl ClusterError {
    /// Process exit code for this kind, per the CLI contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            ClusterError::SimBackend(_) => 2,
            ClusterError::Snapshot(_) | ClusterError::NotRamses(_) => 3,
            _ => 1,
        }
    }
}
