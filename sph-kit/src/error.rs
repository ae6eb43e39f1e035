//! Error type of the numerical substrate.

use crate::units::Unit;
use thiserror::Error;

/// Errors produced while loading or operating on snapshots.
#[derive(Debug, Error)]
pub enum SphError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed snapshot file: {0}")]
    Format(String),

    #[error("snapshot does not contain {0}")]
    MissingField(String),

    #[error("field '{name}' has {got} values but the family holds {expected} particles")]
    LengthMismatch {
        name: String,
        got: usize,
        expected: usize,
    },

    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("cannot convert {from} to {to}: incompatible dimensions")]
    UnitMismatch { from: Unit, to: Unit },

    #[error("{0}")]
    Precondition(String),
}
