//! # Error Taxonomy
//!
//! This module defines the closed set of error codes produced by table
//! operations, plus the coarser module-level status reported through the
//! syscall ABI.
//!
//! ## Two layers of errors
//!
//! Table operations (`create`, `insert`, `read`, ...) return [`TdbError`]
//! values drawn from a closed taxonomy. These codes are *data*: they are
//! shipped across the consensus boundary as integers, compared between
//! parties, and reduced to a single global outcome. Because of that, the
//! set is closed and each variant has a stable wire code — adding a variant
//! in the middle of the list would silently change the protocol.
//!
//! Infrastructure failures that never cross the wire (configuration
//! parsing, directory setup, facility acquisition) use `eyre::Result`
//! instead and are converted to a `TdbError` or [`ModuleStatus`] only at
//! the module boundary.
//!
//! ## Wire codes
//!
//! | Code | Variant |
//! |------|---------------------|
//! | 0    | success (no variant) |
//! | 1    | `InvalidArgument`   |
//! | 2    | `TableAlreadyExists`|
//! | 3    | `TableNotFound`     |
//! | 4    | `IoError`           |
//! | 5    | `GeneralError`      |
//! | 6    | `ConsensusError`    |
//! | 7    | `MissingFacility`   |
//! | 8    | `UnknownError`      |
//!
//! An incoming code outside this table decodes to `UnknownError`; the
//! consensus reduction then degrades the global outcome accordingly
//! instead of trusting a peer's unrecognised value.

use thiserror::Error;

/// Result alias for table operations.
pub type TdbResult<T> = Result<T, TdbError>;

/// Closed error taxonomy for table operations.
///
/// Success is expressed as `Ok(..)`; the wire code `0` therefore has no
/// variant here. See the module docs for the code table.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TdbError {
    /// Malformed parameters: empty schemas, oversized or duplicate column
    /// names, value sizes that do not match their type, out-of-range or
    /// duplicate column ordinals.
    #[error("invalid argument")]
    InvalidArgument,

    /// A table file with the requested name already exists.
    #[error("table already exists")]
    TableAlreadyExists,

    /// The requested table file does not exist.
    #[error("table not found")]
    TableNotFound,

    /// File creation, open, read or write failed at the filesystem level.
    #[error("input/output error")]
    IoError,

    /// An HDF5 library call failed below any of the more specific
    /// categories. The library error stack has been logged.
    #[error("general error")]
    GeneralError,

    /// The parties of a global transaction disagreed on the outcome.
    #[error("consensus error")]
    ConsensusError,

    /// A required host facility is absent.
    #[error("missing facility")]
    MissingFacility,

    /// Uninitialised or unrecognised result code.
    #[error("unknown error")]
    UnknownError,
}

/// Wire code for a successful operation.
pub const TDB_OK: i64 = 0;

impl TdbError {
    /// Stable integer code used on the consensus wire.
    pub fn code(self) -> i64 {
        match self {
            TdbError::InvalidArgument => 1,
            TdbError::TableAlreadyExists => 2,
            TdbError::TableNotFound => 3,
            TdbError::IoError => 4,
            TdbError::GeneralError => 5,
            TdbError::ConsensusError => 6,
            TdbError::MissingFacility => 7,
            TdbError::UnknownError => 8,
        }
    }

    /// Decodes a wire code. `0` decodes to `None` (success); anything
    /// outside the known table decodes to `Some(UnknownError)`.
    pub fn from_code(code: i64) -> Option<TdbError> {
        match code {
            0 => None,
            1 => Some(TdbError::InvalidArgument),
            2 => Some(TdbError::TableAlreadyExists),
            3 => Some(TdbError::TableNotFound),
            4 => Some(TdbError::IoError),
            5 => Some(TdbError::GeneralError),
            6 => Some(TdbError::ConsensusError),
            7 => Some(TdbError::MissingFacility),
            _ => Some(TdbError::UnknownError),
        }
    }
}

/// Converts an operation result into its wire code.
pub fn result_code(result: &TdbResult<()>) -> i64 {
    match result {
        Ok(()) => TDB_OK,
        Err(e) => e.code(),
    }
}

/// Converts a wire code back into an operation result.
pub fn code_result(code: i64) -> TdbResult<()> {
    match TdbError::from_code(code) {
        None => Ok(()),
        Some(e) => Err(e),
    }
}

/// Module-level status reported through the syscall ABI.
///
/// This is the outermost layer visible to the host runtime; the
/// fine-grained [`TdbError`] travels through the per-process error store
/// instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Ok,
    /// Argument arity or reference shape did not match the entry point.
    InvalidCall,
    OutOfMemory,
    /// The operation ran and failed; the error store holds the code.
    ModuleError,
    /// A facility or configuration problem prevented the operation from
    /// running at all.
    GeneralError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        let all = [
            TdbError::InvalidArgument,
            TdbError::TableAlreadyExists,
            TdbError::TableNotFound,
            TdbError::IoError,
            TdbError::GeneralError,
            TdbError::ConsensusError,
            TdbError::MissingFacility,
            TdbError::UnknownError,
        ];
        for e in all {
            assert_eq!(TdbError::from_code(e.code()), Some(e));
        }
        assert_eq!(TdbError::from_code(TDB_OK), None);
    }

    #[test]
    fn unrecognised_codes_decode_to_unknown() {
        assert_eq!(TdbError::from_code(999), Some(TdbError::UnknownError));
        assert_eq!(TdbError::from_code(-1), Some(TdbError::UnknownError));
    }

    #[test]
    fn result_code_round_trip() {
        assert_eq!(result_code(&Ok(())), TDB_OK);
        let r: TdbResult<()> = Err(TdbError::IoError);
        assert_eq!(code_result(result_code(&r)), r);
    }
}
