//! Error taxonomy and the bit-exact status codes the C-ABI surface expects.
//!
//! Read paths return `MissingSpace`/`MissingSymbol` on a missing entity and
//! never create one. Write paths (`named_vector`, `superpose`) create missing
//! entities on demand; only allocation failure or a name collision propagates
//! as an error. See spec §7.

use thiserror::Error;

/// Crate-wide error type. One variant per failure mode in spec §7.
#[derive(Debug, Error)]
pub enum Error {
    #[error("space not found: {0}")]
    MissingSpace(String),

    #[error("symbol not found: {space}/{name}")]
    MissingSymbol { space: String, name: String },

    #[error("symbol already exists: {space}/{name}")]
    IndexConflict { space: String, name: String },

    #[error("arena exhausted (requested {requested} bytes, {available} available)")]
    OutOfMemory { requested: u64, available: u64 },

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("operation not implemented: {0}")]
    Unimplemented(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Bit-exact status codes expected by the FFI / C-ABI surface (spec §6).
///
/// Negative values indicate errors; [`is_error`] mirrors the original
/// `sdm_error(s) ≡ s < 0` predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    Created = 1,
    Existed = 2,
    MissingSpace = -2,
    MissingSymbol = -4,
    OutOfMemory = -8,
    Runtime = -16,
    Unimplemented = -32,
    IndexConflict = -64,
}

impl Status {
    #[must_use]
    pub const fn is_error(self) -> bool {
        (self as i32) < 0
    }
}

impl From<&Error> for Status {
    fn from(e: &Error) -> Self {
        match e {
            Error::MissingSpace(_) => Status::MissingSpace,
            Error::MissingSymbol { .. } => Status::MissingSymbol,
            Error::IndexConflict { .. } => Status::IndexConflict,
            Error::OutOfMemory { .. } => Status::OutOfMemory,
            Error::Runtime(_) | Error::Io(_) => Status::Runtime,
            Error::Unimplemented(_) => Status::Unimplemented,
        }
    }
}

/// Outcome of an `ensure_*`/learning call that may create an entity along
/// the way (spec §4.F: `Created` if any insertion happened, else `Existed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assertion {
    Created,
    Existed,
}

impl From<Assertion> for Status {
    fn from(a: Assertion) -> Self {
        match a {
            Assertion::Created => Status::Created,
            Assertion::Existed => Status::Existed,
        }
    }
}

impl<T> From<&Result<T>> for Status {
    fn from(r: &Result<T>) -> Self {
        match r {
            Ok(_) => Status::Ok,
            Err(e) => Status::from(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_error_matches_sign() {
        assert!(!Status::Ok.is_error());
        assert!(!Status::Created.is_error());
        assert!(!Status::Existed.is_error());
        assert!(Status::MissingSpace.is_error());
        assert!(Status::MissingSymbol.is_error());
        assert!(Status::OutOfMemory.is_error());
        assert!(Status::Runtime.is_error());
        assert!(Status::Unimplemented.is_error());
        assert!(Status::IndexConflict.is_error());
    }

    #[test]
    fn status_codes_are_bit_exact() {
        assert_eq!(Status::Ok as i32, 0);
        assert_eq!(Status::Created as i32, 1);
        assert_eq!(Status::Existed as i32, 2);
        assert_eq!(Status::MissingSpace as i32, -2);
        assert_eq!(Status::MissingSymbol as i32, -4);
        assert_eq!(Status::OutOfMemory as i32, -8);
        assert_eq!(Status::Runtime as i32, -16);
        assert_eq!(Status::Unimplemented as i32, -32);
        assert_eq!(Status::IndexConflict as i32, -64);
    }

    #[test]
    fn error_maps_to_expected_status() {
        let e = Error::MissingSpace("names".into());
        assert_eq!(Status::from(&e), Status::MissingSpace);
    }
}
