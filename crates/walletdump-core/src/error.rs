//! Error types for the walletdump-core library.
//!
//! Errors fall into three groups, and callers decide how far each one
//! propagates:
//!
//! - open errors ([`Error::FileRead`], [`Error::Open`], [`Error::Sqlite`]) are
//!   fatal to a single wallet file
//! - format errors ([`Error::OutOfBounds`], [`Error::InvalidFormat`]) are local
//!   to a single record
//! - validation errors ([`Error::LengthLimit`], [`Error::InvalidRecord`] and the
//!   master key variants) reject a well-formed field with an unusable value

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for walletdump operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all walletdump operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Neither storage backend could open the file
    #[error("failed to open wallet '{path}': {details}")]
    Open {
        /// Path to the wallet file
        path: PathBuf,
        /// Why each backend rejected the file
        details: String,
    },

    /// The SQLite backend reported an error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A read ran past the end of the buffer
    #[error("read of {needed} bytes at offset {offset} exceeds buffer ({available} bytes left)")]
    OutOfBounds {
        /// Cursor position when the read was attempted
        offset: usize,
        /// Number of bytes requested
        needed: u64,
        /// Number of bytes still available
        available: usize,
    },

    /// Structurally invalid data inside an opened store
    #[error("invalid format at offset {offset}: {details}")]
    InvalidFormat {
        /// Byte offset where the error occurred
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// A declared field length exceeds the configured cap
    #[error("declared length {declared} at offset {offset} exceeds limit of {max} bytes")]
    LengthLimit {
        /// Cursor position of the length prefix
        offset: usize,
        /// Length claimed by the prefix
        declared: u64,
        /// Configured maximum
        max: usize,
    },

    /// A decoded record carries an unusable value
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// No valid master key record was found
    #[error("no valid master key record found")]
    MasterKeyMissing,

    /// The encrypted master key is shorter than one cipher block pair
    #[error("encrypted master key is {len} bytes, need at least 32")]
    MasterKeyTooShort {
        /// Actual length of the encrypted key
        len: usize,
    },

    /// The master key uses a derivation method the hash format cannot express
    #[error("unsupported key derivation method {method}")]
    UnsupportedDerivation {
        /// Derivation method stored in the master key record
        method: u32,
    },
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new open error
    pub fn open(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        Self::Open {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Creates a new out-of-bounds error
    pub fn out_of_bounds(offset: usize, needed: u64, available: usize) -> Self {
        Self::OutOfBounds {
            offset,
            needed,
            available,
        }
    }

    /// Creates a new format error
    pub fn invalid_format(offset: usize, details: impl Into<String>) -> Self {
        Self::InvalidFormat {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new invalid record error
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// Returns true if the error only invalidates the record being decoded
    pub fn is_record_local(&self) -> bool {
        matches!(
            self,
            Self::OutOfBounds { .. }
                | Self::InvalidFormat { .. }
                | Self::LengthLimit { .. }
                | Self::InvalidRecord(_)
        )
    }

    /// Returns true if the error rejects a well-formed but unusable value
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::LengthLimit { .. }
                | Self::InvalidRecord(_)
                | Self::MasterKeyMissing
                | Self::MasterKeyTooShort { .. }
                | Self::UnsupportedDerivation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::open("/tmp/wallet.dat", "not a wallet");
        assert!(err.to_string().contains("/tmp/wallet.dat"));
        assert!(err.to_string().contains("not a wallet"));

        let err = Error::out_of_bounds(3, 10, 2);
        assert_eq!(
            err.to_string(),
            "read of 10 bytes at offset 3 exceeds buffer (2 bytes left)"
        );
    }

    #[test]
    fn test_classification() {
        assert!(Error::out_of_bounds(0, 1, 0).is_record_local());
        assert!(!Error::out_of_bounds(0, 1, 0).is_validation());
        assert!(Error::invalid_record("empty salt").is_record_local());
        assert!(Error::invalid_record("empty salt").is_validation());
        assert!(Error::UnsupportedDerivation { method: 2 }.is_validation());
        assert!(!Error::UnsupportedDerivation { method: 2 }.is_record_local());
        assert!(!Error::open("x", "y").is_record_local());
    }
}
