//
// Copyright (c) 2025 Nathan Fiedler
//

//! Error type shared by the index reader/writer and the file helpers.

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

///
/// Errors that can occur while reading, writing, or building an index.
///
/// Violations of chunking parameter ordering or table sizing rules are not
/// represented here; those are programming errors and are caught by
/// assertions when the offending value is constructed.
///
#[derive(Error, Debug)]
pub enum Error {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The first four bytes of a saved index were not `ddup`.
    #[error("not a dedup index (bad magic marker)")]
    BadMagic,

    /// The saved index uses a format version or secondary hash this build
    /// does not understand.
    #[error("unsupported index format: version {version}, secondary hash id {secondary}")]
    UnsupportedVersion { version: u32, secondary: u8 },

    /// The saved index was built with a different block hash algorithm.
    #[error("index built with {found} algorithm, but this reader uses {expected}")]
    HashMismatch {
        found: &'static str,
        expected: &'static str,
    },

    /// The input ended before a complete structure could be read.
    #[error("unexpected end of input while reading {what}")]
    Truncated { what: &'static str },

    /// Header fields or table contents contradict each other.
    #[error("inconsistent index: {0}")]
    Inconsistent(String),

    /// A file holds more blocks than fit in a 32-bit block number.
    #[error("file too large ({file_size} bytes) for block size {block_size}")]
    TooLarge { file_size: u64, block_size: u32 },
}

impl Error {
    /// Map a short read onto [`Error::Truncated`], passing other I/O
    /// errors through unchanged.
    pub(crate) fn from_read(err: io::Error, what: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::Truncated { what }
        } else {
            Error::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_fmt() {
        let err = Error::Truncated { what: "header" };
        assert_eq!(
            format!("{err}"),
            "unexpected end of input while reading header"
        );
        let err = Error::HashMismatch {
            found: "FNV32",
            expected: "Rolling64",
        };
        assert_eq!(
            format!("{err}"),
            "index built with FNV32 algorithm, but this reader uses Rolling64"
        );
    }

    #[test]
    fn test_from_read() {
        let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
        assert!(matches!(
            Error::from_read(eof, "entries"),
            Error::Truncated { what: "entries" }
        ));
        let other = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(matches!(Error::from_read(other, "entries"), Error::Io(_)));
    }
}
