//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// file does not start with a valid rff header
    #[error("file does not start with a valid rff header")]
    #[diagnostic(help("expected magic \"RFF\\x1A\" followed by version 0x0301"))]
    InvalidHeader,

    /// entry {name} points outside of the bundle
    #[error("entry {name} at offset {offset} with size {size} exceeds the bundle length of {len}")]
    CorruptArchive {
        /// Name of the offending entry
        name: String,
        /// Declared payload offset
        offset: u64,
        /// Declared payload size
        size: u64,
        /// Length of the whole bundle
        len: u64,
    },

    /// unable to find requested file
    #[error("unable to find requested file")]
    FileNotFound(#[from] FileNotFoundError),
}

/// Error type to provide further information when a file has not been found
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested file")]
pub enum FileNotFoundError {
    /// at index {0}
    #[error("at index {0}")]
    Index(usize),

    /// by name {0}
    #[error("by name {0}")]
    Name(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
