//! Error types that can be emitted from this library

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// I/O failure on a specific file
    #[error("unable to access {}", path.display())]
    FileIo {
        /// The file or directory being accessed
        path: PathBuf,
        /// The underlying failure
        #[source]
        source: std::io::Error,
    },

    /// Transparent wrapper for [`lumpkit_rff::error::Error`]
    ///
    /// Carries header validation and corrupt directory failures of bundles.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Rff(#[from] lumpkit_rff::error::Error),

    /// the operation is not supported by this archive format
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// an entry or directory with this name already exists
    #[error("an entry or directory named {name} already exists")]
    #[diagnostic(help("names are compared without regard to case"))]
    DuplicateName {
        /// The conflicting name
        name: String,
    },

    /// a name the directory scan would skip as hidden
    #[error("{name} is hidden and would be dropped from the archive")]
    #[diagnostic(help("open the directory with `ignore_hidden` disabled to keep hidden files"))]
    HiddenName {
        /// The refused name
        name: String,
    },

    /// an entry lacks the property its codec locates it by
    #[error("entry {name} has no {property} property")]
    MissingProperty {
        /// Name of the entry
        name: String,
        /// The property looked up
        property: &'static str,
    },

    /// the archive was opened read only
    #[error("the archive is read only")]
    ReadOnly,

    /// a search pattern could not be compiled
    #[error("invalid search pattern {pattern}")]
    InvalidPattern {
        /// The pattern as given
        pattern: String,
        /// The compiler failure
        #[source]
        source: regex::Error,
    },

    /// unable to find requested entry
    #[error("unable to find requested entry")]
    FileNotFound(#[from] FileNotFoundError),
}

/// Error type to provide further information when an entry has not been found
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested entry")]
pub enum FileNotFoundError {
    /// entry handle {0} is not part of this archive
    #[error("entry handle {0} is not part of this archive")]
    Handle(String),

    /// at path {0}
    #[error("at path {0}")]
    Path(String),
}

impl Error {
    pub(crate) fn file_io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |source| Error::FileIo { path, source }
    }
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
