//! Format codecs translating between an external representation and an [`ArchiveTree`].

use std::path::{Path, PathBuf};

use crate::archive::ArchiveOptions;
use crate::error::Result;
use crate::tree::{ArchiveTree, EntryId};

pub mod directory;
pub mod rff;

pub use directory::DirectoryCodec;
pub use rff::EncryptedBundleCodec;

/// A per-file failure that did not abort its batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    /// The file being read or written
    pub path: PathBuf,
    /// Human readable cause
    pub reason: String,
}

impl FileFailure {
    pub(crate) fn new(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        FileFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Outcome of a save
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub files_written: usize,
    pub files_removed: usize,
    pub dirs_created: usize,
    pub dirs_removed: usize,
    /// Files that could not be written; their entries stay modified
    pub failures: Vec<FileFailure>,
}

impl SaveSummary {
    /// Whether the save touched the filesystem at all
    pub fn is_noop(&self) -> bool {
        self.files_written == 0
            && self.files_removed == 0
            && self.dirs_created == 0
            && self.dirs_removed == 0
    }
}

/// The container formats an archive can be backed by
#[derive(Debug, Clone)]
pub enum FormatCodec {
    /// A filesystem directory
    Directory(DirectoryCodec),

    /// An encrypted RFF resource bundle
    EncryptedBundle(EncryptedBundleCodec),
}

impl FormatCodec {
    /// Short name of the format
    pub fn name(&self) -> &'static str {
        match self {
            FormatCodec::Directory(_) => "directory",
            FormatCodec::EncryptedBundle(_) => "rff",
        }
    }

    /// Where the archive was read from, when it came from the filesystem
    pub fn source(&self) -> Option<&Path> {
        match self {
            FormatCodec::Directory(codec) => Some(codec.root()),
            FormatCodec::EncryptedBundle(codec) => codec.source(),
        }
    }

    /// Whether [`FormatCodec::save`] can ever succeed
    pub fn supports_writing(&self) -> bool {
        matches!(self, FormatCodec::Directory(_))
    }

    /// Reloads the bytes of an unloaded entry from the external source
    pub fn load_entry_data(&self, tree: &mut ArchiveTree, id: EntryId) -> Result<()> {
        match self {
            FormatCodec::Directory(codec) => codec.load_entry_data(tree, id),
            FormatCodec::EncryptedBundle(codec) => codec.load_entry_data(tree, id),
        }
    }

    /// Persists `tree` back to the external source
    pub fn save(&mut self, tree: &mut ArchiveTree, options: &ArchiveOptions) -> Result<SaveSummary> {
        match self {
            FormatCodec::Directory(codec) => codec.save(tree, options),
            FormatCodec::EncryptedBundle(codec) => codec.write().map(|_| SaveSummary::default()),
        }
    }
}
