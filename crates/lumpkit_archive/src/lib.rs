//! A uniform tree of entries over the containers game data ships in.
//!
//! # Model
//!
//! An [`Archive`] owns an [`ArchiveTree`] of directories and [`EntryRecord`]s, the
//! [`FormatCodec`] that reads the tree from its source and writes it back, and for directory
//! backed archives a [`ChangeReconciler`] that keeps the tree in step with edits made on disk by
//! other programs.
//!
//! | Format      | Codec                    | Read | Write | Duplicate names | Change tracking |
//! |-------------|--------------------------|------|-------|-----------------|-----------------|
//! | Directory   | [`DirectoryCodec`]       | yes  | yes   | refused         | yes             |
//! | RFF bundle  | [`EncryptedBundleCodec`] | yes  | no    | allowed         | no              |
//!
//! ## Entries
//!
//! Every entry carries its name, its size, its detected [`TypeId`], its [`EntryState`] and a bag
//! of typed properties the codecs use for bookkeeping:
//!
//! - `file_path`: absolute on-disk path of an entry or directory of a directory archive
//! - `offset`, `time`, `index`: position, time stamp and resource index inside a bundle
//!
//! Bytes may be released after reading; [`Archive::entry_data`] reloads them from the source.
//!
//! ## Names and paths
//!
//! Paths inside an archive use `/` (a `\` is accepted too) and never start with a separator.
//! Names are compared without regard to case, and a directory never holds an entry and a
//! subdirectory of the same name.
//!
//! ## Saving directories
//!
//! Saving writes only entries that are new, modified or moved, deletes the files of removed or
//! renamed entries, then removes directories left without a tree counterpart, deepest first.
//! A file that cannot be written is reported in the [`SaveSummary`] without aborting the save.
//!

pub mod archive;
pub mod codec;
pub mod detect;
pub mod entry;
pub mod error;
pub mod reconcile;
pub mod search;
pub mod tree;

pub use archive::{Archive, ArchiveEvent, ArchiveOptions};
pub use codec::{DirectoryCodec, EncryptedBundleCodec, FileFailure, FormatCodec, SaveSummary};
pub use detect::{BasicTypeDetector, ProgressSink, TypeDetector, TypeId};
pub use entry::{CipherKind, EntryRecord, EntryState, Value};
pub use reconcile::{ChangeReconciler, DirEntryChange, ReconcileSummary};
pub use search::SearchOptions;
pub use tree::{ArchiveTree, DirId, DirectoryNode, EntryHandle, EntryId};
