//! The archive facade tying a tree, its codec and change reconciliation together.

use std::fmt::{self, Debug};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use bon::Builder;
use tracing::{debug, instrument};

use crate::codec::{DirectoryCodec, EncryptedBundleCodec, FormatCodec, SaveSummary};
use crate::detect::{BasicTypeDetector, ProgressSink, TypeDetector};
use crate::entry::EntryRecord;
use crate::error::{Error, FileNotFoundError, Result};
use crate::reconcile::{ChangeReconciler, DirEntryChange, ReconcileSummary};
use crate::search::{self, SearchOptions};
use crate::tree::{ArchiveTree, DirId, EntryId};

/// Options for how an archive is opened and kept
#[derive(Debug, Clone, Builder)]
pub struct ArchiveOptions {
    /// Keep entry bytes in memory after reading instead of reloading them on access
    #[builder(default)]
    pub load_data_eagerly: bool,

    /// Skip files and directories whose name starts with `.` in directory archives
    #[builder(default = true)]
    pub ignore_hidden: bool,

    /// Overrides the duplicate name policy of the format; directories forbid duplicate names,
    /// bundles allow them
    pub allow_duplicate_names: Option<bool>,

    /// Refuse every mutation
    #[builder(default)]
    pub read_only: bool,

    /// Type detection run after every byte import
    #[builder(default = Arc::new(BasicTypeDetector))]
    pub detector: Arc<dyn TypeDetector>,

    /// Receives progress while scanning
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Notification sent to subscribers when the archive changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEvent {
    EntryAdded(EntryId),
    EntryRemoved { name: String },
    EntryRenamed { id: EntryId, old_name: String },
    EntryMoved(EntryId),
    EntryModified(EntryId),
    DirAdded(DirId),
    DirRemoved { path: String },
    DirRenamed { id: DirId, old_name: String },
    Saved,
    /// Sent once per batch of external changes instead of per entry events
    Reconciled { applied: usize, failed: usize },
}

type Observer = Box<dyn Fn(&ArchiveEvent) + Send + Sync>;

/// An archive of entries backed by a directory or a resource bundle
///
/// ```no_run
/// use lumpkit_archive::{Archive, ArchiveOptions, SearchOptions};
///
/// fn find_sound() -> lumpkit_archive::error::Result<()> {
///     let mut archive = Archive::open("SOUNDS.RFF", ArchiveOptions::default())?;
///
///     let options = SearchOptions::builder().name("SOUND").build();
///     if let Some(id) = archive.find_first(&options)? {
///         println!("{} bytes", archive.entry_data(id)?.len());
///     }
///     Ok(())
/// }
/// ```
pub struct Archive {
    tree: ArchiveTree,
    codec: FormatCodec,
    reconciler: Option<ChangeReconciler>,
    options: ArchiveOptions,
    observers: Vec<Observer>,
    muted: u32,
}

impl Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("format", &self.codec.name())
            .field("source", &self.codec.source())
            .field("entries", &self.tree.num_entries())
            .field("modified", &self.tree.is_modified())
            .finish()
    }
}

impl Archive {
    fn from_parts(tree: ArchiveTree, codec: FormatCodec, options: ArchiveOptions) -> Self {
        let reconciler = match codec {
            FormatCodec::Directory(_) => Some(ChangeReconciler::new()),
            FormatCodec::EncryptedBundle(_) => None,
        };
        Archive {
            tree,
            codec,
            reconciler,
            options,
            observers: Vec::new(),
            muted: 0,
        }
    }

    /// Opens a filesystem directory as an archive
    pub fn open_dir(root: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self> {
        let (codec, tree) = DirectoryCodec::open(root, &options)?;
        Ok(Self::from_parts(tree, FormatCodec::Directory(codec), options))
    }

    /// Opens an RFF bundle file
    pub fn open_rff(path: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self> {
        let (codec, tree) = EncryptedBundleCodec::open_file(path, &options)?;
        Ok(Self::from_parts(tree, FormatCodec::EncryptedBundle(codec), options))
    }

    /// Opens an RFF bundle held in memory
    pub fn open_rff_bytes(bytes: &[u8], options: ArchiveOptions) -> Result<Self> {
        let (codec, tree) = EncryptedBundleCodec::open_bytes(bytes, &options)?;
        Ok(Self::from_parts(tree, FormatCodec::EncryptedBundle(codec), options))
    }

    /// Opens `path` with the codec matching what is found there
    #[instrument(skip_all, fields(path = %path.as_ref().display()), err)]
    pub fn open(path: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            return Self::open_dir(path, options);
        }

        let file = File::open(path).map_err(Error::file_io(path))?;
        if lumpkit_rff::is_rff(BufReader::new(file)) {
            return Self::open_rff(path, options);
        }
        Err(Error::NotSupported(format!(
            "{} is not a directory or a known archive format",
            path.display()
        )))
    }

    pub fn tree(&self) -> &ArchiveTree {
        &self.tree
    }

    pub fn codec(&self) -> &FormatCodec {
        &self.codec
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Where the archive was read from
    pub fn source(&self) -> Option<&Path> {
        self.codec.source()
    }

    pub fn reconciler(&self) -> Option<&ChangeReconciler> {
        self.reconciler.as_ref()
    }

    pub fn is_read_only(&self) -> bool {
        self.options.read_only || !self.codec.supports_writing()
    }

    /// Whether anything changed since the archive was opened or last saved
    pub fn is_modified(&self) -> bool {
        self.tree.is_modified()
    }

    /// Registers `observer` for every event sent while the archive is not muted
    pub fn subscribe(&mut self, observer: impl Fn(&ArchiveEvent) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Mutes notifications, or lifts one level of muting
    ///
    /// Calls nest: the archive is quiet until every `set_muted(true)` is matched.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = match muted {
            true => self.muted + 1,
            false => self.muted.saturating_sub(1),
        };
    }

    pub fn is_muted(&self) -> bool {
        self.muted > 0
    }

    fn notify(&self, event: ArchiveEvent) {
        if self.is_muted() {
            return;
        }
        for observer in &self.observers {
            observer(&event);
        }
    }

    fn check_writable(&self) -> Result<()> {
        match self.is_read_only() {
            true => Err(Error::ReadOnly),
            false => Ok(()),
        }
    }

    /// Directory archives refuse names their own scan would leave out
    fn check_name(&self, name: &str) -> Result<()> {
        match &self.codec {
            FormatCodec::Directory(codec) => codec.check_name(name),
            FormatCodec::EncryptedBundle(_) => Ok(()),
        }
    }

    fn missing(id: impl ToString) -> Error {
        Error::FileNotFound(FileNotFoundError::Handle(id.to_string()))
    }

    /// The record of an entry
    pub fn record(&self, id: EntryId) -> Option<&EntryRecord> {
        self.tree.record(id)
    }

    /// The directory at `path`
    pub fn dir(&self, path: &str) -> Option<DirId> {
        self.tree.resolve_path(path)
    }

    /// The entry at `path`
    pub fn entry(&self, path: &str) -> Option<EntryId> {
        self.tree.entry_at_path(path)
    }

    /// Path of an entry from the root of the archive
    pub fn entry_path(&self, id: EntryId) -> Option<String> {
        self.tree.entry_path(id)
    }

    /// Entries directly in the directory at `path`, or below it when `recursive`
    pub fn entries_under(&self, path: &str, recursive: bool) -> Vec<EntryId> {
        self.tree
            .resolve_path(path)
            .map(|dir| self.tree.entries_under(dir, recursive))
            .unwrap_or_default()
    }

    /// Creates the directory at `path` and any missing parents
    pub fn create_dir(&mut self, path: &str) -> Result<DirId> {
        self.check_writable()?;
        for segment in crate::tree::segments(path) {
            self.check_name(segment)?;
        }
        let existing = self.tree.resolve_path(path);
        let id = self.tree.create_dir(path)?;
        if existing.is_none() {
            self.notify(ArchiveEvent::DirAdded(id));
        }
        Ok(id)
    }

    /// Inserts `entry` into `dir`, running type detection on its bytes
    pub fn add_entry(
        &mut self,
        mut entry: EntryRecord,
        dir: DirId,
        position: Option<usize>,
    ) -> Result<EntryId> {
        self.check_writable()?;
        self.check_name(entry.name())?;
        if entry.is_loaded() {
            entry.set_type(self.options.detector.detect(&entry));
        }
        let id = self.tree.add_entry(entry, dir, position)?;
        self.notify(ArchiveEvent::EntryAdded(id));
        Ok(id)
    }

    /// Replaces the bytes of an entry
    pub fn set_entry_data(&mut self, id: EntryId, data: impl Into<Vec<u8>>) -> Result<()> {
        self.check_writable()?;
        let detector = Arc::clone(&self.options.detector);
        let record = self.tree.record_mut(id).ok_or_else(|| Self::missing(id))?;
        record.import_data(data.into());
        record.set_type(detector.detect(record));

        self.notify(ArchiveEvent::EntryModified(id));
        Ok(())
    }

    /// The bytes of an entry, reloading them from the source when unloaded
    pub fn entry_data(&mut self, id: EntryId) -> Result<&[u8]> {
        let loaded = self
            .tree
            .record(id)
            .ok_or_else(|| Self::missing(id))?
            .is_loaded();
        if !loaded {
            debug!(%id, "reloading entry data");
            self.codec.load_entry_data(&mut self.tree, id)?;
        }
        self.tree
            .record(id)
            .and_then(EntryRecord::data)
            .ok_or_else(|| Self::missing(id))
    }

    /// Removes an entry, returning whether it was part of the archive
    pub fn remove_entry(&mut self, id: EntryId) -> Result<bool> {
        self.check_writable()?;
        let Some(record) = self.tree.take_entry(id) else {
            return Ok(false);
        };
        if let FormatCodec::Directory(codec) = &mut self.codec {
            codec.on_remove_entry(id, &record);
        }

        self.notify(ArchiveEvent::EntryRemoved {
            name: record.name().to_owned(),
        });
        Ok(true)
    }

    /// Renames an entry; fails up front when a sibling already has `new_name`
    pub fn rename_entry(&mut self, id: EntryId, new_name: &str) -> Result<()> {
        self.check_writable()?;
        self.check_name(new_name)?;
        let record = self.tree.record(id).ok_or_else(|| Self::missing(id))?;
        let (old_name, file_path) = (record.name().to_owned(), record.file_path());
        self.tree.rename_entry(id, new_name)?;
        if let FormatCodec::Directory(codec) = &mut self.codec {
            codec.on_rename_entry(file_path);
        }

        self.notify(ArchiveEvent::EntryRenamed { id, old_name });
        Ok(())
    }

    /// Moves an entry into another directory; the record itself is moved, not copied
    pub fn move_entry(&mut self, id: EntryId, dir: DirId, position: Option<usize>) -> Result<()> {
        self.check_writable()?;
        let from = self.tree.parent_of(id).ok_or_else(|| Self::missing(id))?;
        self.tree.move_entry(id, dir, position)?;

        if from != dir {
            if let (FormatCodec::Directory(codec), Some(record)) =
                (&mut self.codec, self.tree.record(id))
            {
                codec.on_move_entry(record);
            }
        }
        self.notify(ArchiveEvent::EntryMoved(id));
        Ok(())
    }

    /// Inserts a deep copy of an entry into `dir`
    pub fn copy_entry(&mut self, id: EntryId, dir: DirId, position: Option<usize>) -> Result<EntryId> {
        self.check_writable()?;
        self.entry_data(id)?;
        let copy = self
            .tree
            .record(id)
            .ok_or_else(|| Self::missing(id))?
            .duplicate();

        let copy_id = self.tree.add_entry(copy, dir, position)?;
        self.notify(ArchiveEvent::EntryAdded(copy_id));
        Ok(copy_id)
    }

    /// Removes the directory at `path` with everything below it
    ///
    /// Returns `Ok(false)` for the root or a path that does not exist.
    pub fn remove_dir(&mut self, path: &str) -> Result<bool> {
        self.check_writable()?;
        let Some(dir) = self.tree.resolve_path(path) else {
            return Ok(false);
        };
        if dir == self.tree.root() {
            return Ok(false);
        }
        let dir_path = self.tree.dir_path(dir).unwrap_or_default();

        if let FormatCodec::Directory(codec) = &mut self.codec {
            codec.on_remove_dir(&self.tree, dir);
        }
        let removed = self.tree.remove_dir(path);

        self.notify(ArchiveEvent::DirRemoved { path: dir_path });
        Ok(removed)
    }

    /// Renames a directory; files on disk follow on the next save
    pub fn rename_dir(&mut self, dir: DirId, new_name: &str) -> Result<bool> {
        self.check_writable()?;
        self.check_name(new_name)?;
        if !self.tree.check_dir_rename(dir, new_name)? {
            return Ok(false);
        }
        let old_name = self
            .tree
            .dir(dir)
            .map(|node| node.name().to_owned())
            .unwrap_or_default();

        if let FormatCodec::Directory(codec) = &mut self.codec {
            codec.on_rename_dir(&self.tree, dir, new_name);
        }
        let renamed = self.tree.rename_dir(dir, new_name)?;

        self.notify(ArchiveEvent::DirRenamed { id: dir, old_name });
        Ok(renamed)
    }

    /// Every entry matching `options`
    pub fn find_all(&self, options: &SearchOptions) -> Result<Vec<EntryId>> {
        search::find_all(&self.tree, options)
    }

    /// The first entry matching `options`
    pub fn find_first(&self, options: &SearchOptions) -> Result<Option<EntryId>> {
        search::find_first(&self.tree, options)
    }

    /// The last entry matching `options`
    pub fn find_last(&self, options: &SearchOptions) -> Result<Option<EntryId>> {
        search::find_last(&self.tree, options)
    }

    /// Writes the archive back to its source
    pub fn save(&mut self) -> Result<SaveSummary> {
        if self.options.read_only {
            return Err(Error::ReadOnly);
        }
        let summary = self.codec.save(&mut self.tree, &self.options)?;
        self.notify(ArchiveEvent::Saved);
        Ok(summary)
    }

    fn untracked(&self) -> Error {
        Error::NotSupported(format!("change tracking for {} archives", self.codec.name()))
    }

    /// External changes to the backing directory that have not been dealt with yet
    pub fn pending_changes(&self) -> Result<Vec<DirEntryChange>> {
        let (FormatCodec::Directory(codec), Some(reconciler)) = (&self.codec, &self.reconciler)
        else {
            return Err(self.untracked());
        };

        let changes = reconciler.detect_changes(&self.tree, codec)?;
        Ok(changes
            .into_iter()
            .filter(|change| !reconciler.should_ignore(change))
            .collect())
    }

    /// Dismisses `changes` until the files involved change again
    pub fn ignore_changes(&mut self, changes: &[DirEntryChange]) -> Result<()> {
        match &mut self.reconciler {
            Some(reconciler) => {
                reconciler.ignore_changes(changes);
                Ok(())
            }
            None => Err(self.untracked()),
        }
    }

    /// Applies external changes to the tree
    ///
    /// Per entry notifications are muted for the batch; subscribers get a single
    /// [`ArchiveEvent::Reconciled`].
    pub fn apply_changes(&mut self, changes: &[DirEntryChange]) -> Result<ReconcileSummary> {
        let untracked = self.untracked();
        let (FormatCodec::Directory(codec), Some(reconciler)) =
            (&mut self.codec, &mut self.reconciler)
        else {
            return Err(untracked);
        };

        self.muted += 1;
        let summary = reconciler.apply_changes(&mut self.tree, codec, changes, &self.options);
        self.muted -= 1;

        self.notify(ArchiveEvent::Reconciled {
            applied: summary.applied,
            failed: summary.failures.len(),
        });
        Ok(summary)
    }
}
