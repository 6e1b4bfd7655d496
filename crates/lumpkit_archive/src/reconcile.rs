//! Detection and application of changes made to a backing directory by other programs.

use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use indexmap::IndexMap;
use tracing::{debug, info, instrument, warn};

use crate::archive::ArchiveOptions;
use crate::codec::{DirectoryCodec, FileFailure};
use crate::entry::EntryState;
use crate::error::Result;
use crate::tree::{ArchiveTree, DirId, EntryHandle};

/// One difference between the backing directory and the tree
///
/// Paths are absolute on-disk paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirEntryChange {
    /// A tracked file was rewritten
    UpdatedFile { path: PathBuf, mtime: SystemTime },

    /// A tracked file disappeared
    DeletedFile { path: PathBuf },

    /// A tracked directory disappeared
    DeletedDir { path: PathBuf },

    /// A directory the tree does not know about appeared
    AddedDir { path: PathBuf },

    /// A file the tree does not know about appeared
    AddedFile { path: PathBuf, mtime: SystemTime },
}

impl DirEntryChange {
    pub fn path(&self) -> &Path {
        match self {
            DirEntryChange::UpdatedFile { path, .. }
            | DirEntryChange::DeletedFile { path }
            | DirEntryChange::DeletedDir { path }
            | DirEntryChange::AddedDir { path }
            | DirEntryChange::AddedFile { path, .. } => path,
        }
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        match self {
            DirEntryChange::UpdatedFile { mtime, .. } | DirEntryChange::AddedFile { mtime, .. } => {
                Some(*mtime)
            }
            _ => None,
        }
    }

    pub fn is_deletion(&self) -> bool {
        matches!(
            self,
            DirEntryChange::DeletedFile { .. } | DirEntryChange::DeletedDir { .. }
        )
    }
}

impl Display for DirEntryChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            DirEntryChange::UpdatedFile { .. } => "updated file",
            DirEntryChange::DeletedFile { .. } => "deleted file",
            DirEntryChange::DeletedDir { .. } => "deleted directory",
            DirEntryChange::AddedDir { .. } => "added directory",
            DirEntryChange::AddedFile { .. } => "added file",
        };
        write!(f, "{kind} {}", self.path().display())
    }
}

/// Outcome of applying a batch of changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Changes that altered the tree
    pub applied: usize,
    /// Changes with nothing left to do, such as files of an already removed directory
    pub skipped: usize,
    /// Changes that could not be read from disk
    pub failures: Vec<FileFailure>,
}

/// Keeps a directory backed tree in step with its directory
///
/// Holds the changes already dealt with, either dismissed through
/// [`ChangeReconciler::ignore_changes`] or applied, keyed by path. A recorded change hides later
/// reports of the same change until the file changes again.
#[derive(Debug, Clone, Default)]
pub struct ChangeReconciler {
    ignored: IndexMap<PathBuf, DirEntryChange>,
}

impl ChangeReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Changes currently held back, by path
    pub fn ignored(&self) -> &IndexMap<PathBuf, DirEntryChange> {
        &self.ignored
    }

    /// Whether `change` repeats one already dealt with
    ///
    /// Two deletions repeat each other. A deletion and anything else never do. Two modifications
    /// repeat each other when their modification times are equal; equality rather than ordering
    /// keeps a clock moved backwards from hiding real edits.
    pub fn should_ignore(&self, change: &DirEntryChange) -> bool {
        let Some(previous) = self.ignored.get(change.path()) else {
            return false;
        };
        match (previous.is_deletion(), change.is_deletion()) {
            (true, true) => true,
            (false, false) => previous.mtime() == change.mtime(),
            _ => false,
        }
    }

    /// Dismisses `changes`, replacing earlier records for the same paths
    pub fn ignore_changes(&mut self, changes: &[DirEntryChange]) {
        for change in changes {
            self.ignored.insert(change.path().to_path_buf(), change.clone());
        }
    }

    /// Compares the directory on disk against the tree
    ///
    /// Changes are ordered deleted directories, deleted files, updated files, added directories,
    /// then added files, so applying them in order never touches a removed parent. Only entries
    /// whose stashed path matches their tree path are checked against the disk; paths queued for
    /// removal are never reported as added.
    #[instrument(skip_all, fields(root = %codec.root().display()), err)]
    pub fn detect_changes(
        &self,
        tree: &ArchiveTree,
        codec: &DirectoryCodec,
    ) -> Result<Vec<DirEntryChange>> {
        let disk = codec.scan_disk()?;

        let mut deleted_dirs: Vec<PathBuf> = Vec::new();
        let mut deleted_files = Vec::new();
        let mut updated = Vec::new();

        for handle in tree.flatten(None) {
            let (Some(record), Some(tree_path)) = (tree.handle_record(handle), tree.handle_path(handle))
            else {
                continue;
            };
            let path = codec.disk_path(&tree_path);
            if record.file_path().as_deref() != Some(path.as_path()) {
                continue;
            }

            match handle {
                EntryHandle::Dir(_) => {
                    let covered = deleted_dirs.iter().any(|dir| path.starts_with(dir));
                    if !disk.dirs.contains(&path) && !covered {
                        deleted_dirs.push(path);
                    }
                }
                EntryHandle::Entry(id) => match disk.files.get(&path) {
                    None => deleted_files.push(DirEntryChange::DeletedFile { path }),
                    Some(mtime) if codec.last_modified(id) != Some(*mtime) => {
                        updated.push(DirEntryChange::UpdatedFile {
                            path,
                            mtime: *mtime,
                        })
                    }
                    Some(_) => {}
                },
            }
        }

        let queued = |path: &Path| {
            codec.removed_files().iter().any(|p| p == path) || codec.is_skipped(path)
        };

        let added_dirs = disk.dirs.iter().filter(|dir| {
            !queued(dir)
                && codec
                    .tree_path(dir)
                    .is_some_and(|p| tree.resolve_path(&p).is_none())
        });
        let added_files = disk.files.iter().filter(|(file, _)| {
            !queued(file)
                && codec
                    .tree_path(file)
                    .is_some_and(|p| tree.entry_at_path(&p).is_none())
        });

        let changes: Vec<DirEntryChange> = deleted_dirs
            .into_iter()
            .map(|path| DirEntryChange::DeletedDir { path })
            .chain(deleted_files)
            .chain(updated)
            .chain(added_dirs.map(|path| DirEntryChange::AddedDir { path: path.clone() }))
            .chain(added_files.map(|(path, mtime)| DirEntryChange::AddedFile {
                path: path.clone(),
                mtime: *mtime,
            }))
            .collect();

        debug!(changes = changes.len(), "scanned for external changes");
        Ok(changes)
    }

    /// Applies `changes` to the tree
    ///
    /// Every record touched here ends up unmodified, but an archive with unsaved edits before the
    /// batch is still modified after it, even when a reload replaced the edited bytes. A change that cannot be read from disk is
    /// recorded in the summary and the batch continues. Each change supersedes any record held
    /// for its path and is then recorded itself, so reporting it again is ignored.
    #[instrument(skip_all, fields(changes = changes.len()))]
    pub fn apply_changes(
        &mut self,
        tree: &mut ArchiveTree,
        codec: &mut DirectoryCodec,
        changes: &[DirEntryChange],
        options: &ArchiveOptions,
    ) -> ReconcileSummary {
        let was_modified = tree.is_modified();
        let mut summary = ReconcileSummary::default();

        for change in changes {
            self.ignored.shift_remove(change.path());

            match apply_one(tree, codec, change, options) {
                Ok(true) => {
                    debug!("applied {change}");
                    summary.applied += 1;
                    self.ignored.insert(change.path().to_path_buf(), change.clone());
                }
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    warn!("unable to apply {change}: {e}");
                    summary
                        .failures
                        .push(FileFailure::new(change.path(), &e));
                }
            }
        }

        tree.set_modified(was_modified);
        info!(
            applied = summary.applied,
            skipped = summary.skipped,
            failed = summary.failures.len(),
            "reconciled external changes"
        );
        summary
    }
}

/// Marks the markers of `dir` and its ancestors created by a scan as synchronized
fn settle_dirs(tree: &mut ArchiveTree, dir: DirId) {
    let mut current = Some(dir);
    while let Some(id) = current {
        let Some(node) = tree.dir_mut(id) else {
            return;
        };
        if node.marker().state() == EntryState::New {
            node.marker_mut().set_state(EntryState::Unmodified);
        }
        current = node.parent();
    }
}

fn apply_one(
    tree: &mut ArchiveTree,
    codec: &mut DirectoryCodec,
    change: &DirEntryChange,
    options: &ArchiveOptions,
) -> Result<bool> {
    let Some(tree_path) = codec.tree_path(change.path()) else {
        return Ok(false);
    };

    match change {
        DirEntryChange::UpdatedFile { mtime, .. } => {
            let Some(id) = tree.entry_at_path(&tree_path) else {
                return Ok(false);
            };
            codec.reload_file_entry(tree, id, *mtime, options)?;
            Ok(true)
        }
        DirEntryChange::DeletedFile { .. } => {
            let Some(id) = tree.entry_at_path(&tree_path) else {
                return Ok(false);
            };
            codec.forget(id);
            Ok(tree.remove_entry(id))
        }
        DirEntryChange::DeletedDir { .. } => {
            let Some(dir) = tree.resolve_path(&tree_path) else {
                return Ok(false);
            };
            for handle in tree.flatten(Some(dir)) {
                if let EntryHandle::Entry(id) = handle {
                    codec.forget(id);
                }
            }
            Ok(tree.remove_dir(&tree_path))
        }
        DirEntryChange::AddedDir { path } => {
            if tree.resolve_path(&tree_path).is_some() {
                return Ok(false);
            }
            let dir = codec.add_dir(tree, path)?;
            settle_dirs(tree, dir);
            Ok(true)
        }
        DirEntryChange::AddedFile { path, .. } => {
            if tree.entry_at_path(&tree_path).is_some() {
                return Ok(false);
            }
            let id = codec.load_file_entry(tree, path, options)?;
            if let Some(record) = tree.record_mut(id) {
                record.set_state(EntryState::Unmodified);
            }
            if let Some(dir) = tree.parent_of(id) {
                settle_dirs(tree, dir);
            }
            Ok(true)
        }
    }
}
