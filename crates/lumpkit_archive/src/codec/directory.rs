//! A plain filesystem directory used as an archive.
//!
//! The directory tree on disk *is* the format: every file becomes an entry, every directory a
//! [`DirectoryNode`](crate::tree::DirectoryNode). Saving writes only the entries that changed and
//! prunes what was removed from the tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info, instrument, trace, warn};
use walkdir::WalkDir;

use crate::archive::ArchiveOptions;
use crate::codec::{FileFailure, SaveSummary};
use crate::entry::{EntryRecord, EntryState, FILE_PATH};
use crate::error::{Error, FileNotFoundError, Result};
use crate::tree::{ArchiveTree, DirId, EntryHandle, EntryId};

/// Files and directories found by one scan of the backing directory
#[derive(Debug, Default)]
pub(crate) struct DiskState {
    pub files: IndexMap<PathBuf, SystemTime>,
    pub dirs: IndexSet<PathBuf>,
}

/// Codec for directory backed archives
///
/// Besides the root it keeps the bookkeeping a save needs: the modification time last seen for
/// every entry and the on-disk paths that have been removed from the tree since the last save.
#[derive(Debug, Clone)]
pub struct DirectoryCodec {
    root: PathBuf,
    ignore_hidden: bool,
    mtimes: IndexMap<EntryId, SystemTime>,
    removed_files: Vec<PathBuf>,
    renamed_dirs: Vec<(PathBuf, PathBuf)>,
    skipped: Vec<FileFailure>,
}

pub(crate) fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_str().is_some_and(is_hidden_name)
}

impl DirectoryCodec {
    pub fn new(root: impl Into<PathBuf>, ignore_hidden: bool) -> Self {
        DirectoryCodec {
            root: root.into(),
            ignore_hidden,
            mtimes: IndexMap::new(),
            removed_files: Vec::new(),
            renamed_dirs: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// The directory backing the archive
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk paths queued for deletion on the next save
    pub fn removed_files(&self) -> &[PathBuf] {
        &self.removed_files
    }

    /// Directory renames since the last save, as old and new on-disk path
    pub fn renamed_dirs(&self) -> &[(PathBuf, PathBuf)] {
        &self.renamed_dirs
    }

    /// Paths left out when the directory was opened, such as names differing only in case
    pub fn skipped(&self) -> &[FileFailure] {
        &self.skipped
    }

    /// Whether `path` is, or lies below, a path left out when the directory was opened
    pub(crate) fn is_skipped(&self, path: &Path) -> bool {
        self.skipped.iter().any(|s| path.starts_with(&s.path))
    }

    /// Refuses names the next scan would not see
    pub(crate) fn check_name(&self, name: &str) -> Result<()> {
        match self.ignore_hidden && is_hidden_name(name) {
            true => Err(Error::HiddenName {
                name: name.to_owned(),
            }),
            false => Ok(()),
        }
    }

    /// Modification time recorded when the entry was last read or written
    pub fn last_modified(&self, id: EntryId) -> Option<SystemTime> {
        self.mtimes.get(&id).copied()
    }

    /// Scans `root` into a new tree
    ///
    /// Reads every file once for type detection, then releases the bytes unless
    /// [`ArchiveOptions::load_data_eagerly`] is set. Nothing on disk is modified.
    #[instrument(skip_all, fields(root = %root.as_ref().display()), err)]
    pub fn open(root: impl AsRef<Path>, options: &ArchiveOptions) -> Result<(Self, ArchiveTree)> {
        let root = root.as_ref();
        let meta = fs::metadata(root).map_err(Error::file_io(root))?;
        if !meta.is_dir() {
            return Err(Error::NotSupported(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let mut codec = DirectoryCodec::new(root, options.ignore_hidden);
        let mut tree = ArchiveTree::new(options.allow_duplicate_names.unwrap_or(false));

        let items = codec.walk()?;
        let total = items.len();
        for (i, item) in items.iter().enumerate() {
            let loaded = if item.file_type().is_dir() {
                codec.add_dir(&mut tree, item.path()).map(drop)
            } else if item.file_type().is_file() {
                codec
                    .load_file_entry(&mut tree, item.path(), options)
                    .map(drop)
            } else {
                Ok(())
            };
            match loaded {
                Ok(()) => {}
                Err(e @ Error::DuplicateName { .. }) => {
                    warn!(path = %item.path().display(), "skipping: {e}");
                    codec.skipped.push(FileFailure::new(item.path(), &e));
                }
                Err(e) => return Err(e),
            }

            if let Some(progress) = &options.progress {
                progress.report_progress(&path_string(item.path()), (i + 1) as f32 / total as f32);
            }
        }

        tree.mark_all_unmodified();
        info!(
            entries = tree.num_entries(),
            skipped = codec.skipped.len(),
            "opened directory archive"
        );

        Ok((codec, tree))
    }

    fn walk(&self) -> Result<Vec<walkdir::DirEntry>> {
        let ignore_hidden = self.ignore_hidden;
        WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !(ignore_hidden && is_hidden(e)))
            .map(|item| {
                item.map_err(|e| {
                    let path = e.path().unwrap_or(&self.root).to_path_buf();
                    Error::FileIo {
                        path,
                        source: e.into(),
                    }
                })
            })
            .collect()
    }

    /// Current files and directories below the root
    pub(crate) fn scan_disk(&self) -> Result<DiskState> {
        let mut state = DiskState::default();
        for item in self.walk()? {
            if item.file_type().is_dir() {
                state.dirs.insert(item.into_path());
            } else if item.file_type().is_file() {
                let mtime = item
                    .metadata()
                    .map_err(|e| Error::FileIo {
                        path: item.path().to_path_buf(),
                        source: e.into(),
                    })?
                    .modified()
                    .map_err(Error::file_io(item.path()))?;
                state.files.insert(item.into_path(), mtime);
            }
        }
        Ok(state)
    }

    /// Tree path of an on-disk path below the root
    pub(crate) fn tree_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(segments.join("/"))
    }

    /// On-disk path of a tree path
    pub(crate) fn disk_path(&self, tree_path: &str) -> PathBuf {
        crate::tree::segments(tree_path).fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn outside_root(path: &Path) -> Error {
        Error::FileNotFound(FileNotFoundError::Path(path_string(path)))
    }

    /// Creates the directory for `path` and stashes its on-disk location
    pub(crate) fn add_dir(&self, tree: &mut ArchiveTree, path: &Path) -> Result<DirId> {
        let relative = self
            .tree_path(path)
            .ok_or_else(|| Self::outside_root(path))?;
        let id = tree.create_dir(&relative)?;
        if id != tree.root() {
            if let Some(node) = tree.dir_mut(id) {
                node.marker_mut().set_property(FILE_PATH, path_string(path));
            }
        }
        Ok(id)
    }

    /// Builds the entry for the file at `path` and inserts it into the tree
    ///
    /// Shared by the initial scan and by reconciliation of added files.
    pub(crate) fn load_file_entry(
        &mut self,
        tree: &mut ArchiveTree,
        path: &Path,
        options: &ArchiveOptions,
    ) -> Result<EntryId> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Self::outside_root(path))?;
        let dir = match path.parent() {
            Some(parent) if parent != self.root => self.add_dir(tree, parent)?,
            _ => tree.root(),
        };

        let data = fs::read(path).map_err(Error::file_io(path))?;
        let mtime = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(Error::file_io(path))?;

        let mut entry = EntryRecord::with_data(name, data).with_property(FILE_PATH, path_string(path));
        entry.set_type(options.detector.detect(&entry));
        if !options.load_data_eagerly {
            entry.unload_data();
        }

        let id = tree.add_entry(entry, dir, None)?;
        self.mtimes.insert(id, mtime);

        trace!(path = %path.display(), "loaded file entry");
        Ok(id)
    }

    /// Re-reads the bytes of an entry from its stashed `file_path`
    pub fn load_entry_data(&self, tree: &mut ArchiveTree, id: EntryId) -> Result<()> {
        let record = tree
            .record(id)
            .ok_or_else(|| Error::FileNotFound(FileNotFoundError::Handle(id.to_string())))?;
        let path = record
            .file_path()
            .ok_or_else(|| Error::MissingProperty {
                name: record.name().to_owned(),
                property: FILE_PATH,
            })?;

        let data = fs::read(&path).map_err(Error::file_io(&path))?;
        if let Some(record) = tree.record_mut(id) {
            record.restore_data(data);
        }
        Ok(())
    }

    /// Re-imports an entry whose file changed on disk
    pub(crate) fn reload_file_entry(
        &mut self,
        tree: &mut ArchiveTree,
        id: EntryId,
        mtime: SystemTime,
        options: &ArchiveOptions,
    ) -> Result<()> {
        self.load_entry_data(tree, id)?;
        if let Some(record) = tree.record_mut(id) {
            record.set_type(options.detector.detect(record));
            record.set_state(EntryState::Unmodified);
            if !options.load_data_eagerly {
                record.unload_data();
            }
        }
        self.mtimes.insert(id, mtime);
        Ok(())
    }

    pub(crate) fn on_remove_entry(&mut self, id: EntryId, record: &EntryRecord) {
        self.mtimes.shift_remove(&id);
        self.queue_removal(record);
    }

    pub(crate) fn on_rename_entry(&mut self, file_path: Option<PathBuf>) {
        self.queue_path(file_path);
    }

    pub(crate) fn on_move_entry(&mut self, record: &EntryRecord) {
        self.queue_removal(record);
    }

    /// Queues every file below `dir`, which is about to be removed
    pub(crate) fn on_remove_dir(&mut self, tree: &ArchiveTree, dir: DirId) {
        for handle in tree.flatten(Some(dir)) {
            if let EntryHandle::Entry(id) = handle {
                self.mtimes.shift_remove(&id);
            }
            if let Some(record) = tree.handle_record(handle) {
                self.queue_removal(record);
            }
        }
    }

    /// Records that `dir` is about to be renamed to `new_name`
    ///
    /// Files are moved by the next save, which writes them under their new path and prunes the
    /// old ones queued here.
    pub(crate) fn on_rename_dir(&mut self, tree: &ArchiveTree, dir: DirId, new_name: &str) {
        let Some(old_path) = tree.dir_path(dir).map(|p| self.disk_path(&p)) else {
            return;
        };
        let new_path = old_path.with_file_name(new_name);
        debug!(from = %old_path.display(), to = %new_path.display(), "directory renamed");
        self.renamed_dirs.push((old_path, new_path));

        for handle in tree.flatten(Some(dir)) {
            if let Some(record) = tree.handle_record(handle) {
                self.queue_removal(record);
            }
        }
    }

    pub(crate) fn forget(&mut self, id: EntryId) {
        self.mtimes.shift_remove(&id);
    }

    fn queue_removal(&mut self, record: &EntryRecord) {
        self.queue_path(record.file_path());
    }

    fn queue_path(&mut self, file_path: Option<PathBuf>) {
        if let Some(path) = file_path {
            if !self.removed_files.contains(&path) {
                self.removed_files.push(path);
            }
        }
    }

    fn needs_write(&self, record: &EntryRecord, path: &Path) -> bool {
        record.state() != EntryState::Unmodified || record.file_path().as_deref() != Some(path)
    }

    /// Writes the tree back to the directory
    ///
    /// Only entries that changed or moved are written. Queued removals are deleted first, then
    /// directories without a tree counterpart are removed children first. A directory that cannot
    /// be created fails the whole save; a file that cannot be written is recorded in the summary
    /// and leaves its entry modified.
    #[instrument(skip_all, fields(root = %self.root.display()), err)]
    pub fn save(&mut self, tree: &mut ArchiveTree, options: &ArchiveOptions) -> Result<SaveSummary> {
        let mut summary = SaveSummary::default();

        let planned: Vec<(EntryHandle, PathBuf)> = tree
            .flatten(None)
            .into_iter()
            .filter_map(|handle| Some((handle, self.disk_path(&tree.handle_path(handle)?))))
            .collect();
        let planned_paths: IndexSet<&Path> = planned.iter().map(|(_, p)| p.as_path()).collect();

        // bytes of moved entries must be read before their old files are pruned
        let mut unreadable = IndexSet::new();
        for (handle, path) in &planned {
            let EntryHandle::Entry(id) = *handle else {
                continue;
            };
            let Some(record) = tree.record(id) else {
                continue;
            };
            if record.is_loaded() || !self.needs_write(record, path) {
                continue;
            }
            if let Err(e) = self.load_entry_data(tree, id) {
                warn!(path = %path.display(), "unable to load entry for saving: {e}");
                summary.failures.push(FileFailure::new(path, &e));
                unreadable.insert(id);
                // its old file must survive for a later save to read
                if let Some(old) = tree.record(id).and_then(EntryRecord::file_path) {
                    self.removed_files.retain(|p| *p != old);
                }
            }
        }

        let disk = self.scan_disk()?;

        // hidden files are missing from the scan, so queued paths are checked directly
        for path in self.removed_files.drain(..) {
            if !path.is_file() || planned_paths.contains(path.as_path()) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    trace!(path = %path.display(), "removed file");
                    summary.files_removed += 1;
                }
                Err(e) => warn!(path = %path.display(), "unable to remove file: {e}"),
            }
        }

        let mut stale_dirs: Vec<&PathBuf> = disk
            .dirs
            .iter()
            .filter(|dir| !planned_paths.contains(dir.as_path()) && !self.is_skipped(dir))
            .collect();
        stale_dirs.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
        for dir in stale_dirs {
            match fs::remove_dir(dir) {
                Ok(()) => {
                    trace!(path = %dir.display(), "removed directory");
                    summary.dirs_removed += 1;
                }
                Err(e) => warn!(path = %dir.display(), "unable to remove directory: {e}"),
            }
        }

        let mut failed = Vec::new();
        for (handle, path) in &planned {
            match *handle {
                EntryHandle::Dir(id) => {
                    if !disk.dirs.contains(path) {
                        fs::create_dir_all(path).map_err(Error::file_io(path))?;
                        summary.dirs_created += 1;
                    }
                    if let Some(marker) = tree.handle_record_mut(EntryHandle::Dir(id)) {
                        marker.set_property(FILE_PATH, path_string(path));
                        marker.set_state(EntryState::Unmodified);
                    }
                }
                EntryHandle::Entry(id) => {
                    if unreadable.contains(&id) {
                        failed.push(id);
                        continue;
                    }
                    match self.write_entry(tree, id, path, options) {
                        Ok(true) => summary.files_written += 1,
                        Ok(false) => {}
                        Err(e) => {
                            warn!(path = %path.display(), "unable to write entry: {e}");
                            summary.failures.push(FileFailure::new(path, &e));
                            failed.push(id);
                        }
                    }
                }
            }
        }

        self.renamed_dirs.clear();
        tree.set_modified(false);
        for id in failed {
            if let Some(record) = tree.record_mut(id) {
                record.touch();
            }
        }

        info!(
            written = summary.files_written,
            removed = summary.files_removed,
            failed = summary.failures.len(),
            "saved directory archive"
        );
        Ok(summary)
    }

    /// Writes one entry unless it already sits unchanged at `path`
    fn write_entry(
        &mut self,
        tree: &mut ArchiveTree,
        id: EntryId,
        path: &Path,
        options: &ArchiveOptions,
    ) -> Result<bool> {
        let Some(record) = tree.record_mut(id) else {
            return Ok(false);
        };
        if !self.needs_write(record, path) {
            return Ok(false);
        }

        fs::write(path, record.data().unwrap_or_default()).map_err(Error::file_io(path))?;
        let mtime = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(Error::file_io(path))?;

        record.set_property(FILE_PATH, path_string(path));
        record.set_state(EntryState::Unmodified);
        if !options.load_data_eagerly {
            record.unload_data();
        }
        self.mtimes.insert(id, mtime);

        trace!(path = %path.display(), "wrote entry");
        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::Path;

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use crate::archive::ArchiveOptions;
    use crate::codec::DirectoryCodec;
    use crate::entry::{EntryRecord, EntryState, FILE_PATH};
    use crate::error::{Error, Result};
    use crate::tree::ArchiveTree;

    #[test]
    fn paths_map_both_ways() {
        let codec = DirectoryCodec::new("/data/game", true);

        assert_eq!(
            codec.disk_path("maps/MAP01.wad"),
            Path::new("/data/game/maps/MAP01.wad")
        );
        assert_eq!(
            codec.tree_path(Path::new("/data/game/maps/MAP01.wad")).as_deref(),
            Some("maps/MAP01.wad")
        );
        assert_eq!(codec.tree_path(Path::new("/elsewhere/x")), None);
    }

    #[test]
    #[traced_test]
    fn open_skips_hidden_files() -> Result<()> {
        let root = tempfile::tempdir()?;
        fs::write(root.path().join("visible.txt"), b"hi")?;
        fs::write(root.path().join(".hidden"), b"secret")?;
        fs::create_dir(root.path().join(".git"))?;
        fs::write(root.path().join(".git").join("HEAD"), b"ref")?;

        let (_, tree) = DirectoryCodec::open(root.path(), &ArchiveOptions::default())?;
        assert_eq!(tree.num_entries(), 1);
        assert!(tree.entry_at_path("visible.txt").is_some());

        let options = ArchiveOptions::builder().ignore_hidden(false).build();
        let (_, tree) = DirectoryCodec::open(root.path(), &options)?;
        assert_eq!(tree.num_entries(), 3);

        assert!(logs_contain("opened directory archive"));
        Ok(())
    }

    #[test]
    fn lazy_entries_reload_from_disk() -> Result<()> {
        let root = tempfile::tempdir()?;
        fs::write(root.path().join("A.TXT"), b"hello")?;

        let (codec, mut tree) = DirectoryCodec::open(root.path(), &ArchiveOptions::default())?;
        let id = tree.entry_at_path("A.TXT").expect("entry is listed");
        let record = tree.record(id).expect("entry is live");
        assert!(!record.is_loaded());
        assert_eq!(record.size(), 5);
        assert_eq!(record.state(), EntryState::Unmodified);

        codec.load_entry_data(&mut tree, id)?;
        assert_eq!(tree.record(id).and_then(EntryRecord::data), Some(&b"hello"[..]));

        Ok(())
    }

    #[test]
    fn open_rejects_files() -> Result<()> {
        let root = tempfile::tempdir()?;
        let file = root.path().join("plain");
        fs::write(&file, b"x")?;

        assert!(DirectoryCodec::open(&file, &ArchiveOptions::default()).is_err());
        Ok(())
    }

    #[test]
    fn entries_without_a_file_path_cannot_reload() -> Result<()> {
        let codec = DirectoryCodec::new("/data/game", true);
        let mut tree = ArchiveTree::default();
        let root = tree.root();
        let id = tree.add_entry(EntryRecord::new("NEW.TXT"), root, None)?;

        let result = codec.load_entry_data(&mut tree, id);
        assert!(matches!(
            result,
            Err(Error::MissingProperty { property: FILE_PATH, .. })
        ));
        Ok(())
    }
}
