//! The archive tree model.
//!
//! Directories and entries live in two arenas owned by [`ArchiveTree`]; parents are referenced by
//! index only, so the tree never holds shared ownership of its nodes. Slots of removed nodes are
//! left empty and never reused, which keeps stale handles from resolving to a different node.

use derive_more::Display;
use tracing::trace;

use crate::entry::{EntryRecord, EntryState};
use crate::error::{Error, FileNotFoundError, Result};

/// Handle of a directory inside one [`ArchiveTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("dir#{_0}")]
pub struct DirId(usize);

/// Handle of an entry inside one [`ArchiveTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("entry#{_0}")]
pub struct EntryId(usize);

/// One element of a flattened tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryHandle {
    /// The marker record of a directory
    Dir(DirId),

    /// A regular entry
    Entry(EntryId),
}

/// An ordered container of entries and child directories
///
/// The directory name, state and properties are held by its marker record, a folder-typed
/// [`EntryRecord`] that stands in for the directory in flattened views.
#[derive(Debug, Clone)]
pub struct DirectoryNode {
    marker: EntryRecord,
    entries: Vec<EntryId>,
    children: Vec<DirId>,
    parent: Option<DirId>,
}

impl DirectoryNode {
    fn new(name: &str, parent: Option<DirId>) -> Self {
        DirectoryNode {
            marker: EntryRecord::folder(name),
            entries: Vec::new(),
            children: Vec::new(),
            parent,
        }
    }

    pub fn name(&self) -> &str {
        self.marker.name()
    }

    pub fn marker(&self) -> &EntryRecord {
        &self.marker
    }

    pub(crate) fn marker_mut(&mut self) -> &mut EntryRecord {
        &mut self.marker
    }

    /// Entries in canonical order
    pub fn entries(&self) -> &[EntryId] {
        &self.entries
    }

    /// Child directories in creation order
    pub fn children(&self) -> &[DirId] {
        &self.children
    }

    /// The owning directory, `None` for the root
    pub fn parent(&self) -> Option<DirId> {
        self.parent
    }
}

#[derive(Debug, Clone)]
struct EntrySlot {
    record: EntryRecord,
    parent: DirId,
}

/// Compares two names without regard to case
pub(crate) fn names_equal(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// Splits a tree path on either separator, dropping empty and `.` segments
pub(crate) fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
}

fn missing(handle: impl ToString) -> Error {
    Error::FileNotFound(FileNotFoundError::Handle(handle.to_string()))
}

/// A directory tree of entry records
///
/// All structural mutation goes through the tree so the naming invariants hold at all times:
/// a directory never holds a child directory and an entry of the same name, and unless duplicate
/// names are allowed, no two of its entries share a name. Names are compared without regard to
/// case.
#[derive(Debug, Clone)]
pub struct ArchiveTree {
    dirs: Vec<Option<DirectoryNode>>,
    entries: Vec<Option<EntrySlot>>,
    allow_duplicate_names: bool,
    modified: bool,
}

impl Default for ArchiveTree {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ArchiveTree {
    /// An empty tree consisting of the root directory
    pub fn new(allow_duplicate_names: bool) -> Self {
        let mut root = DirectoryNode::new("", None);
        root.marker.set_state(EntryState::Unmodified);

        ArchiveTree {
            dirs: vec![Some(root)],
            entries: Vec::new(),
            allow_duplicate_names,
            modified: false,
        }
    }

    pub fn root(&self) -> DirId {
        DirId(0)
    }

    pub fn allow_duplicate_names(&self) -> bool {
        self.allow_duplicate_names
    }

    pub fn dir(&self, id: DirId) -> Option<&DirectoryNode> {
        self.dirs.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn dir_mut(&mut self, id: DirId) -> Option<&mut DirectoryNode> {
        self.dirs.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn record(&self, id: EntryId) -> Option<&EntryRecord> {
        self.slot(id).map(|slot| &slot.record)
    }

    pub(crate) fn record_mut(&mut self, id: EntryId) -> Option<&mut EntryRecord> {
        self.entries
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .map(|slot| &mut slot.record)
    }

    /// The record behind a flattened handle, the marker for directories
    pub fn handle_record(&self, handle: EntryHandle) -> Option<&EntryRecord> {
        match handle {
            EntryHandle::Dir(id) => self.dir(id).map(DirectoryNode::marker),
            EntryHandle::Entry(id) => self.record(id),
        }
    }

    pub(crate) fn handle_record_mut(&mut self, handle: EntryHandle) -> Option<&mut EntryRecord> {
        match handle {
            EntryHandle::Dir(id) => self.dir_mut(id).map(DirectoryNode::marker_mut),
            EntryHandle::Entry(id) => self.record_mut(id),
        }
    }

    /// The directory holding `id`
    pub fn parent_of(&self, id: EntryId) -> Option<DirId> {
        self.slot(id).map(|slot| slot.parent)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.slot(id).is_some()
    }

    /// Number of entries in the tree, directory markers excluded
    pub fn num_entries(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    /// Every live entry, in arena order
    pub fn entry_ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| EntryId(i))
    }

    /// Finds the first child directory of `dir` called `name`
    pub fn child_named(&self, dir: DirId, name: &str) -> Option<DirId> {
        self.dir(dir)?
            .children
            .iter()
            .copied()
            .find(|child| self.dir(*child).is_some_and(|c| names_equal(c.name(), name)))
    }

    /// Finds the first entry of `dir` called `name`
    pub fn entry_named(&self, dir: DirId, name: &str) -> Option<EntryId> {
        self.dir(dir)?
            .entries
            .iter()
            .copied()
            .find(|entry| self.record(*entry).is_some_and(|r| names_equal(r.name(), name)))
    }

    /// Walks `path` from the root
    ///
    /// The empty path resolves to the root. Both `/` and `\` separate segments.
    pub fn resolve_path(&self, path: &str) -> Option<DirId> {
        segments(path).try_fold(self.root(), |dir, segment| self.child_named(dir, segment))
    }

    /// The entry at `path`, which names its directory and then the entry
    pub fn entry_at_path(&self, path: &str) -> Option<EntryId> {
        let segments: Vec<&str> = segments(path).collect();
        let (name, parents) = segments.split_last()?;

        let dir = parents
            .iter()
            .try_fold(self.root(), |dir, segment| self.child_named(dir, segment))?;
        self.entry_named(dir, name)
    }

    /// Creates every missing directory along `path`
    ///
    /// Existing directories are reused, so creating the same path twice yields the same node.
    /// Fails only when a segment collides with an entry of the same name.
    pub fn create_dir(&mut self, path: &str) -> Result<DirId> {
        let mut dir = self.root();
        for segment in segments(path) {
            dir = match self.child_named(dir, segment) {
                Some(child) => child,
                None => {
                    if self.entry_named(dir, segment).is_some() {
                        return Err(Error::DuplicateName {
                            name: segment.to_owned(),
                        });
                    }
                    self.push_dir(dir, segment)
                }
            };
        }
        Ok(dir)
    }

    fn push_dir(&mut self, parent: DirId, name: &str) -> DirId {
        let id = DirId(self.dirs.len());
        self.dirs.push(Some(DirectoryNode::new(name, Some(parent))));
        if let Some(parent) = self.dir_mut(parent) {
            parent.children.push(id);
        }
        self.modified = true;

        trace!(%id, name, "created directory");
        id
    }

    fn check_name_free(
        &self,
        dir: DirId,
        name: &str,
        except_entry: Option<EntryId>,
        except_dir: Option<DirId>,
    ) -> Result<()> {
        let node = self.dir(dir).ok_or_else(|| missing(dir))?;
        let duplicate = || Error::DuplicateName {
            name: name.to_owned(),
        };

        let dir_clash = node.children.iter().any(|child| {
            Some(*child) != except_dir && self.dir(*child).is_some_and(|c| names_equal(c.name(), name))
        });
        if dir_clash {
            return Err(duplicate());
        }

        // directory renames may never shadow an entry
        if self.allow_duplicate_names && except_dir.is_none() {
            return Ok(());
        }
        let entry_clash = node.entries.iter().any(|entry| {
            Some(*entry) != except_entry
                && self.record(*entry).is_some_and(|r| names_equal(r.name(), name))
        });
        if entry_clash {
            return Err(duplicate());
        }
        Ok(())
    }

    /// Inserts `entry` into `dir` at `position`, or at the end when out of range
    ///
    /// The record enters the tree as [`EntryState::New`].
    pub fn add_entry(
        &mut self,
        mut entry: EntryRecord,
        dir: DirId,
        position: Option<usize>,
    ) -> Result<EntryId> {
        self.check_name_free(dir, entry.name(), None, None)?;
        entry.set_state(EntryState::New);

        let id = EntryId(self.entries.len());
        trace!(%id, name = entry.name(), "adding entry");
        self.entries.push(Some(EntrySlot {
            record: entry,
            parent: dir,
        }));
        self.link(id, dir, position);
        self.modified = true;

        Ok(id)
    }

    fn link(&mut self, id: EntryId, dir: DirId, position: Option<usize>) {
        if let Some(node) = self.dir_mut(dir) {
            let at = position.unwrap_or(usize::MAX).min(node.entries.len());
            node.entries.insert(at, id);
        }
    }

    fn unlink(&mut self, id: EntryId) {
        if let Some(parent) = self.parent_of(id) {
            if let Some(node) = self.dir_mut(parent) {
                node.entries.retain(|e| *e != id);
            }
        }
    }

    /// Detaches an entry, returning whether it was part of this tree
    pub fn remove_entry(&mut self, id: EntryId) -> bool {
        self.take_entry(id).is_some()
    }

    pub(crate) fn take_entry(&mut self, id: EntryId) -> Option<EntryRecord> {
        self.slot(id)?;
        self.unlink(id);
        let slot = self.entries.get_mut(id.0)?.take()?;
        self.modified = true;

        trace!(%id, name = slot.record.name(), "removed entry");
        Some(slot.record)
    }

    /// Drops the directory at `path` together with everything under it
    ///
    /// Returns false when `path` resolves to the root or to nothing.
    pub fn remove_dir(&mut self, path: &str) -> bool {
        match self.resolve_path(path) {
            Some(id) => self.remove_dir_id(id),
            None => false,
        }
    }

    pub(crate) fn remove_dir_id(&mut self, id: DirId) -> bool {
        let Some(parent) = self.dir(id).and_then(DirectoryNode::parent) else {
            return false;
        };
        if let Some(node) = self.dir_mut(parent) {
            node.children.retain(|child| *child != id);
        }
        self.drop_subtree(id);
        self.modified = true;
        true
    }

    fn drop_subtree(&mut self, id: DirId) {
        let Some(node) = self.dirs.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        for entry in node.entries {
            if let Some(slot) = self.entries.get_mut(entry.0) {
                *slot = None;
            }
        }
        for child in node.children {
            self.drop_subtree(child);
        }
        trace!(%id, name = node.marker.name(), "dropped directory");
    }

    /// Renames a directory
    ///
    /// Returns `Ok(false)` for the root or a handle that is not part of this tree.
    pub fn rename_dir(&mut self, id: DirId, new_name: &str) -> Result<bool> {
        if !self.check_dir_rename(id, new_name)? {
            return Ok(false);
        }

        if let Some(node) = self.dir_mut(id) {
            node.marker.set_name(new_name);
        }
        self.modified = true;
        Ok(true)
    }

    /// Whether `id` can be renamed to `new_name` without breaking the naming invariants
    pub(crate) fn check_dir_rename(&self, id: DirId, new_name: &str) -> Result<bool> {
        let Some(parent) = self.dir(id).and_then(DirectoryNode::parent) else {
            return Ok(false);
        };
        self.check_name_free(parent, new_name, None, Some(id))?;
        Ok(true)
    }

    /// Renames an entry, refusing names already taken in its directory
    pub fn rename_entry(&mut self, id: EntryId, new_name: &str) -> Result<()> {
        let parent = self.parent_of(id).ok_or_else(|| missing(id))?;
        self.check_name_free(parent, new_name, Some(id), None)?;

        if let Some(record) = self.record_mut(id) {
            record.set_name(new_name);
        }
        self.modified = true;
        Ok(())
    }

    /// Moves an entry into `dir`, keeping the same record
    pub fn move_entry(&mut self, id: EntryId, dir: DirId, position: Option<usize>) -> Result<()> {
        let name = self.record(id).ok_or_else(|| missing(id))?.name().to_owned();
        if self.parent_of(id) != Some(dir) {
            self.check_name_free(dir, &name, Some(id), None)?;
        }

        self.unlink(id);
        if let Some(slot) = self.entries.get_mut(id.0).and_then(Option::as_mut) {
            slot.parent = dir;
        }
        self.link(id, dir, position);
        self.modified = true;
        Ok(())
    }

    /// Depth first listing of the tree below `start`, the root when `None`
    ///
    /// Each directory yields its marker, then its child directories recursively, then its own
    /// entries. The starting directory itself is listed unless it is the root.
    pub fn flatten(&self, start: Option<DirId>) -> Vec<EntryHandle> {
        let start = start.unwrap_or(self.root());
        let mut out = Vec::new();
        if self.dir(start).is_some() {
            self.flatten_into(start, start != self.root(), &mut out);
        }
        out
    }

    fn flatten_into(&self, id: DirId, include_marker: bool, out: &mut Vec<EntryHandle>) {
        let Some(node) = self.dir(id) else {
            return;
        };
        if include_marker {
            out.push(EntryHandle::Dir(id));
        }
        for child in &node.children {
            self.flatten_into(*child, true, out);
        }
        out.extend(node.entries.iter().copied().map(EntryHandle::Entry));
    }

    /// Entries of `dir`, optionally including those of every subdirectory
    pub fn entries_under(&self, dir: DirId, recursive: bool) -> Vec<EntryId> {
        if !recursive {
            return self
                .dir(dir)
                .map(|node| node.entries.clone())
                .unwrap_or_default();
        }
        self.flatten(Some(dir))
            .into_iter()
            .filter_map(|handle| match handle {
                EntryHandle::Entry(id) => Some(id),
                EntryHandle::Dir(_) => None,
            })
            .collect()
    }

    /// Path of a directory from the root, without a leading separator; the root is `""`
    pub fn dir_path(&self, id: DirId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = self.dir(id)?;
        while let Some(parent) = current.parent {
            names.push(current.name());
            current = self.dir(parent)?;
        }
        names.reverse();
        Some(names.join("/"))
    }

    /// Path of an entry from the root
    pub fn entry_path(&self, id: EntryId) -> Option<String> {
        let slot = self.slot(id)?;
        let dir = self.dir_path(slot.parent)?;
        Some(match dir.is_empty() {
            true => slot.record.name().to_owned(),
            false => format!("{dir}/{}", slot.record.name()),
        })
    }

    pub fn handle_path(&self, handle: EntryHandle) -> Option<String> {
        match handle {
            EntryHandle::Dir(id) => self.dir_path(id),
            EntryHandle::Entry(id) => self.entry_path(id),
        }
    }

    /// Whether anything changed since the last synchronization
    ///
    /// True when a structural change happened or any record is not
    /// [`EntryState::Unmodified`].
    pub fn is_modified(&self) -> bool {
        self.modified
            || self
                .dirs
                .iter()
                .flatten()
                .any(|d| d.marker.state() != EntryState::Unmodified)
            || self
                .entries
                .iter()
                .flatten()
                .any(|s| s.record.state() != EntryState::Unmodified)
    }

    /// Sets the structural part of [`ArchiveTree::is_modified`]
    pub(crate) fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    /// Marks every record as synchronized and clears the structural flag
    pub(crate) fn mark_all_unmodified(&mut self) {
        for node in self.dirs.iter_mut().flatten() {
            node.marker.set_state(EntryState::Unmodified);
        }
        for slot in self.entries.iter_mut().flatten() {
            slot.record.set_state(EntryState::Unmodified);
        }
        self.modified = false;
    }

    fn slot(&self, id: EntryId) -> Option<&EntrySlot> {
        self.entries.get(id.0).and_then(Option::as_ref)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::entry::{EntryRecord, EntryState};
    use crate::error::{Error, Result};
    use crate::tree::{ArchiveTree, EntryHandle};

    #[test]
    fn create_dir_is_idempotent() -> Result<()> {
        let mut tree = ArchiveTree::default();

        let first = tree.create_dir("sounds/ambient")?;
        let second = tree.create_dir("Sounds\\Ambient/")?;

        assert_eq!(first, second);
        assert_eq!(tree.resolve_path("sounds/ambient"), Some(first));
        assert_eq!(tree.dir_path(first).as_deref(), Some("sounds/ambient"));
        assert_eq!(tree.flatten(None).len(), 2);

        Ok(())
    }

    #[test]
    fn resolve_missing_segment() -> Result<()> {
        let mut tree = ArchiveTree::default();
        tree.create_dir("a/b")?;

        assert_eq!(tree.resolve_path("a/c"), None);
        assert_eq!(tree.resolve_path(""), Some(tree.root()));

        Ok(())
    }

    #[test]
    fn duplicate_entry_is_refused() -> Result<()> {
        let mut tree = ArchiveTree::default();
        let root = tree.root();
        tree.add_entry(EntryRecord::new("MAP01.wad"), root, None)?;

        let result = tree.add_entry(EntryRecord::new("map01.WAD"), root, None);
        assert!(matches!(result, Err(Error::DuplicateName { .. })));
        assert_eq!(tree.dir(root).map(|d| d.entries().len()), Some(1));

        Ok(())
    }

    #[test]
    fn duplicates_allowed_when_enabled() -> Result<()> {
        let mut tree = ArchiveTree::new(true);
        let root = tree.root();
        tree.add_entry(EntryRecord::new("A"), root, None)?;
        tree.add_entry(EntryRecord::new("a"), root, None)?;

        assert_eq!(tree.num_entries(), 2);

        Ok(())
    }

    #[test]
    fn entry_and_directory_never_share_a_name() -> Result<()> {
        let mut tree = ArchiveTree::new(true);
        let root = tree.root();
        tree.create_dir("maps")?;
        tree.add_entry(EntryRecord::new("sky"), root, None)?;

        assert!(tree.add_entry(EntryRecord::new("MAPS"), root, None).is_err());
        assert!(tree.create_dir("sky/clouds").is_err());

        Ok(())
    }

    #[test]
    fn insert_position() -> Result<()> {
        let mut tree = ArchiveTree::default();
        let root = tree.root();
        let a = tree.add_entry(EntryRecord::new("A"), root, None)?;
        let c = tree.add_entry(EntryRecord::new("C"), root, Some(99))?;
        let b = tree.add_entry(EntryRecord::new("B"), root, Some(1))?;

        assert_eq!(tree.dir(root).map(|d| d.entries().to_vec()), Some(vec![a, b, c]));
        assert_eq!(tree.record(b).map(EntryRecord::state), Some(EntryState::New));

        Ok(())
    }

    #[test]
    fn remove_dir_cascades() -> Result<()> {
        let mut tree = ArchiveTree::default();
        let dir = tree.create_dir("a/b")?;
        let entry = tree.add_entry(EntryRecord::new("X"), dir, None)?;

        assert!(!tree.remove_dir(""));
        assert!(!tree.remove_dir("missing"));
        assert!(tree.remove_dir("a"));

        assert!(!tree.contains(entry));
        assert_eq!(tree.resolve_path("a/b"), None);
        assert!(tree.flatten(None).is_empty());
        assert!(!tree.remove_entry(entry));

        Ok(())
    }

    #[test]
    fn flatten_order() -> Result<()> {
        let mut tree = ArchiveTree::default();
        let root = tree.root();
        let maps = tree.create_dir("maps")?;
        let textures = tree.create_dir("textures")?;
        let map = tree.add_entry(EntryRecord::new("MAP01.wad"), maps, None)?;
        let top = tree.add_entry(EntryRecord::new("README"), root, None)?;

        assert_eq!(
            tree.flatten(None),
            vec![
                EntryHandle::Dir(maps),
                EntryHandle::Entry(map),
                EntryHandle::Dir(textures),
                EntryHandle::Entry(top),
            ]
        );
        assert_eq!(
            tree.flatten(Some(maps)),
            vec![EntryHandle::Dir(maps), EntryHandle::Entry(map)]
        );

        Ok(())
    }

    #[test]
    fn entry_paths() -> Result<()> {
        let mut tree = ArchiveTree::default();
        let maps = tree.create_dir("maps")?;
        let map = tree.add_entry(EntryRecord::new("MAP01.wad"), maps, None)?;

        assert_eq!(tree.entry_path(map).as_deref(), Some("maps/MAP01.wad"));
        assert_eq!(tree.entry_at_path("MAPS/map01.wad"), Some(map));
        assert_eq!(tree.entry_at_path("maps"), None);

        Ok(())
    }

    #[test]
    fn rename_and_move() -> Result<()> {
        let mut tree = ArchiveTree::default();
        let root = tree.root();
        let a = tree.add_entry(EntryRecord::new("A"), root, None)?;
        tree.add_entry(EntryRecord::new("B"), root, None)?;
        let sub = tree.create_dir("sub")?;

        assert!(tree.rename_entry(a, "b").is_err());
        tree.rename_entry(a, "a")?;
        assert_eq!(tree.record(a).map(EntryRecord::name), Some("a"));

        tree.move_entry(a, sub, None)?;
        assert_eq!(tree.entry_path(a).as_deref(), Some("sub/a"));

        assert!(!tree.rename_dir(root, "x")?);
        assert!(tree.rename_dir(sub, "B").is_err());
        assert!(tree.rename_dir(sub, "renamed")?);
        assert_eq!(tree.entry_path(a).as_deref(), Some("renamed/a"));

        Ok(())
    }

    #[test]
    fn modified_tracking() -> Result<()> {
        let mut tree = ArchiveTree::default();
        assert!(!tree.is_modified());

        let root = tree.root();
        let id = tree.add_entry(EntryRecord::new("A"), root, None)?;
        assert!(tree.is_modified());

        tree.mark_all_unmodified();
        assert!(!tree.is_modified());

        tree.rename_entry(id, "B")?;
        assert!(tree.is_modified());
        assert_eq!(tree.record(id).map(EntryRecord::state), Some(EntryState::Modified));

        Ok(())
    }
}
