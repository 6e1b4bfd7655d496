//! Entry records, the leaves of an archive tree.

use std::path::PathBuf;

use derive_more::{Display, From};
use indexmap::IndexMap;

use crate::detect::TypeId;

/// Property holding the absolute on-disk path of an entry of a directory archive
pub const FILE_PATH: &str = "file_path";

/// Property holding the payload offset of an entry inside a bundle
pub const OFFSET: &str = "offset";

/// Where an entry stands relative to its last synchronized state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryState {
    /// Matches what the codec last read or wrote
    #[default]
    Unmodified,

    /// Changed in memory since it was read or written
    Modified,

    /// Created in memory and never written
    New,
}

/// Obfuscation applied to an entry inside its container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CipherKind {
    /// The running-XOR cipher of RFF bundles
    #[display("blood")]
    Blood,
}

/// Typed value of an extra property
#[derive(Debug, Clone, PartialEq, Eq, Display, From)]
pub enum Value {
    /// Text
    #[display("{_0}")]
    Str(String),

    /// Integer
    #[display("{_0}")]
    Int(i64),

    /// Flag
    #[display("{_0}")]
    Bool(bool),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl Value {
    /// The contained text, if this is a [`Value::Str`]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The contained integer, if this is a [`Value::Int`]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The contained flag, if this is a [`Value::Bool`]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// A single addressable unit of binary data plus metadata
///
/// Records are created by callers or codecs and handed to an [`crate::tree::ArchiveTree`], which
/// owns them from then on. Once inside a tree a record only changes through the tree or the
/// [`crate::Archive`] facade.
///
/// `size` is the logical length of the data and stays valid while the bytes are unloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRecord {
    name: String,
    data: Option<Vec<u8>>,
    size: u64,
    type_id: TypeId,
    state: EntryState,
    encryption: Option<CipherKind>,
    properties: IndexMap<String, Value>,
}

impl EntryRecord {
    /// An empty, loaded entry
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_data(name, Vec::new())
    }

    /// An entry holding `data`
    pub fn with_data(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        EntryRecord {
            name: name.into(),
            size: data.len() as u64,
            data: Some(data),
            type_id: TypeId::UNKNOWN,
            state: EntryState::New,
            encryption: None,
            properties: IndexMap::new(),
        }
    }

    /// Attaches an extra property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub(crate) fn folder(name: impl Into<String>) -> Self {
        EntryRecord {
            name: name.into(),
            data: None,
            size: 0,
            type_id: TypeId::FOLDER,
            state: EntryState::New,
            encryption: None,
            properties: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name up to its last `.`
    pub fn name_no_ext(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.name,
        }
    }

    /// The part of the name after its last `.`, if any
    pub fn extension(&self) -> Option<&str> {
        match self.name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Some(ext),
            _ => None,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// The bytes, when loaded
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    pub fn type_id(&self) -> &TypeId {
        &self.type_id
    }

    /// Whether this record marks a directory
    pub fn is_folder(&self) -> bool {
        self.type_id == TypeId::FOLDER
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn encryption(&self) -> Option<CipherKind> {
        self.encryption
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    /// The on-disk path stashed by a directory archive
    pub fn file_path(&self) -> Option<PathBuf> {
        self.property(FILE_PATH)
            .and_then(Value::as_str)
            .map(PathBuf::from)
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    /// Replaces the bytes and marks the record modified
    pub(crate) fn import_data(&mut self, data: Vec<u8>) {
        self.size = data.len() as u64;
        self.data = Some(data);
        self.touch();
    }

    /// Drops the bytes, keeping size and type
    pub(crate) fn unload_data(&mut self) {
        self.data = None;
    }

    /// Puts bytes back without changing the state
    pub(crate) fn restore_data(&mut self, data: Vec<u8>) {
        self.size = data.len() as u64;
        self.data = Some(data);
    }

    pub(crate) fn set_state(&mut self, state: EntryState) {
        self.state = state;
    }

    pub(crate) fn set_type(&mut self, type_id: TypeId) {
        self.type_id = type_id;
    }

    pub(crate) fn set_encryption(&mut self, encryption: Option<CipherKind>) {
        self.encryption = encryption;
    }

    pub(crate) fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    pub(crate) fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.properties.shift_remove(key)
    }

    /// Deep copy that is not tied to any on-disk location
    pub(crate) fn duplicate(&self) -> EntryRecord {
        let mut copy = self.clone();
        copy.remove_property(FILE_PATH);
        copy.state = EntryState::New;
        copy
    }

    pub(crate) fn touch(&mut self) {
        if self.state != EntryState::New {
            self.state = EntryState::Modified;
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::entry::{EntryRecord, EntryState, Value, FILE_PATH};

    #[test]
    fn name_parts() {
        let entry = EntryRecord::new("MAP01.wad");
        assert_eq!(entry.name_no_ext(), "MAP01");
        assert_eq!(entry.extension(), Some("wad"));

        let entry = EntryRecord::new("README");
        assert_eq!(entry.name_no_ext(), "README");
        assert_eq!(entry.extension(), None);

        let entry = EntryRecord::new(".hidden");
        assert_eq!(entry.name_no_ext(), ".hidden");
        assert_eq!(entry.extension(), None);
    }

    #[test]
    fn size_survives_unload() {
        let mut entry = EntryRecord::with_data("A.TXT", b"hello".to_vec());
        assert_eq!(entry.size(), 5);

        entry.unload_data();
        assert!(!entry.is_loaded());
        assert_eq!(entry.size(), 5);
    }

    #[test]
    fn import_marks_modified_unless_new() {
        let mut entry = EntryRecord::new("A");
        entry.import_data(vec![1, 2, 3]);
        assert_eq!(entry.state(), EntryState::New);

        entry.set_state(EntryState::Unmodified);
        entry.import_data(vec![4]);
        assert_eq!(entry.state(), EntryState::Modified);
        assert_eq!(entry.size(), 1);
    }

    #[test]
    fn duplicate_drops_disk_location() {
        let mut entry = EntryRecord::new("A").with_property(FILE_PATH, "/tmp/a");
        entry.set_state(EntryState::Unmodified);

        let copy = entry.duplicate();
        assert_eq!(copy.file_path(), None);
        assert_eq!(copy.state(), EntryState::New);
        assert!(entry.file_path().is_some());
    }

    #[test]
    fn values() {
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::from(3i64).as_int(), Some(3));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(7i64).to_string(), "7");
    }
}
