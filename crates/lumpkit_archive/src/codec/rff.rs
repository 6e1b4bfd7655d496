//! Blood RFF resource bundles as a read only archive.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use lumpkit_rff::cipher::BloodCipher;
use lumpkit_rff::{is_rff, CipherMethod, RffArchive};
use tracing::{info, instrument, trace};

use crate::archive::ArchiveOptions;
use crate::entry::{CipherKind, EntryRecord, Value, OFFSET};
use crate::error::{Error, FileNotFoundError, Result};
use crate::tree::{ArchiveTree, EntryId};

/// Property holding the raw time stamp of a bundle entry
pub const TIME: &str = "time";

/// Property holding the resource index of a bundle entry
pub const INDEX: &str = "index";

/// Codec for encrypted resource bundles
///
/// Bundles are flat: every entry lands in the root directory, in directory table order. Bundles
/// read from a file remember its path so unloaded entries can be read again; bundles read from
/// memory keep their bytes loaded.
#[derive(Debug, Clone, Default)]
pub struct EncryptedBundleCodec {
    source: Option<PathBuf>,
}

impl EncryptedBundleCodec {
    /// The bundle file, when read from disk
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Structural check of `bytes` without decoding the entries
    pub fn is_this_format(bytes: &[u8]) -> bool {
        is_rff(Cursor::new(bytes))
    }

    /// Reads a bundle held in memory
    pub fn open_bytes(bytes: &[u8], options: &ArchiveOptions) -> Result<(Self, ArchiveTree)> {
        let tree = Self::read(Cursor::new(bytes), false, options)?;
        Ok((EncryptedBundleCodec { source: None }, tree))
    }

    /// Reads the bundle at `path`
    #[instrument(skip_all, fields(path = %path.as_ref().display()), err)]
    pub fn open_file(path: impl AsRef<Path>, options: &ArchiveOptions) -> Result<(Self, ArchiveTree)> {
        let path = path.as_ref();
        let file = File::open(path).map_err(Error::file_io(path))?;
        let tree = Self::read(BufReader::new(file), true, options)?;

        let codec = EncryptedBundleCodec {
            source: Some(path.to_path_buf()),
        };
        Ok((codec, tree))
    }

    /// Decodes every entry into a fresh tree
    ///
    /// [`RffArchive::new`] validates all records before any entry is created, so a corrupt
    /// bundle never yields a partial tree.
    fn read<R: Read + Seek>(reader: R, reloadable: bool, options: &ArchiveOptions) -> Result<ArchiveTree> {
        let mut rff = RffArchive::new(reader)?;
        let mut tree = ArchiveTree::new(options.allow_duplicate_names.unwrap_or(true));
        let root = tree.root();

        let total = rff.len();
        for index in 0..total {
            let info = rff.files()[index].clone();
            let data = rff.read_index(index)?;

            let mut entry = EntryRecord::with_data(&*info.file_name, data)
                .with_property(OFFSET, info.data_start as i64)
                .with_property(TIME, info.time as i64)
                .with_property(INDEX, info.index as i64);
            if info.cipher_method == CipherMethod::Blood {
                entry.set_encryption(Some(CipherKind::Blood));
            }
            entry.set_type(options.detector.detect(&entry));
            if reloadable && !options.load_data_eagerly {
                entry.unload_data();
            }

            trace!(name = %info.file_name, size = info.size, "read bundle entry");
            tree.add_entry(entry, root, None)?;

            if let Some(progress) = &options.progress {
                progress.report_progress(&info.file_name, (index + 1) as f32 / total as f32);
            }
        }

        tree.mark_all_unmodified();
        info!(entries = total, "opened rff bundle");
        Ok(tree)
    }

    /// Writing bundles is refused; the directory layout cannot be reproduced faithfully
    pub fn write(&self) -> Result<()> {
        Err(Error::NotSupported("writing rff bundles".into()))
    }

    /// Reads the payload of an entry again from the bundle file and decrypts it
    pub fn load_entry_data(&self, tree: &mut ArchiveTree, id: EntryId) -> Result<()> {
        let record = tree
            .record(id)
            .ok_or_else(|| Error::FileNotFound(FileNotFoundError::Handle(id.to_string())))?;
        let Some(source) = &self.source else {
            return Err(Error::NotSupported(format!(
                "{} was not read from a file",
                record.name()
            )));
        };
        let offset = record
            .property(OFFSET)
            .and_then(Value::as_int)
            .ok_or_else(|| Error::MissingProperty {
                name: record.name().to_owned(),
                property: OFFSET,
            })?;

        let mut file = File::open(source).map_err(Error::file_io(source))?;
        file.seek(SeekFrom::Start(offset as u64))
            .map_err(Error::file_io(source))?;
        let mut data = vec![0u8; record.size() as usize];
        file.read_exact(&mut data).map_err(Error::file_io(source))?;
        if record.is_encrypted() {
            BloodCipher::for_payload().apply(&mut data);
        }

        if let Some(record) = tree.record_mut(id) {
            record.restore_data(data);
        }
        Ok(())
    }
}
