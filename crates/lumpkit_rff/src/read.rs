//! Types for reading RFF bundles
//!

use binrw::BinRead;
use byteorder::{LittleEndian, ReadBytesExt};
use std::{
    fmt::{self, Debug},
    io::{self, Cursor, Read, Seek},
};
use tracing::{debug, instrument};

use crate::{
    cipher::{BloodCipher, CipherMethod, RffBlockReader},
    error::{Error, FileNotFoundError, Result},
    types::{RffHeader, RffRecord},
};

const MAGIC: [u8; 4] = *b"RFF\x1a";

/// A struct for reading an entry from an RFF file
///
/// Reading yields the plain payload, the encrypted prefix is transformed on the fly.
pub struct RffFile<'a, R: Read + Seek> {
    data: &'a RffFileData,
    reader: RffBlockReader<'a, R>,
}

impl<R: Read + Seek> Debug for RffFile<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RffFile({:#?})", self.data)
    }
}

/// Methods for retrieving information on RFF file entries
impl<R: Read + Seek> RffFile<'_, R> {
    /// Get the name of the file as `NAME.EXT`
    pub fn name(&self) -> &str {
        &self.data.file_name
    }

    /// Get the name of the file, in the raw (internal) byte representation.
    pub fn name_raw(&self) -> &[u8] {
        &self.data.file_name_raw
    }

    /// Get the size of the file, in bytes
    pub fn size(&self) -> u64 {
        self.data.size
    }

    /// Get the starting offset of the data of the file
    pub fn data_start(&self) -> u64 {
        self.data.data_start
    }

    /// Get the cipher applied to this file
    pub fn cipher_method(&self) -> CipherMethod {
        self.data.cipher_method
    }

    /// Whether the leading bytes of this file are encrypted
    pub fn is_encrypted(&self) -> bool {
        self.data.cipher_method == CipherMethod::Blood
    }

    /// Get the raw time stamp stored in the directory
    pub fn time(&self) -> u32 {
        self.data.time
    }

    /// Get the resource index stored in the directory
    pub fn index(&self) -> u32 {
        self.data.index
    }
}

impl<R: Read + Seek> Read for RffFile<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Structure representing an RFF file entry.
#[derive(Debug, Clone, Default)]
pub struct RffFileData {
    /// Name of the file
    pub file_name: Box<str>,
    /// Raw file name. To be used when file_name was incorrectly decoded.
    pub file_name_raw: Box<[u8]>,
    /// Specifies where the data of the file starts
    pub data_start: u64,
    /// Size of the file
    pub size: u64,
    /// Cipher applied to the payload
    pub cipher_method: CipherMethod,
    /// Raw time stamp
    pub time: u32,
    /// Resource index
    pub index: u32,
}

impl From<&RffRecord> for RffFileData {
    fn from(record: &RffRecord) -> Self {
        let raw = record.file_name_raw();
        RffFileData {
            file_name: String::from_utf8_lossy(&raw).into(),
            file_name_raw: raw.into(),
            data_start: record.data_offset as u64,
            size: record.data_size as u64,
            cipher_method: record.cipher_method(),
            time: record.time,
            index: record.index,
        }
    }
}

#[derive(Debug)]
struct Shared {
    header: RffHeader,
    len: u64,
    files: Vec<RffFileData>,
}

/// RFF bundle reader
///
/// Opening validates the header and every directory record up front, so a successfully
/// constructed reader never points outside of its input.
///
/// ```no_run
/// use std::io::prelude::*;
///
/// fn list_rff_contents(reader: impl Read + Seek) -> lumpkit_rff::error::Result<()> {
///     let mut rff = lumpkit_rff::RffArchive::new(reader)?;
///
///     for i in 0..rff.len() {
///         let mut file = rff.by_index(i)?;
///         println!("Filename: {}", file.name());
///         std::io::copy(&mut file, &mut std::io::stdout())?;
///     }
///
///     Ok(())
/// }
/// ```
pub struct RffArchive<R> {
    reader: R,
    shared: Shared,
}

impl<R> RffArchive<R> {
    /// Total size of the payloads in the bundle
    pub fn data_size(&self) -> u64 {
        self.shared.files.iter().map(|f| f.size).sum()
    }

    /// Length of the whole bundle in bytes
    pub fn bundle_len(&self) -> u64 {
        self.shared.len
    }

    /// Offset of the directory table
    pub fn directory_offset(&self) -> u32 {
        self.shared.header.directory_offset
    }
}

impl<R: Read + Seek> RffArchive<R> {
    /// Read an RFF bundle collecting the files it contains.
    ///
    /// Fails with [`Error::InvalidHeader`] when the magic or version do not match and with
    /// [`Error::CorruptArchive`] as soon as any record points past the end of the input.
    #[instrument(skip(reader), err)]
    pub fn new(mut reader: R) -> Result<RffArchive<R>> {
        let shared = Self::get_metadata(&mut reader)?;
        debug!(entries = shared.files.len(), "opened rff bundle");

        Ok(RffArchive { reader, shared })
    }

    /// Number of entries contained in this RFF.
    pub fn len(&self) -> usize {
        self.shared.files.len()
    }

    /// Whether this RFF bundle contains no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over all the file names in this bundle, in directory order.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.shared.files.iter().map(|f| f.file_name.as_ref())
    }

    /// Returns the metadata of every entry, in directory order.
    pub fn files(&self) -> &[RffFileData] {
        &self.shared.files
    }

    /// Get the index of the first file entry matching `name`, ignoring case.
    pub fn index_for_name(&self, name: &str) -> Option<usize> {
        self.shared
            .files
            .iter()
            .position(|f| f.file_name.eq_ignore_ascii_case(name))
    }

    /// Get the name of a file entry, if it's present.
    pub fn name_for_index(&self, index: usize) -> Option<&str> {
        self.shared.files.get(index).map(|f| f.file_name.as_ref())
    }

    /// Search for a file entry by name
    pub fn by_name(&mut self, name: &str) -> Result<RffFile<'_, R>> {
        let Some(index) = self.index_for_name(name) else {
            return Err(Error::FileNotFound(FileNotFoundError::Name(
                name.to_owned(),
            )));
        };
        self.by_index(index)
    }

    /// Get a contained file by index
    pub fn by_index(&mut self, file_number: usize) -> Result<RffFile<'_, R>> {
        let data = self
            .shared
            .files
            .get(file_number)
            .ok_or(Error::FileNotFound(FileNotFoundError::Index(file_number)))?;

        let cipher = match data.cipher_method {
            CipherMethod::None => None,
            CipherMethod::Blood => Some(BloodCipher::for_payload()),
        };

        Ok(RffFile {
            data,
            reader: RffBlockReader::new(&mut self.reader, data.data_start, data.size, cipher)?,
        })
    }

    /// Reads a whole file into memory
    pub fn read_index(&mut self, file_number: usize) -> Result<Vec<u8>> {
        let mut file = self.by_index(file_number)?;
        let mut buffer = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Unwrap and return the inner reader object
    ///
    /// The position of the reader is undefined.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn get_metadata(reader: &mut R) -> Result<Shared> {
        let len = reader.seek(io::SeekFrom::End(0))?;
        reader.rewind()?;

        let header = RffHeader::read(reader).map_err(|e| {
            debug!("rejecting header: {e}");
            Error::InvalidHeader
        })?;

        let records = get_records(reader, &header, len)?;

        let files = records
            .iter()
            .map(|record| {
                if record.data_end() > len {
                    return Err(Error::CorruptArchive {
                        name: record.file_name(),
                        offset: record.data_offset as u64,
                        size: record.data_size as u64,
                        len,
                    });
                }
                Ok(RffFileData::from(record))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Shared { header, len, files })
    }
}

fn get_records<R: Read + Seek>(reader: &mut R, header: &RffHeader, len: u64) -> Result<Vec<RffRecord>> {
    let offset = header.directory_offset as u64;
    let size = header.directory_size();
    if offset + size > len {
        return Err(Error::CorruptArchive {
            name: "directory".into(),
            offset,
            size,
            len,
        });
    }

    let mut table = Vec::with_capacity(size as usize);
    RffBlockReader::new(
        reader,
        offset,
        size,
        Some(BloodCipher::for_directory(header.directory_offset)),
    )?
    .read_to_end(&mut table)?;

    let mut table = Cursor::new(table);
    (0..header.entries)
        .map(|_| RffRecord::read(&mut table).map_err(Error::from))
        .collect()
}

fn probe<R: Read + Seek>(reader: &mut R) -> Result<bool> {
    let len = reader.seek(io::SeekFrom::End(0))?;
    reader.rewind()?;

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    let version = reader.read_u32::<LittleEndian>()?;
    let directory_offset = reader.read_u32::<LittleEndian>()?;
    let entries = reader.read_u32::<LittleEndian>()?;

    if magic != MAGIC || version != RffHeader::VERSION {
        return Ok(false);
    }

    let header = RffHeader {
        version,
        directory_offset,
        entries,
    };
    let records = get_records(reader, &header, len)?;

    let total = RffHeader::SIZE
        + header.directory_size()
        + records.iter().map(|r| r.data_size as u64).sum::<u64>();

    Ok(total <= len)
}

/// Checks whether `reader` holds an RFF bundle without decoding its entries
///
/// Validates the magic and version, decrypts the directory table, and checks that the header,
/// the table and every declared payload together fit inside the input.
pub fn is_rff<R: Read + Seek>(mut reader: R) -> bool {
    match probe(&mut reader) {
        Ok(valid) => valid,
        Err(e) => {
            debug!("not an rff bundle: {e}");
            false
        }
    }
}
