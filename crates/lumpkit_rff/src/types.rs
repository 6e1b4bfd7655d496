//! Base types for structure of RFF file.

use binrw::{BinRead, BinWrite};

use crate::cipher::CipherMethod;

/// RFF file header
///
/// Defines the header of the RFF file which always starts with "RFF\x1A" and then a version (0x0301).
/// All data is stored in little endian format
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(magic = b"RFF\x1a", little)]
pub struct RffHeader {
    /// The format version, only 0x0301 is understood
    #[br(assert(version == RffHeader::VERSION))]
    pub version: u32,

    /// The offset from the beginning of the file where the directory table starts
    pub directory_offset: u32,

    /// The number of records stored in the directory table
    pub entries: u32,
}

impl RffHeader {
    /// Size of the header on disk, including the magic
    pub const SIZE: u64 = 16;

    /// The only supported version
    pub const VERSION: u32 = 0x0301;

    /// Size of the directory table in bytes
    pub fn directory_size(&self) -> u64 {
        self.entries as u64 * RffRecord::SIZE
    }
}

impl Default for RffHeader {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            directory_offset: Self::SIZE as u32,
            entries: 0,
        }
    }
}

/// RFF directory record
///
/// Defines an entry in the (decrypted) directory table
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct RffRecord {
    /// Unused leading bytes
    pub reserved: [u32; 4],

    /// The offset to the data for this record from the start of the file
    pub data_offset: u32,

    /// The size of this record's data
    pub data_size: u32,

    /// Unused
    pub reserved_2: u32,

    /// Modification time stamp
    pub time: u32,

    /// Record flags, see [`CipherMethod`]
    pub flags: u8,

    /// Null padded extension, without the dot
    pub extension: [u8; 3],

    /// Null padded base name
    pub name: [u8; 8],

    /// Resource index
    pub index: u32,
}

impl RffRecord {
    /// Size of a record on disk
    pub const SIZE: u64 = 48;

    /// Reconstructs `NAME.EXT` from the fixed width fields
    ///
    /// The dot is left out when the extension field is empty.
    pub fn file_name_raw(&self) -> Vec<u8> {
        let mut raw: Vec<u8> = self.name.iter().copied().take_while(|c| *c != 0).collect();
        let extension = self.extension.iter().copied().take_while(|c| *c != 0);

        let mut extension = extension.peekable();
        if extension.peek().is_some() {
            raw.push(b'.');
            raw.extend(extension);
        }
        raw
    }

    /// Lossy UTF-8 form of [`RffRecord::file_name_raw`]
    pub fn file_name(&self) -> String {
        String::from_utf8_lossy(&self.file_name_raw()).into_owned()
    }

    /// The cipher applied to this record's payload
    pub fn cipher_method(&self) -> CipherMethod {
        CipherMethod::from_flags(self.flags)
    }

    /// End of the payload, computed without overflow
    pub fn data_end(&self) -> u64 {
        self.data_offset as u64 + self.data_size as u64
    }
}
