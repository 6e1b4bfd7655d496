//! Running-XOR stream cipher and block reading.

use std::fmt::{self, Display};
use std::io::{self, Read, Seek};

use tracing::instrument;

use crate::error::Result;

/// Identifies how a payload inside the RFF file is obfuscated
///
/// Stored as bit `0x10` of [`crate::types::RffRecord::flags`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum CipherMethod {
    /// Stores the data as it is
    #[default]
    None,

    /// The leading [`PAYLOAD_LIMIT`] bytes are XORed with the running keystream
    Blood,
}

impl CipherMethod {
    /// Record flag bit marking an encrypted payload
    pub const FLAG: u8 = 0x10;

    /// Extracts the cipher from a record's flag byte
    pub fn from_flags(flags: u8) -> Self {
        if flags & Self::FLAG != 0 {
            CipherMethod::Blood
        } else {
            CipherMethod::None
        }
    }
}

impl Display for CipherMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherMethod::None => write!(f, "none"),
            CipherMethod::Blood => write!(f, "blood"),
        }
    }
}

/// Key used for every encrypted payload
pub const PAYLOAD_KEY: u8 = 0;

/// Number of leading payload bytes that are encrypted
pub const PAYLOAD_LIMIT: u64 = 256;

/// Keystream state
///
/// Byte `i` of the stream is XORed with `key + (i >> 1)`. Bytes at or past `limit` pass through
/// untouched but still advance the position.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BloodCipher {
    key: u8,
    position: u64,
    limit: u64,
}

impl BloodCipher {
    /// A keystream that transforms the first `limit` bytes it sees
    pub fn new(key: u8, limit: u64) -> Self {
        Self {
            key,
            position: 0,
            limit,
        }
    }

    /// The cipher for a directory table found at `offset`
    pub fn for_directory(offset: u32) -> Self {
        Self::new(offset as u8, u64::MAX)
    }

    /// The cipher for an encrypted payload
    pub fn for_payload() -> Self {
        Self::new(PAYLOAD_KEY, PAYLOAD_LIMIT)
    }

    /// Transforms `buf` in place and advances the stream by its length
    pub fn apply(&mut self, buf: &mut [u8]) {
        let remaining = self.limit.saturating_sub(self.position);
        let span = (buf.len() as u64).min(remaining) as usize;

        for (i, byte) in buf[..span].iter_mut().enumerate() {
            let position = self.position + i as u64;
            *byte ^= self.key.wrapping_add((position >> 1) as u8);
        }

        self.position += buf.len() as u64;
    }
}

/// Applies the cipher with `key` over the whole of `data`
///
/// The transform is its own inverse.
pub fn blood_crypt(data: &mut [u8], key: u8) {
    BloodCipher::new(key, u64::MAX).apply(data)
}

pub(crate) enum RffBlockReader<'a, R: Read + Seek> {
    Raw(io::Take<&'a mut R>),
    Encrypted(io::Take<&'a mut R>, BloodCipher),
}

impl<'a, R: Read + Seek> RffBlockReader<'a, R> {
    #[instrument(skip(reader))]
    pub fn new(
        reader: &'a mut R,
        start: u64,
        limit: u64,
        cipher: Option<BloodCipher>,
    ) -> Result<Self> {
        reader.seek(io::SeekFrom::Start(start))?;

        let limit_reader = reader.by_ref().take(limit);
        Ok(match cipher {
            None => RffBlockReader::Raw(limit_reader),
            Some(cipher) => RffBlockReader::Encrypted(limit_reader, cipher),
        })
    }
}

impl<R: Read + Seek> Read for RffBlockReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            RffBlockReader::Raw(r) => r.read(buf),
            RffBlockReader::Encrypted(r, cipher) => {
                let read = r.read(buf)?;
                cipher.apply(&mut buf[..read]);
                Ok(read)
            }
        }
    }
}
