//! This library handles reading **RFF** resource bundles.
//!
//! # RFF Bundle Format Documentation
//!
//! An RFF file is a single binary container holding many named resources (sounds, tiles, scripts).
//! Its directory is obfuscated with a simple running-XOR stream cipher, and individual resources may
//! have their first bytes obfuscated with the same cipher. RFF files are typically identified with
//! the `.rff` extension.
//!
//! ## File Structure
//!
//! An RFF file consists of a fixed header, the resource payloads, and an encrypted directory table.
//! The directory is usually placed after the payloads but the header gives its absolute offset, so
//! readers must not assume a position.
//!
//! | Offset (bytes) | Field                  | Description                                                |
//! |----------------|------------------------|------------------------------------------------------------|
//! | 0x0000         | Magic number           | 4 bytes: `"RFF"` followed by `0x1A`                        |
//! | 0x0004         | Version                | 4 bytes: Fixed value 0x00000301                            |
//! | 0x0008         | Directory Offset       | 4 bytes: Offset to the directory table                     |
//! | 0x000C         | Entry Count            | 4 bytes: Number of records in the directory table          |
//!
//! ### Directory Table
//!
//! The directory table holds `Entry Count` fixed-size records of 48 bytes. The whole table is
//! encrypted with the stream cipher keyed by the low byte of the directory offset. Each record has
//! the following structure once decrypted:
//!
//! | Offset (bytes) | Field                  | Description                                             |
//! |----------------|------------------------|---------------------------------------------------------|
//! | 0x0000         | Reserved               | 16 bytes: Unused                                        |
//! | 0x0010         | Data Offset            | 4 bytes: Offset from the start of the file to the data  |
//! | 0x0014         | Size                   | 4 bytes: Size of the data                               |
//! | 0x0018         | Reserved               | 4 bytes: Unused                                         |
//! | 0x001C         | Time                   | 4 bytes: Modification time stamp                        |
//! | 0x0020         | Flags                  | 1 byte: Bit 0x10 marks the payload as encrypted         |
//! | 0x0021         | Extension              | 3 bytes: Null padded file extension                     |
//! | 0x0024         | Name                   | 8 bytes: Null padded file name                          |
//! | 0x002C         | Index                  | 4 bytes: Resource index used by sound lookups           |
//!
//! ### Cipher
//!
//! The cipher XORs every byte with `key + (position >> 1)`, truncated to a byte, so the keystream
//! advances by one every two bytes. Decrypting with the wrong key produces garbage rather than an
//! error. Encrypted payloads only have their first 256 bytes transformed, always with key `0`.
//!
//! ## Additional Information
//!
//! - **File Extension**: `.rff`
//! - **Endianness**: Little-endian for all multi-byte integers
//! - **Writing**: unsupported, the remaining container layout is not fully known
//!

pub mod cipher;
pub mod error;
pub mod read;
pub mod types;

pub use cipher::CipherMethod;
pub use read::{is_rff, RffArchive};
