use std::io::{Cursor, Read};

use binrw::BinWrite;
use lumpkit_rff::cipher::{blood_crypt, BloodCipher};
use lumpkit_rff::error::{Error, Result};
use lumpkit_rff::types::{RffHeader, RffRecord};
use lumpkit_rff::{is_rff, CipherMethod, RffArchive};
use pretty_assertions::assert_eq;
use tracing::info;
use tracing_test::traced_test;

fn record(name: &[u8], ext: &[u8], offset: u32, size: u32, flags: u8) -> RffRecord {
    let mut record = RffRecord {
        data_offset: offset,
        data_size: size,
        flags,
        ..Default::default()
    };
    record.name[..name.len()].copy_from_slice(name);
    record.extension[..ext.len()].copy_from_slice(ext);
    record
}

/// Directory right after the header, payloads from 0x100 onwards
fn sound_bundle(records: &[RffRecord], payload: &[u8]) -> Result<Vec<u8>> {
    let header = RffHeader {
        directory_offset: 16,
        entries: records.len() as u32,
        ..Default::default()
    };

    let mut out = Cursor::new(Vec::new());
    header.write(&mut out)?;

    let mut table = Cursor::new(Vec::new());
    for r in records {
        r.write(&mut table)?;
    }
    let mut table = table.into_inner();
    blood_crypt(&mut table, 16);

    let mut out = out.into_inner();
    out.extend(table);
    out.resize(0x100, 0);
    out.extend_from_slice(payload);
    Ok(out)
}

#[traced_test]
#[test]
fn open_single_sound() -> Result<()> {
    let input = sound_bundle(&[record(b"SOUND", b"WAV", 0x100, 4, 0)], b"RIFF")?;
    assert!(is_rff(Cursor::new(&input)));

    let mut rff = RffArchive::new(Cursor::new(input))?;
    assert_eq!(rff.len(), 1);
    assert_eq!(rff.index_for_name("SOUND.WAV"), Some(0));

    let mut file = rff.by_index(0)?;
    info!("read {:?}", file);
    assert_eq!(file.name(), "SOUND.WAV");
    assert_eq!(file.size(), 4);
    assert_eq!(file.cipher_method(), CipherMethod::None);

    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    assert_eq!(buffer, b"RIFF");

    Ok(())
}

#[traced_test]
#[test]
fn three_entry_bundle_is_detected() -> Result<()> {
    let mut payload = b"aaaabbbbbbcc".to_vec();
    BloodCipher::for_payload().apply(&mut payload[4..10]);

    let input = sound_bundle(
        &[
            record(b"FIRST", b"DAT", 0x100, 4, 0),
            record(b"SECOND", b"DAT", 0x104, 6, 0x10),
            record(b"THIRD", b"", 0x10A, 2, 0),
        ],
        &payload,
    )?;
    assert!(is_rff(Cursor::new(&input)));

    let mut rff = RffArchive::new(Cursor::new(input))?;
    assert_eq!(
        rff.file_names().collect::<Vec<_>>(),
        vec!["FIRST.DAT", "SECOND.DAT", "THIRD"]
    );
    assert_eq!(rff.data_size(), 12);
    assert_eq!(rff.read_index(1)?, b"bbbbbb");

    Ok(())
}

#[test]
fn magic_mismatch_is_rejected() -> Result<()> {
    let mut input = sound_bundle(&[record(b"SOUND", b"WAV", 0x100, 4, 0)], b"RIFF")?;
    input[3] = 0x1B;

    assert!(!is_rff(Cursor::new(&input)));
    assert!(matches!(
        RffArchive::new(Cursor::new(input)),
        Err(Error::InvalidHeader)
    ));

    Ok(())
}

#[test]
fn declared_size_beyond_length_is_rejected() -> Result<()> {
    // payload reachable, but header + table + sizes exceed the file
    let input = sound_bundle(
        &[
            record(b"A", b"BIN", 0x100, 200, 0),
            record(b"B", b"BIN", 0x100, 200, 0),
            record(b"C", b"BIN", 0x100, 200, 0),
        ],
        &[0u8; 200],
    )?;

    assert!(!is_rff(Cursor::new(&input)));
    assert!(RffArchive::new(Cursor::new(input)).is_ok());

    Ok(())
}

#[test]
fn corrupt_record_aborts_open() -> Result<()> {
    let input = sound_bundle(
        &[
            record(b"GOOD", b"WAV", 0x100, 4, 0),
            record(b"BAD", b"WAV", 0x100, 0x1000, 0),
        ],
        b"RIFF",
    )?;

    match RffArchive::new(Cursor::new(input)) {
        Err(Error::CorruptArchive { name, size, .. }) => {
            assert_eq!(name, "BAD.WAV");
            assert_eq!(size, 0x1000);
        }
        other => panic!("expected a corrupt archive, got {:?}", other.map(|a| a.len())),
    }

    Ok(())
}
