#![allow(dead_code)]

use std::fs;
use std::io::Cursor;
use std::path::Path;

use binrw::BinWrite;
use lumpkit_archive::error::Result;
use lumpkit_rff::cipher::blood_crypt;
use lumpkit_rff::types::{RffHeader, RffRecord};

pub fn record(name: &[u8], ext: &[u8], offset: u32, size: u32, flags: u8) -> RffRecord {
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

/// Directory table right after the header, payloads from 0x100 onwards
pub fn bundle(records: &[RffRecord], payload: &[u8]) -> Vec<u8> {
    let header = RffHeader {
        directory_offset: 16,
        entries: records.len() as u32,
        ..Default::default()
    };

    let mut out = Cursor::new(Vec::new());
    header.write(&mut out).expect("header fits in memory");

    let mut table = Cursor::new(Vec::new());
    for r in records {
        r.write(&mut table).expect("record fits in memory");
    }
    let mut table = table.into_inner();
    blood_crypt(&mut table, 16);

    let mut out = out.into_inner();
    out.extend(table);
    out.resize(0x100, 0);
    out.extend_from_slice(payload);
    out
}

/// Writes `files` below `root`, creating parent directories as needed
pub fn populate(root: &Path, files: &[(&str, &str)]) -> Result<()> {
    for (path, data) in files {
        let path = root.join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
    }
    Ok(())
}

/// Every file below `root` as a sorted list of `/` separated relative paths
pub fn files_on_disk(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}

/// Every directory below `root`, like [`files_on_disk`]
pub fn dirs_on_disk(root: &Path) -> Vec<String> {
    let mut dirs: Vec<String> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    dirs.sort();
    dirs
}

/// Pushes the modification time of `path` forward so a rewrite is visible on coarse clocks
pub fn touch_later(path: &Path, data: &str) -> Result<()> {
    let before = fs::metadata(path)?.modified()?;
    fs::write(path, data)?;
    let file = fs::OpenOptions::new().write(true).open(path)?;
    file.set_modified(before + std::time::Duration::from_secs(5))?;
    Ok(())
}
