use clap::Args;
use itertools::Itertools;
use lumpkit_archive::codec::rff::{INDEX, TIME};
use lumpkit_archive::entry::OFFSET;
use lumpkit_archive::{Archive, ArchiveOptions, EntryRecord, Value};
use miette::{Context, IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args)]
pub struct ListArgs {
    /// An input RFF file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Print the listing as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Listing {
    name: String,
    size: u64,
    offset: Option<i64>,
    time: Option<i64>,
    index: Option<i64>,
    encrypted: bool,
    #[serde(rename = "type")]
    type_id: String,
}

impl From<&EntryRecord> for Listing {
    fn from(record: &EntryRecord) -> Self {
        let int = |key| record.property(key).and_then(Value::as_int);
        Listing {
            name: record.name().to_owned(),
            size: record.size(),
            offset: int(OFFSET),
            time: int(TIME),
            index: int(INDEX),
            encrypted: record.is_encrypted(),
            type_id: record.type_id().to_string(),
        }
    }
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let archive = Archive::open_rff(&self.file, ArchiveOptions::default())
            .context(format!("path: {}", &self.file.display()))?;

        let listing = archive
            .entries_under("", false)
            .into_iter()
            .filter_map(|id| archive.record(id))
            .map(Listing::from)
            .collect::<Vec<_>>();

        if self.json {
            let out = serde_json::to_string_pretty(&listing).into_diagnostic()?;
            println!("{}", out);
            return Ok(());
        }

        for entry in &listing {
            let flags = [
                entry.encrypted.then_some("encrypted"),
                Some(entry.type_id.as_str()),
            ]
            .into_iter()
            .flatten()
            .join(", ");

            println!(
                "{:>5} {:<12} {:>10} @ {:<10} {}",
                entry.index.unwrap_or_default(),
                entry.name.bold(),
                entry.size,
                entry.offset.unwrap_or_default(),
                flags.dimmed()
            );
        }
        println!("{} entries", listing.len());

        Ok(())
    }
}
