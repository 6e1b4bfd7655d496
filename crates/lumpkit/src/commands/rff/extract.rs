use clap::Args;
use lumpkit_archive::error::Error;
use lumpkit_archive::{Archive, ArchiveOptions, EntryRecord};
use miette::{miette, Context, IntoDiagnostic, Result};
use std::{collections::HashSet, path::PathBuf};
use tracing::{info, warn};

#[derive(Args)]
pub struct ExtractArgs {
    /// An input RFF file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let mut bundle = Archive::open_rff(&self.file, ArchiveOptions::default())
            .context(format!("path: {}", &self.file.display()))?;

        std::fs::create_dir_all(&self.directory)
            .into_diagnostic()
            .context(format!("creating {}", &self.directory.display()))?;
        let mut target = Archive::open_dir(&self.directory, ArchiveOptions::default())
            .context(format!("path: {}", &self.directory.display()))?;
        let root = target.tree().root();

        let mut seen = HashSet::new();
        for id in bundle.entries_under("", false) {
            let Some(name) = bundle.record(id).map(|r| r.name().to_owned()) else {
                continue;
            };
            if !seen.insert(name.to_lowercase()) {
                warn!("skipping duplicate entry {}", name);
                continue;
            }
            let data = bundle.entry_data(id)?.to_vec();

            match target.entry(&name) {
                Some(existing) if self.overwrite => {
                    info!("overwriting {}", name);
                    target.set_entry_data(existing, data)?;
                }
                Some(_) => {
                    return Err(miette!(
                        "{} already exists in {}, pass --overwrite to replace it",
                        name,
                        self.directory.display()
                    ));
                }
                None => match target.add_entry(EntryRecord::with_data(name.as_str(), data), root, None) {
                    Ok(_) => info!("extracting {}", name),
                    Err(Error::DuplicateName { name }) => {
                        warn!("skipping {}, a directory of that name exists", name)
                    }
                    Err(e @ Error::HiddenName { .. }) => warn!("skipping {}: {}", name, e),
                    Err(e) => return Err(e.into()),
                },
            }
        }

        let summary = target.save().context("writing extracted entries")?;
        if !summary.failures.is_empty() {
            for failure in &summary.failures {
                warn!("{}: {}", failure.path.display(), failure.reason);
            }
            return Err(miette!(
                "{} of {} entries could not be written",
                summary.failures.len(),
                summary.failures.len() + summary.files_written
            ));
        }
        info!(
            "wrote {} files into {}",
            summary.files_written,
            self.directory.display()
        );

        Ok(())
    }
}
