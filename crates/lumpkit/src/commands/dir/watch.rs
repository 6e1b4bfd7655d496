use clap::Args;
use lumpkit_archive::{Archive, ArchiveEvent, ArchiveOptions, DirEntryChange};
use miette::{Context, Result};
use owo_colors::OwoColorize;
use std::{path::PathBuf, thread, time::Duration};
use tracing::{debug, info, warn};

#[derive(Args)]
pub struct WatchArgs {
    /// An input directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Seconds to wait between scans
    #[arg(short, long, value_name = "SECONDS", default_value_t = 2)]
    interval: u64,

    /// Stop after this many scans instead of running until interrupted
    #[arg(short = 'n', long, value_name = "COUNT")]
    iterations: Option<u64>,
}

fn print_change(change: &DirEntryChange) {
    match change {
        DirEntryChange::AddedDir { .. } | DirEntryChange::AddedFile { .. } => {
            println!("✅ {}", change.green())
        }
        DirEntryChange::DeletedDir { .. } | DirEntryChange::DeletedFile { .. } => {
            println!("❌ {}", change.red())
        }
        DirEntryChange::UpdatedFile { .. } => println!("🔃 {}", change.blue()),
    }
}

impl WatchArgs {
    pub fn handle(&self) -> Result<()> {
        let mut archive = Archive::open_dir(&self.directory, ArchiveOptions::default())
            .context(format!("path: {}", &self.directory.display()))?;
        archive.subscribe(|event| {
            if let ArchiveEvent::Reconciled { applied, failed } = event {
                debug!(applied, failed, "archive reconciled");
            }
        });

        info!(
            "watching {} ({} entries)",
            self.directory.display(),
            archive.tree().num_entries()
        );

        let mut scans = 0;
        while self.iterations.map_or(true, |limit| scans < limit) {
            thread::sleep(Duration::from_secs(self.interval));
            scans += 1;

            let changes = archive.pending_changes().context("scanning for changes")?;
            if changes.is_empty() {
                continue;
            }
            changes.iter().for_each(print_change);

            let summary = archive.apply_changes(&changes)?;
            for failure in &summary.failures {
                warn!("{}: {}", failure.path.display(), failure.reason);
            }
            info!(
                "applied {} changes, {} entries",
                summary.applied,
                archive.tree().num_entries()
            );
        }

        Ok(())
    }
}
