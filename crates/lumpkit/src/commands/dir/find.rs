use clap::Args;
use lumpkit_archive::{Archive, ArchiveOptions, SearchOptions, TypeId};
use miette::{miette, Context, Result};
use owo_colors::OwoColorize;
use std::path::PathBuf;

#[derive(Args)]
pub struct FindArgs {
    /// An input directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Only search below this top level directory
    #[arg(short, long, value_name = "NAMESPACE")]
    namespace: Option<String>,

    /// Entry name, `*` and `?` act as wildcards
    #[arg(long, value_name = "PATTERN")]
    name: Option<String>,

    /// Detected entry type, such as `wad`, `wav` or `text`
    #[arg(short, long = "type", value_name = "TYPE")]
    type_id: Option<String>,

    /// Print every match instead of the first one
    #[arg(short, long, default_value_t = false)]
    all: bool,
}

impl FindArgs {
    pub fn handle(&self) -> Result<()> {
        let archive = Archive::open_dir(&self.directory, ArchiveOptions::default())
            .context(format!("path: {}", &self.directory.display()))?;

        let options = SearchOptions::builder()
            .maybe_namespace(self.namespace.clone())
            .maybe_name(self.name.clone())
            .maybe_type_id(self.type_id.clone().map(TypeId::new))
            .search_subdirs(true)
            .build();

        let found = match self.all {
            true => archive.find_all(&options)?,
            false => archive.find_first(&options)?.into_iter().collect(),
        };
        if found.is_empty() {
            return Err(miette!("no matching entry in {}", self.directory.display()));
        }

        for id in found {
            let (Some(path), Some(record)) = (archive.entry_path(id), archive.record(id)) else {
                continue;
            };
            println!("{} {}", path, record.type_id().dimmed());
        }

        Ok(())
    }
}
