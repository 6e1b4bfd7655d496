pub mod find;
pub mod watch;

#[derive(clap::Subcommand)]
pub enum DirCommands {
    /// Search a directory for entries
    Find(find::FindArgs),
    /// Follow changes made to a directory by other programs
    Watch(watch::WatchArgs),
}

impl DirCommands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            DirCommands::Find(find) => find.handle(),
            DirCommands::Watch(watch) => watch.handle(),
        }
    }
}
