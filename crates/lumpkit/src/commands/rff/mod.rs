pub mod extract;
pub mod list;

#[derive(clap::Subcommand)]
pub enum RffCommands {
    /// List the entries of an RFF bundle
    List(list::ListArgs),
    /// Extract an RFF bundle into a directory
    Extract(extract::ExtractArgs),
}

impl RffCommands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            RffCommands::List(list) => list.handle(),
            RffCommands::Extract(extract) => extract.handle(),
        }
    }
}
