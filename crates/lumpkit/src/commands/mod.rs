pub mod dir;
pub mod rff;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Handle RFF bundles
    Rff {
        #[command(subcommand)]
        command: rff::RffCommands,
    },
    /// Handle directories as archives
    Dir {
        #[command(subcommand)]
        command: dir::DirCommands,
    },
}

impl Commands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            Commands::Rff { command } => command.handle(),
            Commands::Dir { command } => command.handle(),
        }
    }
}
