mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use photolala_core::Library;

/// Photolala — local photo catalog with cloud sync
#[derive(Parser)]
#[command(name = "photolala", version, about)]
struct Cli {
    /// Path to the photo library root
    #[arg(long, default_value = ".")]
    library: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and catalog photos under the library root
    Scan,
    /// Show catalog status summary
    Status,
    /// List all cataloged photos
    Ls,
    /// Manage catalog snapshots: list or prune
    Snapshots {
        #[command(subcommand)]
        action: Option<SnapshotsAction>,
    },
    /// Push the catalog and photos to a remote store
    Sync {
        /// Path to the remote store directory
        #[arg(long)]
        remote: PathBuf,
        /// User namespace on the remote
        #[arg(long)]
        user: String,
    },
    /// Remove a photo from the catalog by its digest
    Rm {
        /// Full content digest of the photo
        digest: String,
    },
}

#[derive(Subcommand)]
enum SnapshotsAction {
    /// List all snapshots, newest first
    List,
    /// Delete old snapshots, keeping the newest ones
    Prune {
        /// Number of snapshots to keep
        #[arg(long, default_value_t = 10)]
        keep: usize,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let library = Library::open(&cli.library)?;

    match cli.command {
        Commands::Scan => commands::scan::run(&library)?,
        Commands::Status => commands::status::run(&library)?,
        Commands::Ls => commands::ls::run(&library)?,
        Commands::Snapshots { action } => match action {
            None | Some(SnapshotsAction::List) => commands::snapshots::list(&library)?,
            Some(SnapshotsAction::Prune { keep }) => commands::snapshots::prune(&library, keep)?,
        },
        Commands::Sync { remote, user } => commands::sync::run(&library, &remote, &user)?,
        Commands::Rm { digest } => commands::rm::run(&library, &digest)?,
    }

    Ok(())
}
