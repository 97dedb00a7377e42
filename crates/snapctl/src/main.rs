//! SnapUp Control - CLI client for the SnapUp update suite.
//!
//! Talks to the version server for checks and administrative version
//! operations, and can drive a full one-shot update cycle.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "snapctl")]
#[command(about = "SnapUp - application self-update control", long_about = None)]
#[command(version)]
struct Cli {
    /// Override the version server base URL
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show updater state and the last cycle's outcome
    Status,

    /// Ask the version server whether an update exists
    Check,

    /// Run one full update cycle now
    Update,

    /// Administrative version operations on the server
    Version {
        #[command(subcommand)]
        action: VersionAction,
    },
}

#[derive(Subcommand)]
enum VersionAction {
    /// Show the server's current version
    Current,

    /// Publish the next minor version (caps at 1.3)
    Increment {
        /// Release notes for the new version
        #[arg(long)]
        notes: Option<String>,

        /// Mark the new version as a forced update
        #[arg(long)]
        force_update: bool,
    },

    /// Reset the server back to a base version
    Reset {
        /// Version to reset to
        #[arg(long, default_value = "1.0")]
        to: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Status => commands::status().await,
        Commands::Check => commands::check(cli.server).await,
        Commands::Update => commands::update(cli.server).await,
        Commands::Version { action } => match action {
            VersionAction::Current => commands::version_current(cli.server).await,
            VersionAction::Increment {
                notes,
                force_update,
            } => commands::version_increment(cli.server, notes, force_update).await,
            VersionAction::Reset { to } => commands::version_reset(cli.server, to).await,
        },
    }
}
