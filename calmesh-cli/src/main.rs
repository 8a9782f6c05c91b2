mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "calmesh")]
#[command(about = "Keep a set of calendars in sync with each other")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass across the selected calendars
    Sync,
    /// Pick which calendars participate in the mesh
    Select,
    /// Show configuration and sync state summary
    Status,
    /// Manage calendars in the local backend
    Calendars {
        #[command(subcommand)]
        action: CalendarAction,
    },
}

#[derive(Subcommand)]
enum CalendarAction {
    /// List calendars
    List,
    /// Add a new calendar
    Add { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync => commands::sync::run().await,
        Commands::Select => commands::select::run().await,
        Commands::Status => commands::status::run().await,
        Commands::Calendars { action } => match action {
            CalendarAction::List => commands::calendars::list().await,
            CalendarAction::Add { name } => commands::calendars::add(&name).await,
        },
    }
}
