//! CLI help: stable command names for logs.

use crate::cli::parse::Commands;

pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Resolve { .. } => "resolve",
        Commands::Show { .. } => "show",
        Commands::List { .. } => "list",
        Commands::RemapSource { .. } => "remap-source",
        Commands::Ingest { .. } => "ingest",
        Commands::Validate => "validate",
    }
}
