//! CLI parse: clap types for Dateline. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Dateline CLI - canonical "date added" reconciliation for media libraries
#[derive(Parser)]
#[command(name = "dateline")]
#[command(about = "Resolve one authoritative date added per movie or episode")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the date added for one key (movie:<id> or episode:<id>:<s>:<e>)
    Resolve {
        key: String,
        /// Re-run every tier even if a complete decision is cached
        #[arg(long)]
        force: bool,
        /// Media file or folder for the file-mtime tier (repeatable)
        #[arg(long = "path")]
        paths: Vec<PathBuf>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show the cached decision for one key
    Show {
        key: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List cached decisions
    List {
        /// Only decisions that still need attention
        #[arg(long)]
        unresolved: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Rewrite the source tag of every decision carrying FROM
    RemapSource { from: String, to: String },
    /// Read newline-delimited JSON notifications from stdin, coalesce and resolve them
    Ingest {
        /// Override the configured debounce window
        #[arg(long)]
        debounce_ms: Option<u64>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Validate the loaded configuration
    Validate,
}
