//! CLI domain: parse, route, help, output, and presentation only.
//! No domain orchestration; single route table dispatches to domain services.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::command_name;
pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_decision_json, format_decision_list_json, format_decision_list_text,
    format_decision_text, format_ingest_summary_json, format_ingest_summary_text,
    IngestSummary,
};
pub use route::RunContext;
