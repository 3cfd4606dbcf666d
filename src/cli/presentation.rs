//! CLI presentation: text and json formatters per command family.

mod decision;
mod ingest;

pub use decision::{
    format_decision_json, format_decision_list_json, format_decision_list_text,
    format_decision_text,
};
pub use ingest::{format_ingest_summary_json, format_ingest_summary_text, IngestSummary};
