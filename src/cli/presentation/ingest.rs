//! Ingest presentation: end-of-stream summary.

use crate::coalesce::{CoalescerStats, ShutdownReport};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde::Serialize;
use serde_json::json;

/// What one `ingest` run did
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub lines: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub batches: u64,
    pub resolved: u64,
    pub unresolved: usize,
    pub failed: u64,
    pub abandoned: usize,
}

impl IngestSummary {
    pub fn from_run(
        lines: usize,
        accepted: usize,
        rejected: usize,
        unresolved: usize,
        stats: &CoalescerStats,
        shutdown: &ShutdownReport,
    ) -> Self {
        Self {
            lines,
            accepted,
            rejected,
            batches: stats.batches,
            resolved: stats.resolved,
            unresolved,
            failed: stats.failed + stats.panicked,
            abandoned: shutdown.abandoned,
        }
    }
}

pub fn format_ingest_summary_text(summary: &IngestSummary) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Count"]);
    table.add_row(vec!["Lines read".to_string(), summary.lines.to_string()]);
    table.add_row(vec!["Accepted".to_string(), summary.accepted.to_string()]);
    table.add_row(vec!["Rejected".to_string(), summary.rejected.to_string()]);
    table.add_row(vec!["Batches".to_string(), summary.batches.to_string()]);
    table.add_row(vec!["Resolved".to_string(), summary.resolved.to_string()]);
    table.add_row(vec!["Unresolved".to_string(), summary.unresolved.to_string()]);
    table.add_row(vec!["Failed".to_string(), summary.failed.to_string()]);
    table.add_row(vec!["Abandoned".to_string(), summary.abandoned.to_string()]);
    format!("Ingest complete\n\n{}", table)
}

pub fn format_ingest_summary_json(summary: &IngestSummary) -> String {
    serde_json::to_string_pretty(&json!(summary)).unwrap_or_else(|_| "{}".to_string())
}
