//! Decision presentation: resolve, show and list text/json.

use crate::decision::DateDecision;
use comfy_table::presets::{UTF8_BORDERS_ONLY, UTF8_FULL};
use comfy_table::Table;
use serde_json::json;

fn opt_time(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

fn decision_value(decision: &DateDecision) -> serde_json::Value {
    json!({
        "key": decision.key.to_string(),
        "date_added": decision.date_added.map(|t| t.to_string()),
        "source": decision.source.as_str(),
        "release_date": decision.release_date.map(|t| t.to_string()),
        "tier": decision.tier.as_str(),
        "complete": decision.is_complete(),
        "decided_at": decision.decided_at.to_rfc3339(),
    })
}

pub fn format_decision_text(decision: &DateDecision) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Key".to_string(), decision.key.to_string()]);
    table.add_row(vec![
        "Date added".to_string(),
        opt_time(decision.date_added.map(|t| t.to_string())),
    ]);
    table.add_row(vec!["Source".to_string(), decision.source.to_string()]);
    table.add_row(vec![
        "Release date".to_string(),
        opt_time(decision.release_date.map(|t| t.to_string())),
    ]);
    table.add_row(vec!["Tier".to_string(), decision.tier.to_string()]);
    table.add_row(vec!["Decided at".to_string(), decision.decided_at.to_rfc3339()]);

    let mut out = format!("{}\n", table);
    if !decision.is_complete() {
        out.push_str("\nNo source produced a date; this item needs manual review.\n");
    }
    out
}

pub fn format_decision_json(decision: &DateDecision) -> String {
    serde_json::to_string_pretty(&decision_value(decision)).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_decision_list_text(decisions: &[DateDecision], unresolved_only: bool) -> String {
    if decisions.is_empty() {
        return if unresolved_only {
            "No unresolved decisions.".to_string()
        } else {
            "No cached decisions.".to_string()
        };
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Key", "Date added", "Source", "Tier"]);
    for decision in decisions {
        table.add_row(vec![
            decision.key.to_string(),
            opt_time(decision.date_added.map(|t| t.to_string())),
            decision.source.to_string(),
            decision.tier.to_string(),
        ]);
    }
    let unresolved = decisions.iter().filter(|d| !d.is_complete()).count();
    format!(
        "{}\n\nTotal: {} decision(s), {} unresolved",
        table,
        decisions.len(),
        unresolved
    )
}

pub fn format_decision_list_json(decisions: &[DateDecision]) -> String {
    let items: Vec<_> = decisions.iter().map(decision_value).collect();
    let out = json!({ "decisions": items, "total": decisions.len() });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}
