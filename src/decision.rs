//! Date decisions: the persisted outcome of one resolution.

use crate::types::{MediaKey, Provenance, SourceTime};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rung of the priority waterfall that produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Cached,
    ImportHistory,
    ReleaseDate,
    FileFallback,
    Unresolved,
}

impl Tier {
    /// Every tier except `Unresolved` is complete and authoritative.
    pub fn is_complete(self) -> bool {
        !matches!(self, Tier::Unresolved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Cached => "cached",
            Tier::ImportHistory => "import_history",
            Tier::ReleaseDate => "release_date",
            Tier::FileFallback => "file_fallback",
            Tier::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single authoritative "date added" for a media item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateDecision {
    pub key: MediaKey,
    /// `None` only for unresolved decisions
    pub date_added: Option<SourceTime>,
    pub source: Provenance,
    pub release_date: Option<SourceTime>,
    pub tier: Tier,
    pub decided_at: DateTime<Utc>,
}

impl DateDecision {
    pub fn new(
        key: MediaKey,
        date_added: SourceTime,
        source: Provenance,
        release_date: Option<SourceTime>,
        tier: Tier,
    ) -> Self {
        Self {
            key,
            date_added: Some(date_added),
            source,
            release_date,
            tier,
            decided_at: Utc::now(),
        }
    }

    /// Terminal-but-retryable outcome of an exhausted waterfall.
    pub fn unresolved(key: MediaKey, release_date: Option<SourceTime>) -> Self {
        Self {
            key,
            date_added: None,
            source: Provenance::unresolved(),
            release_date,
            tier: Tier::Unresolved,
            decided_at: Utc::now(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.tier.is_complete() && self.date_added.is_some()
    }

    /// Re-issue a prior complete decision when a forced pass found nothing better.
    pub fn carried_over(previous: &DateDecision) -> Self {
        Self {
            tier: Tier::Cached,
            decided_at: Utc::now(),
            ..previous.clone()
        }
    }
}
