//! Release candidate selection and the reasonableness check.

use crate::source::ReleaseCandidate;
use crate::types::{ReleaseKind, SourceTime};
use std::collections::HashMap;

/// Outcome of choosing among a provider's release candidates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseSelection {
    /// Passing candidate of the most preferred kind that has one
    pub chosen: Option<ReleaseCandidate>,
    /// Earliest theatrical release, the reference for the reasonableness check
    pub theatrical: Option<ReleaseCandidate>,
    /// Candidate dropped by the reasonableness check, with its year delta
    pub rejected: Option<(ReleaseCandidate, i32)>,
}

impl ReleaseSelection {
    /// Release date recorded on the decision, whichever tier wins.
    pub fn reference_date(&self) -> Option<SourceTime> {
        self.chosen
            .as_ref()
            .or(self.theatrical.as_ref())
            .map(|candidate| candidate.date)
    }
}

fn earliest_per_kind(candidates: &[ReleaseCandidate]) -> HashMap<ReleaseKind, &ReleaseCandidate> {
    let mut earliest: HashMap<ReleaseKind, &ReleaseCandidate> = HashMap::new();
    for candidate in candidates {
        earliest
            .entry(candidate.kind)
            .and_modify(|current| {
                if candidate.date.normalized() < current.date.normalized() {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }
    earliest
}

/// Pick the release date to use.
///
/// The first kind in `priority` with any candidate is considered, using that
/// kind's earliest date. A non-theatrical pick that precedes the theatrical
/// date by more than `max_year_delta` calendar years is rejected and nothing
/// is chosen, so resolution moves on to the next tier.
pub fn select_release(
    candidates: &[ReleaseCandidate],
    priority: &[ReleaseKind],
    max_year_delta: i32,
) -> ReleaseSelection {
    let earliest = earliest_per_kind(candidates);
    let theatrical = earliest.get(&ReleaseKind::Theatrical).map(|c| (*c).clone());

    let preferred = priority
        .iter()
        .find_map(|kind| earliest.get(kind))
        .map(|c| (*c).clone());

    let Some(preferred) = preferred else {
        return ReleaseSelection {
            chosen: None,
            theatrical,
            rejected: None,
        };
    };

    if let Some(reference) = &theatrical {
        if preferred.kind != ReleaseKind::Theatrical {
            let delta = reference.date.year() - preferred.date.year();
            if delta > max_year_delta {
                return ReleaseSelection {
                    chosen: None,
                    theatrical,
                    rejected: Some((preferred, delta)),
                };
            }
        }
    }

    ReleaseSelection {
        chosen: Some(preferred),
        theatrical,
        rejected: None,
    }
}
