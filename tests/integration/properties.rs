//! Property-based tests for resolution invariants

use crate::integration::test_utils::{date, engine, FakeMtime};
use dateline::cache::{may_replace, MemoryResolutionCache};
use dateline::config::ResolverConfig;
use dateline::decision::{DateDecision, Tier};
use dateline::notification::{HintEvent, HintPayload};
use dateline::resolve::{select_release, ResolveRequest};
use dateline::source::ReleaseCandidate;
use dateline::types::{MediaKey, Provenance, ReleaseKind, SourceTime};
use proptest::prelude::*;
use std::sync::Arc;

fn hints_for(indices: &[u8]) -> Vec<HintPayload> {
    indices
        .iter()
        .map(|i| HintPayload::new(HintEvent::Download).with_path(format!("/media/file-{}.mkv", i)))
        .collect()
}

/// Merged hint order must not change what gets resolved
#[test]
fn test_hint_order_does_not_change_decision() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let strategy = prop::collection::vec(0u8..16, 1..12)
        .prop_flat_map(|hints| (Just(hints.clone()), Just(hints).prop_shuffle()));

    runner
        .run(&strategy, |(original, shuffled)| {
            let key = MediaKey::movie("tt0111161");
            let first = ResolveRequest::new(key.clone()).with_hints(hints_for(&original));
            let second = ResolveRequest::new(key.clone()).with_hints(hints_for(&shuffled));
            prop_assert_eq!(first.probe_paths(), second.probe_paths());

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let decide = |request: ResolveRequest| {
                let mtime = Arc::new(FakeMtime::new(Some(date("2022-02-02T02:02:02Z"))));
                let engine = engine(
                    None,
                    None,
                    Some(mtime.clone()),
                    Arc::new(MemoryResolutionCache::new()),
                    ResolverConfig::default(),
                );
                let decision = rt.block_on(engine.resolve_request(request)).unwrap();
                let seen = mtime.seen_paths.lock().clone();
                (decision.date_added, decision.source, decision.tier, seen)
            };
            prop_assert_eq!(decide(first), decide(second));
            Ok(())
        })
        .unwrap();
}

/// A non-theatrical pick never precedes the theatrical date by more than the threshold
#[test]
fn test_reasonableness_bound_holds() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(1950i32..2030, 1950i32..2030, 0i32..20),
            |(theatrical_year, digital_year, max_delta)| {
                let candidates = vec![
                    ReleaseCandidate::new(
                        SourceTime::parse(&format!("{}-06-15", theatrical_year)).unwrap(),
                        ReleaseKind::Theatrical,
                        Provenance::release(ReleaseKind::Theatrical, "tmdb"),
                    ),
                    ReleaseCandidate::new(
                        SourceTime::parse(&format!("{}-06-15", digital_year)).unwrap(),
                        ReleaseKind::Digital,
                        Provenance::release(ReleaseKind::Digital, "tmdb"),
                    ),
                ];
                let selection = select_release(
                    &candidates,
                    &[ReleaseKind::Digital, ReleaseKind::Theatrical],
                    max_delta,
                );
                let delta = theatrical_year - digital_year;
                if delta > max_delta {
                    prop_assert!(selection.chosen.is_none());
                    prop_assert!(selection.rejected.is_some());
                } else {
                    let chosen = selection.chosen.unwrap();
                    prop_assert_eq!(chosen.kind, ReleaseKind::Digital);
                }
                Ok(())
            },
        )
        .unwrap();
}

/// Complete decisions are never replaced by unresolved ones
#[test]
fn test_no_regress_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(any::<bool>(), any::<bool>()), |(existing_complete, incoming_complete)| {
            let key = MediaKey::movie("tt0111161");
            let make = |complete: bool| {
                if complete {
                    DateDecision::new(
                        key.clone(),
                        date("2020-01-01"),
                        Provenance::file_mtime(),
                        None,
                        Tier::FileFallback,
                    )
                } else {
                    DateDecision::unresolved(key.clone(), None)
                }
            };
            let existing = make(existing_complete);
            let incoming = make(incoming_complete);
            let allowed = may_replace(Some(&existing), &incoming);
            prop_assert_eq!(allowed, incoming_complete || !existing_complete);
            Ok(())
        })
        .unwrap();
}
