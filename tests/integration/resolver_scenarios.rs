//! Integration tests for the resolution waterfall
//!
//! Tests cover:
//! - Cache short-circuit
//! - Import history versus release dates
//! - Reasonableness rejection
//! - No regression of complete decisions
//! - Adapter failures and timeouts
//! - Notification-time fallback and retry of unresolved items

use crate::integration::test_utils::{
    candidate, date, digital_first, engine, FakeImport, FakeMtime, FakeReleases, Mode,
};
use dateline::cache::{MemoryResolutionCache, PutOutcome, ResolutionCache};
use dateline::config::{ResolverConfig, ResolverProfile};
use dateline::decision::{DateDecision, Tier};
use dateline::resolve::ResolveRequest;
use dateline::source::ImportFact;
use dateline::types::{MediaKey, Provenance, ReleaseKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn key() -> MediaKey {
    MediaKey::movie("tt0111161")
}

fn no_mtime() -> ResolverConfig {
    ResolverConfig {
        file_mtime_enabled: false,
        ..ResolverConfig::default()
    }
}

#[tokio::test]
async fn test_complete_decision_short_circuits_adapters() {
    let import = Arc::new(FakeImport::new(Some(ImportFact::imported(
        date("2021-06-01T10:00:00Z"),
        Provenance::new("radarr:history.import"),
    ))));
    let releases = Arc::new(FakeReleases::new(vec![candidate("1994-09-23", ReleaseKind::Theatrical)]));
    let mtime = Arc::new(FakeMtime::new(Some(date("2022-01-01T00:00:00Z"))));
    let cache = Arc::new(MemoryResolutionCache::new());
    let engine = engine(
        Some(import.clone()),
        Some(releases.clone()),
        Some(mtime.clone()),
        cache.clone(),
        ResolverConfig::default(),
    );

    let first = engine.resolve_key(&key(), false).await.unwrap();
    assert_eq!(first.tier, Tier::ImportHistory);
    assert_eq!((import.calls(), releases.calls(), mtime.calls()), (1, 1, 0));

    let second = engine.resolve_key(&key(), false).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(
        (import.calls(), releases.calls(), mtime.calls()),
        (1, 1, 0),
        "cached complete decision must not touch any adapter"
    );

    engine.resolve_key(&key(), true).await.unwrap();
    assert_eq!(import.calls(), 2, "force re-runs the waterfall");
}

#[tokio::test]
async fn test_genuine_import_beats_passing_release() {
    let import = Arc::new(FakeImport::new(Some(ImportFact::imported(
        date("2021-06-01T10:00:00Z"),
        Provenance::new("radarr:history.import"),
    ))));
    let releases = Arc::new(FakeReleases::new(vec![
        candidate("1994-09-23", ReleaseKind::Theatrical),
        candidate("1995-01-10", ReleaseKind::Digital),
    ]));
    let engine = engine(
        Some(import),
        Some(releases),
        None,
        Arc::new(MemoryResolutionCache::new()),
        ResolverConfig::default(),
    );

    let decision = engine.resolve_key(&key(), false).await.unwrap();
    assert_eq!(decision.tier, Tier::ImportHistory);
    assert_eq!(decision.date_added, Some(date("2021-06-01T10:00:00Z")));
    assert_eq!(decision.source.as_str(), "radarr:history.import");
    assert_eq!(decision.release_date, Some(date("1994-09-23")));
}

#[tokio::test]
async fn test_release_first_profile_prefers_release() {
    let import = Arc::new(FakeImport::new(Some(ImportFact::imported(
        date("2021-06-01T10:00:00Z"),
        Provenance::new("radarr:history.import"),
    ))));
    let releases = Arc::new(FakeReleases::new(vec![candidate("1994-09-23", ReleaseKind::Theatrical)]));
    let config = ResolverConfig {
        profile: ResolverProfile::ReleaseFirst,
        ..ResolverConfig::default()
    };
    let engine = engine(
        Some(import),
        Some(releases),
        None,
        Arc::new(MemoryResolutionCache::new()),
        config,
    );

    let decision = engine.resolve_key(&key(), false).await.unwrap();
    assert_eq!(decision.tier, Tier::ReleaseDate);
    assert_eq!(decision.date_added, Some(date("1994-09-23")));
}

#[tokio::test]
async fn test_release_fifteen_years_early_falls_through_to_file_mtime() {
    let releases = Arc::new(FakeReleases::new(vec![
        candidate("2010-07-16", ReleaseKind::Theatrical),
        candidate("1995-03-01", ReleaseKind::Digital),
    ]));
    let mtime = Arc::new(FakeMtime::new(Some(date("2022-02-02T02:02:02Z"))));
    let engine = engine(
        None,
        Some(releases),
        Some(mtime.clone()),
        Arc::new(MemoryResolutionCache::new()),
        digital_first(),
    );

    let decision = engine.resolve_key(&key(), false).await.unwrap();
    assert_eq!(decision.tier, Tier::FileFallback);
    assert_eq!(decision.source, Provenance::file_mtime());
    assert_eq!(decision.date_added, Some(date("2022-02-02T02:02:02Z")));
    assert_eq!(decision.release_date, Some(date("2010-07-16")));
    assert_eq!(mtime.calls(), 1);
}

#[tokio::test]
async fn test_release_fifteen_years_early_without_mtime_is_unresolved() {
    let releases = Arc::new(FakeReleases::new(vec![
        candidate("2010-07-16", ReleaseKind::Theatrical),
        candidate("1995-03-01", ReleaseKind::Digital),
    ]));
    let config = ResolverConfig {
        file_mtime_enabled: false,
        ..digital_first()
    };
    let cache = Arc::new(MemoryResolutionCache::new());
    let engine = engine(None, Some(releases), None, cache.clone(), config);

    let decision = engine.resolve_key(&key(), false).await.unwrap();
    assert_eq!(decision.tier, Tier::Unresolved);
    assert!(!decision.is_complete());
    assert_eq!(decision.source, Provenance::unresolved());
    assert_eq!(cache.list_unresolved().unwrap().len(), 1, "unresolved is recorded");
}

#[tokio::test]
async fn test_unresolved_never_overwrites_complete_decision() {
    let cache = Arc::new(MemoryResolutionCache::new());
    let complete = DateDecision::new(
        key(),
        date("2020-01-01T00:00:00Z"),
        Provenance::new("radarr:history.import"),
        None,
        Tier::ImportHistory,
    );
    cache.put(&complete).unwrap();

    let unresolved = DateDecision::unresolved(key(), None);
    assert_eq!(cache.put(&unresolved).unwrap(), PutOutcome::RetainedComplete);

    let engine = engine(None, None, None, cache.clone(), no_mtime());
    let decision = engine.resolve_key(&key(), true).await.unwrap();
    assert_eq!(decision.tier, Tier::Cached, "forced pass keeps the prior value");
    assert_eq!(decision.date_added, complete.date_added);
    assert_eq!(decision.source, complete.source);

    let stored = cache.get(&key()).unwrap().unwrap();
    assert_eq!(stored, complete);
}

#[tokio::test]
async fn test_digital_release_without_theatrical_resolves() {
    let import = Arc::new(FakeImport::new(None));
    let releases = Arc::new(FakeReleases::new(vec![candidate("2023-05-01", ReleaseKind::Digital)]));
    let engine = engine(
        Some(import),
        Some(releases),
        None,
        Arc::new(MemoryResolutionCache::new()),
        no_mtime(),
    );

    let decision = engine.resolve_key(&key(), false).await.unwrap();
    assert_eq!(decision.date_added, Some(date("2023-05-01")));
    assert_eq!(decision.tier, Tier::ReleaseDate);
    assert_eq!(decision.source, Provenance::release(ReleaseKind::Digital, "fake"));
}

#[tokio::test]
async fn test_passing_release_beats_file_time_import() {
    let import = Arc::new(FakeImport::new(Some(ImportFact::file_time(
        date("2023-05-10"),
        Provenance::new("radarr:file.dateAdded"),
    ))));
    let releases = Arc::new(FakeReleases::new(vec![
        candidate("1994-09-23", ReleaseKind::Theatrical),
        candidate("1994-09-20", ReleaseKind::Digital),
    ]));
    let engine = engine(
        Some(import),
        Some(releases),
        None,
        Arc::new(MemoryResolutionCache::new()),
        digital_first(),
    );

    let decision = engine.resolve_key(&key(), false).await.unwrap();
    assert_eq!(decision.date_added, Some(date("1994-09-20")));
    assert_eq!(decision.tier, Tier::ReleaseDate);
}

#[tokio::test]
async fn test_file_time_import_used_when_release_rejected() {
    let import = Arc::new(FakeImport::new(Some(ImportFact::file_time(
        date("2023-05-10"),
        Provenance::new("radarr:file.dateAdded"),
    ))));
    let releases = Arc::new(FakeReleases::new(vec![
        candidate("2010-07-16", ReleaseKind::Theatrical),
        candidate("1990-01-01", ReleaseKind::Digital),
    ]));
    let engine = engine(
        Some(import),
        Some(releases),
        None,
        Arc::new(MemoryResolutionCache::new()),
        ResolverConfig {
            file_mtime_enabled: false,
            ..digital_first()
        },
    );

    let decision = engine.resolve_key(&key(), false).await.unwrap();
    assert_eq!(decision.date_added, Some(date("2023-05-10")));
    assert_eq!(decision.tier, Tier::FileFallback);
    assert_eq!(decision.source.as_str(), "radarr:file.dateAdded");
}

#[tokio::test]
async fn test_failing_adapters_degrade_to_next_tier() {
    let import = Arc::new(FakeImport::new(None).with_mode(Mode::Fail));
    let releases = Arc::new(FakeReleases::new(Vec::new()).with_mode(Mode::Fail));
    let mtime = Arc::new(FakeMtime::new(Some(date("2022-02-02T02:02:02Z"))));
    let engine = engine(
        Some(import),
        Some(releases),
        Some(mtime),
        Arc::new(MemoryResolutionCache::new()),
        ResolverConfig::default(),
    );

    let decision = engine.resolve_key(&key(), false).await.unwrap();
    assert_eq!(decision.tier, Tier::FileFallback);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_adapter_times_out() {
    let import = Arc::new(FakeImport::new(None).with_mode(Mode::Hang));
    let releases = Arc::new(FakeReleases::new(vec![candidate("1994-09-23", ReleaseKind::Theatrical)]));
    let config = ResolverConfig {
        adapter_timeout_ms: 250,
        ..ResolverConfig::default()
    };
    let engine = engine(
        Some(import.clone()),
        Some(releases),
        None,
        Arc::new(MemoryResolutionCache::new()),
        config,
    );

    let started = tokio::time::Instant::now();
    let decision = engine.resolve_key(&key(), false).await.unwrap();
    assert_eq!(decision.tier, Tier::ReleaseDate);
    assert_eq!(import.calls(), 1);
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_notification_time_fallback_when_enabled() {
    let config = ResolverConfig {
        file_mtime_enabled: false,
        notification_time_fallback: true,
        ..ResolverConfig::default()
    };
    let engine = engine(None, None, None, Arc::new(MemoryResolutionCache::new()), config);
    let first_seen = date("2024-03-03T03:03:03Z").normalized();

    let decision = engine
        .resolve_request(ResolveRequest::new(key()).with_first_seen(first_seen))
        .await
        .unwrap();
    assert_eq!(decision.tier, Tier::FileFallback);
    assert_eq!(decision.source, Provenance::notification_time());
    assert_eq!(decision.date_added.map(|d| d.normalized()), Some(first_seen));
}

#[tokio::test]
async fn test_media_paths_reach_file_probe() {
    let mtime = Arc::new(FakeMtime::new(Some(date("2022-02-02T02:02:02Z"))));
    let engine = engine(
        None,
        None,
        Some(mtime.clone()),
        Arc::new(MemoryResolutionCache::new()),
        ResolverConfig::default(),
    );

    let request = ResolveRequest::new(key())
        .with_media_paths(vec![PathBuf::from("/media/b"), PathBuf::from("/media/a")]);
    engine.resolve_request(request).await.unwrap();
    assert_eq!(
        *mtime.seen_paths.lock(),
        vec![PathBuf::from("/media/a"), PathBuf::from("/media/b")]
    );
}

#[tokio::test]
async fn test_unresolved_is_retried_on_next_resolve() {
    let releases = Arc::new(FakeReleases::new(Vec::new()));
    let cache = Arc::new(MemoryResolutionCache::new());
    let engine = engine(None, Some(releases.clone()), None, cache.clone(), no_mtime());

    let first = engine.resolve_key(&key(), false).await.unwrap();
    assert_eq!(first.tier, Tier::Unresolved);

    releases.set(vec![candidate("1994-09-23", ReleaseKind::Theatrical)]);
    let second = engine.resolve_key(&key(), false).await.unwrap();
    assert_eq!(second.tier, Tier::ReleaseDate);
    assert_eq!(releases.calls(), 2);
    assert!(cache.list_unresolved().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_resolves_of_one_key_query_once() {
    let import = Arc::new(
        FakeImport::new(Some(ImportFact::imported(
            date("2021-06-01T10:00:00Z"),
            Provenance::new("radarr:history.import"),
        )))
        .with_delay(Duration::from_millis(200)),
    );
    let engine = Arc::new(engine(
        Some(import.clone()),
        None,
        None,
        Arc::new(MemoryResolutionCache::new()),
        ResolverConfig::default(),
    ));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.resolve_key(&key(), false).await })
        })
        .collect();
    for handle in handles {
        let decision = handle.await.unwrap().unwrap();
        assert_eq!(decision.tier, Tier::ImportHistory);
    }
    assert_eq!(import.calls(), 1, "later callers hit the cache written by the first");
}
