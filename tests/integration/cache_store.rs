//! Integration tests for the sled-backed resolution cache

use dateline::cache::{PutOutcome, ResolutionCache, SledResolutionCache};
use dateline::decision::{DateDecision, Tier};
use dateline::types::{MediaKey, Provenance, SourceTime};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn decision(key: MediaKey, raw: &str, source: &str) -> DateDecision {
    DateDecision::new(
        key,
        SourceTime::parse(raw).unwrap(),
        Provenance::new(source),
        None,
        Tier::ImportHistory,
    )
}

#[test]
fn test_date_only_precision_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("cache");
    let key = MediaKey::episode("tt0903747", 2, 5);
    let stored = DateDecision::new(
        key.clone(),
        SourceTime::parse("2009-04-12").unwrap(),
        Provenance::new("tmdb:episode.air_date"),
        SourceTime::parse("2009-04-12"),
        Tier::ReleaseDate,
    );

    {
        let cache = SledResolutionCache::new(&path).unwrap();
        cache.put(&stored).unwrap();
        cache.flush().unwrap();
    }

    let cache = SledResolutionCache::new(&path).unwrap();
    let loaded = cache.get(&key).unwrap().unwrap();
    assert_eq!(loaded, stored);
    assert!(loaded.date_added.unwrap().is_date_only());
}

#[test]
fn test_concurrent_writers_leave_one_complete_value() {
    let temp_dir = TempDir::new().unwrap();
    let cache = Arc::new(SledResolutionCache::new(temp_dir.path().join("cache")).unwrap());
    let key = MediaKey::movie("tt0111161");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            thread::spawn(move || {
                let incoming = if i % 2 == 0 {
                    decision(key, &format!("2020-01-0{}T00:00:00Z", i + 1), "radarr:history.import")
                } else {
                    DateDecision::unresolved(key, None)
                };
                // Losing a compare-and-swap race is an accepted outcome.
                let _ = cache.put(&incoming);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stored = cache.get(&key).unwrap().unwrap();
    assert!(stored.is_complete(), "unresolved writes never replace a complete value");
}

#[test]
fn test_unresolved_listing_and_remap() {
    let temp_dir = TempDir::new().unwrap();
    let cache = SledResolutionCache::new(temp_dir.path().join("cache")).unwrap();

    cache
        .put(&decision(MediaKey::movie("tt0000001"), "2020-01-01T00:00:00Z", "legacy:import"))
        .unwrap();
    cache
        .put(&decision(MediaKey::movie("tt0000002"), "2020-01-02T00:00:00Z", "legacy:import"))
        .unwrap();
    cache
        .put(&DateDecision::unresolved(MediaKey::movie("tt0000003"), None))
        .unwrap();

    let unresolved = cache.list_unresolved().unwrap();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].key, MediaKey::movie("tt0000003"));

    let remapped = cache
        .remap_source(&Provenance::new("legacy:import"), &Provenance::new("radarr:history.import"))
        .unwrap();
    assert_eq!(remapped, 2);
    assert!(cache
        .list()
        .unwrap()
        .iter()
        .filter(|d| d.is_complete())
        .all(|d| d.source.as_str() == "radarr:history.import"));

    let again = cache
        .put(&DateDecision::unresolved(MediaKey::movie("tt0000001"), None))
        .unwrap();
    assert_eq!(again, PutOutcome::RetainedComplete);
}
