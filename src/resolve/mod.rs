//! Tiered Date Resolution Engine
//!
//! Produces exactly one `DateDecision` per request by walking a priority
//! waterfall: cache, then import history and release dates (in profile
//! order), then file modification time, then unresolved. Adapter failures and
//! timeouts degrade to the next tier; the only error surfaced is a decision
//! that could not be persisted.

pub mod release;

pub use release::{select_release, ReleaseSelection};

use crate::cache::{PutOutcome, ResolutionCache};
use crate::concurrency::KeyLockManager;
use crate::config::{ResolverConfig, ResolverProfile};
use crate::decision::{DateDecision, Tier};
use crate::error::{AdapterError, CacheError, ResolveError};
use crate::notification::HintPayload;
use crate::source::{ImportFact, SourceSet};
use crate::types::{MediaKey, Provenance, SourceTime};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One resolution pass for one key
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveRequest {
    pub key: MediaKey,
    /// Re-run the waterfall even when a complete decision is cached.
    pub force: bool,
    /// Media files or folders for the file-mtime tier; empty means discover.
    pub media_paths: Vec<PathBuf>,
    /// Earliest notification time of a coalesced batch
    pub first_seen: Option<DateTime<Utc>>,
    /// Merged hints of a coalesced batch, in arrival order
    pub hints: Vec<HintPayload>,
}

impl ResolveRequest {
    pub fn new(key: MediaKey) -> Self {
        Self {
            key,
            force: false,
            media_paths: Vec::new(),
            first_seen: None,
            hints: Vec::new(),
        }
    }

    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_media_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.media_paths = paths;
        self
    }

    pub fn with_first_seen(mut self, first_seen: DateTime<Utc>) -> Self {
        self.first_seen = Some(first_seen);
        self
    }

    pub fn with_hints(mut self, hints: Vec<HintPayload>) -> Self {
        self.hints = hints;
        self
    }

    /// Explicit paths plus every path named by a hint, sorted and deduplicated
    /// so the result does not depend on hint arrival order.
    pub fn probe_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .media_paths
            .iter()
            .cloned()
            .chain(self.hints.iter().filter_map(|hint| hint.media_path.clone()))
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}

/// Anything the coalescer can hand a flushed batch to.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, request: ResolveRequest) -> Result<DateDecision, ResolveError>;
}

/// The waterfall, parameterized by its sources, cache and settings
pub struct ResolutionEngine {
    sources: SourceSet,
    cache: Arc<dyn ResolutionCache>,
    config: ResolverConfig,
    locks: KeyLockManager<MediaKey>,
}

impl ResolutionEngine {
    pub fn new(sources: SourceSet, cache: Arc<dyn ResolutionCache>, config: ResolverConfig) -> Self {
        Self {
            sources,
            cache,
            config,
            locks: KeyLockManager::new(),
        }
    }

    pub fn cache(&self) -> &Arc<dyn ResolutionCache> {
        &self.cache
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Synchronous pull used by scans that bypass coalescing.
    pub async fn resolve_key(&self, key: &MediaKey, force: bool) -> Result<DateDecision, ResolveError> {
        self.resolve_request(ResolveRequest::new(key.clone()).forced(force))
            .await
    }

    pub async fn resolve_request(&self, request: ResolveRequest) -> Result<DateDecision, ResolveError> {
        let key = request.key.clone();
        let _guard = self.locks.lock(&key).await;

        let previous = match self.cache.get(&key) {
            Ok(previous) => previous,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, resolving from sources");
                None
            }
        };

        if let Some(previous) = &previous {
            if previous.is_complete() && !request.force {
                debug!(key = %key, tier = %previous.tier, "Cache hit");
                return Ok(previous.clone());
            }
        }

        let (import, releases) = tokio::join!(self.fetch_import(&key), self.fetch_releases(&key));
        let selection = select_release(
            &releases,
            &self.config.release_priority,
            self.config.max_release_year_delta,
        );
        if let Some((rejected, delta)) = &selection.rejected {
            info!(
                key = %key,
                kind = %rejected.kind,
                date = %rejected.date,
                year_delta = delta,
                "Release date rejected by reasonableness check"
            );
        }

        let mut decision = decide_upstream(&key, &self.config, import.as_ref(), &selection);

        if decision.is_none() && self.config.file_mtime_enabled {
            decision = self
                .fetch_file_mtime(&key, &request.probe_paths())
                .await
                .map(|mtime| {
                    DateDecision::new(
                        key.clone(),
                        mtime,
                        Provenance::file_mtime(),
                        selection.reference_date(),
                        Tier::FileFallback,
                    )
                });
        }

        if decision.is_none() && self.config.notification_time_fallback {
            decision = request.first_seen.map(|first_seen| {
                DateDecision::new(
                    key.clone(),
                    SourceTime::from_utc(first_seen),
                    Provenance::notification_time(),
                    selection.reference_date(),
                    Tier::FileFallback,
                )
            });
        }

        let decision = match decision {
            Some(decision) => decision,
            None => match previous.filter(|previous| previous.is_complete()) {
                Some(previous) => {
                    // Forced pass found nothing; keep the value we already had.
                    info!(key = %key, source = %previous.source, "Sources exhausted, keeping cached decision");
                    return Ok(DateDecision::carried_over(&previous));
                }
                None => DateDecision::unresolved(key.clone(), selection.reference_date()),
            },
        };

        self.persist(&decision)?;
        info!(
            key = %key,
            tier = %decision.tier,
            source = %decision.source,
            date_added = ?decision.date_added.map(|d| d.to_string()),
            "Resolved date added"
        );
        Ok(decision)
    }

    fn persist(&self, decision: &DateDecision) -> Result<(), ResolveError> {
        match self.cache.put(decision) {
            Ok(PutOutcome::Written) => Ok(()),
            Ok(PutOutcome::RetainedComplete) => {
                debug!(key = %decision.key, "Kept existing complete decision");
                Ok(())
            }
            Err(CacheError::WriteConflict(key)) => {
                warn!(key = %key, "Concurrent cache write won, keeping its value");
                Ok(())
            }
            Err(e) => Err(ResolveError::Cache(e)),
        }
    }

    async fn fetch_import(&self, key: &MediaKey) -> Option<ImportFact> {
        let adapter = self.sources.import_history.as_ref()?;
        self.bounded(adapter.name(), key, adapter.import_fact(key))
            .await
            .flatten()
    }

    async fn fetch_releases(&self, key: &MediaKey) -> Vec<crate::source::ReleaseCandidate> {
        let Some(adapter) = self.sources.release_dates.as_ref() else {
            return Vec::new();
        };
        self.bounded(adapter.name(), key, adapter.release_dates(key))
            .await
            .unwrap_or_default()
    }

    async fn fetch_file_mtime(&self, key: &MediaKey, paths: &[PathBuf]) -> Option<SourceTime> {
        let adapter = self.sources.file_mtime.as_ref()?;
        self.bounded(adapter.name(), key, adapter.newest_mtime(key, paths))
            .await
            .flatten()
    }

    /// Run one adapter call under the configured timeout; failures read as unknown.
    async fn bounded<T, F>(&self, adapter: &'static str, key: &MediaKey, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, AdapterError>>,
    {
        let timeout = self.config.adapter_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(key = %key, adapter, error = %e, "Adapter failed, treating as unknown");
                None
            }
            Err(_) => {
                let e = AdapterError::Timeout {
                    adapter,
                    after_ms: timeout.as_millis() as u64,
                };
                warn!(key = %key, adapter, error = %e, "Adapter timed out, treating as unknown");
                None
            }
        }
    }
}

#[async_trait]
impl Resolver for ResolutionEngine {
    async fn resolve(&self, request: ResolveRequest) -> Result<DateDecision, ResolveError> {
        self.resolve_request(request).await
    }
}

fn import_decision(key: &MediaKey, fact: &ImportFact, release_date: Option<SourceTime>) -> Option<DateDecision> {
    let timestamp = fact.timestamp?;
    let tier = if fact.file_time_fallback {
        Tier::FileFallback
    } else {
        Tier::ImportHistory
    };
    Some(DateDecision::new(
        key.clone(),
        timestamp,
        fact.provenance.clone(),
        release_date,
        tier,
    ))
}

/// Combine import history and release selection per the configured profile.
///
/// Returns `None` when neither source produced a usable value.
pub fn decide_upstream(
    key: &MediaKey,
    config: &ResolverConfig,
    import: Option<&ImportFact>,
    selection: &ReleaseSelection,
) -> Option<DateDecision> {
    let release_date = selection.reference_date();
    let release = selection.chosen.as_ref().map(|chosen| {
        DateDecision::new(
            key.clone(),
            chosen.date,
            chosen.provenance.clone(),
            Some(chosen.date),
            Tier::ReleaseDate,
        )
    });
    let imported = import.and_then(|fact| import_decision(key, fact, release_date));

    match config.profile {
        ResolverProfile::ImportFirst => {
            if import.map_or(false, ImportFact::is_genuine) {
                return imported;
            }
            match (release, imported) {
                (Some(release), Some(imported)) => {
                    let keep_file_time = import.map_or(false, |fact| {
                        fact.file_time_fallback
                            && !fact.prefer_release_dates
                            && !config.prefer_release_over_file_date
                    });
                    Some(if keep_file_time { imported } else { release })
                }
                (release, imported) => release.or(imported),
            }
        }
        ResolverProfile::ReleaseFirst => release.or(imported),
    }
}
