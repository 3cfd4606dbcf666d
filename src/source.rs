//! Source Adapters
//!
//! Capability interfaces for the upstream fact providers consulted by the
//! resolution waterfall. Adapters report "unknown" as `Ok(None)` (or an empty
//! candidate list) and reserve `Err` for transport-level failures.

use crate::config::SourcesConfig;
use crate::error::AdapterError;
use crate::types::{MediaKey, MediaType, Provenance, ReleaseKind, SourceTime};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod mtime;
pub mod radarr;
pub mod sonarr;
pub mod tmdb;

pub use mtime::FsMtimeProbe;
pub use radarr::RadarrImportHistory;
pub use sonarr::SonarrImportHistory;
pub use tmdb::TmdbReleaseDates;

/// Result of an import-history lookup
#[derive(Debug, Clone, PartialEq)]
pub struct ImportFact {
    pub timestamp: Option<SourceTime>,
    pub provenance: Provenance,
    /// The value is the file's own creation time, not a genuine import event.
    pub file_time_fallback: bool,
    /// The provider's history indicates release dates should win over this value.
    pub prefer_release_dates: bool,
}

impl ImportFact {
    /// A genuine import event
    pub fn imported(timestamp: SourceTime, provenance: Provenance) -> Self {
        Self {
            timestamp: Some(timestamp),
            provenance,
            file_time_fallback: false,
            prefer_release_dates: false,
        }
    }

    /// Only the file's creation time is known
    pub fn file_time(timestamp: SourceTime, provenance: Provenance) -> Self {
        Self {
            timestamp: Some(timestamp),
            provenance,
            file_time_fallback: true,
            prefer_release_dates: false,
        }
    }

    pub fn preferring_release_dates(mut self) -> Self {
        self.prefer_release_dates = true;
        self
    }

    pub fn is_genuine(&self) -> bool {
        self.timestamp.is_some() && !self.file_time_fallback && !self.prefer_release_dates
    }
}

/// One dated release reported by a release-date provider
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseCandidate {
    pub date: SourceTime,
    pub kind: ReleaseKind,
    pub provenance: Provenance,
}

impl ReleaseCandidate {
    pub fn new(date: SourceTime, kind: ReleaseKind, provenance: Provenance) -> Self {
        Self {
            date,
            kind,
            provenance,
        }
    }
}

/// Import-history lookup (library manager download/import events)
#[async_trait]
pub trait ImportHistory: Send + Sync {
    fn name(&self) -> &'static str;

    async fn import_fact(&self, key: &MediaKey) -> Result<Option<ImportFact>, AdapterError>;
}

/// Release-date lookup (content metadata service)
#[async_trait]
pub trait ReleaseDates: Send + Sync {
    fn name(&self) -> &'static str;

    async fn release_dates(&self, key: &MediaKey) -> Result<Vec<ReleaseCandidate>, AdapterError>;
}

/// Newest modification time among an item's media files
#[async_trait]
pub trait FileMTime: Send + Sync {
    fn name(&self) -> &'static str;

    /// `paths` may be empty, in which case the probe locates the media itself.
    async fn newest_mtime(
        &self,
        key: &MediaKey,
        paths: &[PathBuf],
    ) -> Result<Option<SourceTime>, AdapterError>;
}

/// Sends movie keys to one import-history adapter and episode keys to another.
pub struct ImportHistoryByMedia {
    movies: Arc<dyn ImportHistory>,
    episodes: Arc<dyn ImportHistory>,
}

impl ImportHistoryByMedia {
    pub fn new(movies: Arc<dyn ImportHistory>, episodes: Arc<dyn ImportHistory>) -> Self {
        Self { movies, episodes }
    }
}

#[async_trait]
impl ImportHistory for ImportHistoryByMedia {
    fn name(&self) -> &'static str {
        "by-media"
    }

    async fn import_fact(&self, key: &MediaKey) -> Result<Option<ImportFact>, AdapterError> {
        match key.media_type() {
            MediaType::Movie => self.movies.import_fact(key).await,
            MediaType::Episode => self.episodes.import_fact(key).await,
        }
    }
}

/// The capability set handed to the resolution engine. Any member may be absent.
#[derive(Clone, Default)]
pub struct SourceSet {
    pub import_history: Option<Arc<dyn ImportHistory>>,
    pub release_dates: Option<Arc<dyn ReleaseDates>>,
    pub file_mtime: Option<Arc<dyn FileMTime>>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_import_history(mut self, adapter: Arc<dyn ImportHistory>) -> Self {
        self.import_history = Some(adapter);
        self
    }

    pub fn with_release_dates(mut self, adapter: Arc<dyn ReleaseDates>) -> Self {
        self.release_dates = Some(adapter);
        self
    }

    pub fn with_file_mtime(mut self, adapter: Arc<dyn FileMTime>) -> Self {
        self.file_mtime = Some(adapter);
        self
    }

    /// Build the adapters a deployment has configured.
    pub fn from_config(config: &SourcesConfig, timeout: Duration) -> Result<Self, AdapterError> {
        let mut set = SourceSet::new().with_file_mtime(Arc::new(FsMtimeProbe::new(
            config.library_roots.clone(),
            config.video_extensions.clone(),
        )));

        let movies: Option<Arc<dyn ImportHistory>> = match &config.radarr {
            Some(radarr) => {
                info!(url = %radarr.url, "Import history for movies: radarr");
                Some(Arc::new(RadarrImportHistory::new(
                    &radarr.url,
                    &radarr.api_key,
                    timeout,
                )?))
            }
            None => None,
        };
        let episodes: Option<Arc<dyn ImportHistory>> = match &config.sonarr {
            Some(sonarr) => {
                info!(url = %sonarr.url, "Import history for episodes: sonarr");
                Some(Arc::new(SonarrImportHistory::new(
                    &sonarr.url,
                    &sonarr.api_key,
                    timeout,
                )?))
            }
            None => None,
        };
        match (movies, episodes) {
            (Some(movies), Some(episodes)) => {
                set = set.with_import_history(Arc::new(ImportHistoryByMedia::new(movies, episodes)));
            }
            (Some(only), None) | (None, Some(only)) => set = set.with_import_history(only),
            (None, None) => {}
        }

        if let Some(tmdb) = &config.tmdb {
            info!(base_url = %tmdb.base_url, "Release dates: tmdb");
            set = set.with_release_dates(Arc::new(TmdbReleaseDates::new(
                &tmdb.base_url,
                &tmdb.api_key,
                tmdb.region.clone(),
                timeout,
            )?));
        }

        Ok(set)
    }
}

impl std::fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSet")
            .field("import_history", &self.import_history.as_ref().map(|a| a.name()))
            .field("release_dates", &self.release_dates.as_ref().map(|a| a.name()))
            .field("file_mtime", &self.file_mtime.as_ref().map(|a| a.name()))
            .finish()
    }
}

/// Map transport errors the way every HTTP-backed adapter reports them.
pub(crate) fn map_http_error(adapter: &'static str, error: reqwest::Error) -> AdapterError {
    if error.is_timeout() {
        return AdapterError::Unavailable(format!("{}: request timed out", adapter));
    }
    if error.is_decode() {
        return AdapterError::Malformed(format!("{}: {}", adapter, error));
    }
    match error.status() {
        Some(status) => AdapterError::Unavailable(format!("{}: HTTP {}", adapter, status.as_u16())),
        None => AdapterError::Unavailable(format!("{}: {}", adapter, error)),
    }
}
