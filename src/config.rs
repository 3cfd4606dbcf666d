//! Configuration System
//!
//! Layered configuration for the resolver, the coalescer, the cache and the
//! upstream sources. Files are merged through the `config` crate with
//! environment variable overrides and validated as a whole.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::types::ReleaseKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatelineConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub coalescer: CoalescerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Order in which the waterfall consults import history and release dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverProfile {
    #[default]
    ImportFirst,
    ReleaseFirst,
}

/// Resolution waterfall settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub profile: ResolverProfile,

    /// Most preferred release kind first
    #[serde(default = "default_release_priority")]
    pub release_priority: Vec<ReleaseKind>,

    /// Calendar years a non-theatrical release may precede the theatrical one
    #[serde(default = "default_max_release_year_delta")]
    pub max_release_year_delta: i32,

    /// A passing release date beats an import value that is only a file time
    #[serde(default = "default_true")]
    pub prefer_release_over_file_date: bool,

    #[serde(default = "default_true")]
    pub file_mtime_enabled: bool,

    /// Use the batch's first notification time when everything else is unknown
    #[serde(default)]
    pub notification_time_fallback: bool,

    #[serde(default = "default_adapter_timeout_ms")]
    pub adapter_timeout_ms: u64,
}

fn default_release_priority() -> Vec<ReleaseKind> {
    vec![
        ReleaseKind::Theatrical,
        ReleaseKind::Digital,
        ReleaseKind::Physical,
    ]
}

fn default_max_release_year_delta() -> i32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_adapter_timeout_ms() -> u64 {
    10_000
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            profile: ResolverProfile::default(),
            release_priority: default_release_priority(),
            max_release_year_delta: default_max_release_year_delta(),
            prefer_release_over_file_date: true,
            file_mtime_enabled: true,
            notification_time_fallback: false,
            adapter_timeout_ms: default_adapter_timeout_ms(),
        }
    }
}

impl ResolverConfig {
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.adapter_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.release_priority.is_empty() {
            return Err("release_priority cannot be empty".to_string());
        }
        let mut seen = HashSet::new();
        for kind in &self.release_priority {
            if !seen.insert(kind) {
                return Err(format!("release_priority lists '{}' twice", kind));
            }
        }
        if self.max_release_year_delta < 0 {
            return Err("max_release_year_delta cannot be negative".to_string());
        }
        if self.adapter_timeout_ms == 0 {
            return Err("adapter_timeout_ms must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Debounce and drain settings for the event coalescer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoalescerConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Hard cap after which a burst stops postponing its flush
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_debounce_ms() -> u64 {
    5_000
}

fn default_max_wait_ms() -> u64 {
    60_000
}

fn default_drain_timeout_ms() -> u64 {
    30_000
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_wait_ms: default_max_wait_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl CoalescerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.debounce_ms == 0 {
            return Err("debounce_ms must be greater than zero".to_string());
        }
        if self.max_wait_ms < self.debounce_ms {
            return Err(format!(
                "max_wait_ms ({}) cannot be shorter than debounce_ms ({})",
                self.max_wait_ms, self.debounce_ms
            ));
        }
        if self.drain_timeout_ms == 0 {
            return Err("drain_timeout_ms must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Decision cache location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Relative paths are resolved against the workspace root
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".dateline/cache")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

impl CacheConfig {
    pub fn resolve_path(&self, workspace_root: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            workspace_root.join(&self.path)
        }
    }
}

/// Upstream fact providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Directories searched for media folders by the file-mtime probe
    #[serde(default)]
    pub library_roots: Vec<PathBuf>,

    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,

    #[serde(default)]
    pub radarr: Option<RadarrConfig>,

    #[serde(default)]
    pub sonarr: Option<SonarrConfig>,

    #[serde(default)]
    pub tmdb: Option<TmdbConfig>,
}

fn default_video_extensions() -> Vec<String> {
    ["mkv", "mp4", "avi", "mov", "m4v"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            library_roots: Vec::new(),
            video_extensions: default_video_extensions(),
            radarr: None,
            sonarr: None,
            tmdb: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarrConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SonarrConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbConfig {
    pub api_key: String,

    #[serde(default = "default_tmdb_base_url")]
    pub base_url: String,

    /// ISO 3166-1 country to restrict release dates to
    #[serde(default)]
    pub region: Option<String>,
}

fn default_tmdb_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn validate_url(url: &str) -> Result<(), String> {
    if url.trim().is_empty() {
        return Err("url cannot be empty".to_string());
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(format!("url '{}' must start with http:// or https://", url));
    }
    Ok(())
}

impl RadarrConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_url(&self.url)?;
        if self.api_key.trim().is_empty() {
            return Err("api_key cannot be empty".to_string());
        }
        Ok(())
    }
}

impl SonarrConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_url(&self.url)?;
        if self.api_key.trim().is_empty() {
            return Err("api_key cannot be empty".to_string());
        }
        Ok(())
    }
}

impl TmdbConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_url(&self.base_url)?;
        if self.api_key.trim().is_empty() {
            return Err("api_key cannot be empty".to_string());
        }
        if let Some(region) = &self.region {
            if region.len() != 2 {
                return Err(format!("region '{}' must be a two-letter country code", region));
            }
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Resolver(String),
    Coalescer(String),
    Source(String, String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Resolver(msg) => write!(f, "Resolver: {}", msg),
            ValidationError::Coalescer(msg) => write!(f, "Coalescer: {}", msg),
            ValidationError::Source(name, msg) => write!(f, "Source '{}': {}", name, msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl DatelineConfig {
    /// Validate the entire configuration, reporting every problem found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.resolver.validate() {
            errors.push(ValidationError::Resolver(e));
        }
        if let Err(e) = self.coalescer.validate() {
            errors.push(ValidationError::Coalescer(e));
        }
        if let Some(radarr) = &self.sources.radarr {
            if let Err(e) = radarr.validate() {
                errors.push(ValidationError::Source("radarr".to_string(), e));
            }
        }
        if let Some(sonarr) = &self.sources.sonarr {
            if let Err(e) = sonarr.validate() {
                errors.push(ValidationError::Source("sonarr".to_string(), e));
            }
        }
        if let Some(tmdb) = &self.sources.tmdb {
            if let Err(e) = tmdb.validate() {
                errors.push(ValidationError::Source("tmdb".to_string(), e));
            }
        }
        if self.resolver.file_mtime_enabled && self.sources.video_extensions.is_empty() {
            errors.push(ValidationError::Source(
                "file".to_string(),
                "video_extensions cannot be empty while file_mtime_enabled".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Load, then validate, folding validation failures into one error.
    pub fn load_validated(workspace_root: &Path) -> Result<Self, ApiError> {
        let config = ConfigLoader::load(workspace_root)?;
        config.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(config)
    }
}
