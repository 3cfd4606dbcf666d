//! Core identity and timestamp types shared by the coalescer and the resolver.

use crate::error::ApiError;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of resolvable media unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Episode,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Episode => "episode",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one resolvable unit: a movie, or one episode of a series.
///
/// Immutable once constructed. External ids are trimmed and lower-cased so
/// that `tt0111161` and ` TT0111161` coalesce into the same batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MediaKey {
    media_type: MediaType,
    external_id: String,
    season: Option<u32>,
    episode: Option<u32>,
}

impl MediaKey {
    pub fn movie(external_id: impl AsRef<str>) -> Self {
        Self {
            media_type: MediaType::Movie,
            external_id: normalize_id(external_id.as_ref()),
            season: None,
            episode: None,
        }
    }

    pub fn episode(external_id: impl AsRef<str>, season: u32, episode: u32) -> Self {
        Self {
            media_type: MediaType::Episode,
            external_id: normalize_id(external_id.as_ref()),
            season: Some(season),
            episode: Some(episode),
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn season(&self) -> Option<u32> {
        self.season
    }

    pub fn episode_number(&self) -> Option<u32> {
        self.episode
    }

    /// Structural check used at the intake boundary.
    pub fn validate(&self) -> Result<(), String> {
        if self.external_id.is_empty() {
            return Err("external id cannot be empty".to_string());
        }
        if self.external_id.contains(':') || self.external_id.contains(char::is_whitespace) {
            return Err(format!("external id '{}' contains a separator", self.external_id));
        }
        match self.media_type {
            MediaType::Movie if self.season.is_some() || self.episode.is_some() => {
                Err("movie keys cannot carry season/episode numbers".to_string())
            }
            MediaType::Episode if self.season.is_none() || self.episode.is_none() => {
                Err("episode keys require season and episode numbers".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Byte key used by persistent caches.
    pub fn storage_key(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

fn normalize_id(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.season, self.episode) {
            (Some(season), Some(episode)) => write!(
                f,
                "{}:{}:{}:{}",
                self.media_type, self.external_id, season, episode
            ),
            _ => write!(f, "{}:{}", self.media_type, self.external_id),
        }
    }
}

impl FromStr for MediaKey {
    type Err = ApiError;

    /// Parses `movie:<id>` or `episode:<id>:<season>:<episode>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let key = match parts.as_slice() {
            ["movie", id] => MediaKey::movie(id),
            ["episode", id, season, episode] => {
                let season = season
                    .parse::<u32>()
                    .map_err(|_| ApiError::InvalidKey(format!("bad season in '{}'", s)))?;
                let episode = episode
                    .parse::<u32>()
                    .map_err(|_| ApiError::InvalidKey(format!("bad episode in '{}'", s)))?;
                MediaKey::episode(id, season, episode)
            }
            _ => {
                return Err(ApiError::InvalidKey(format!(
                    "'{}' (expected movie:<id> or episode:<id>:<season>:<episode>)",
                    s
                )))
            }
        };
        key.validate().map_err(ApiError::InvalidKey)?;
        Ok(key)
    }
}

/// Release kinds reported by a release-date provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseKind {
    Theatrical,
    Digital,
    Physical,
}

impl ReleaseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseKind::Theatrical => "theatrical",
            ReleaseKind::Digital => "digital",
            ReleaseKind::Physical => "physical",
        }
    }
}

impl fmt::Display for ReleaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReleaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "theatrical" => Ok(ReleaseKind::Theatrical),
            "digital" => Ok(ReleaseKind::Digital),
            "physical" => Ok(ReleaseKind::Physical),
            other => Err(format!("unknown release kind '{}'", other)),
        }
    }
}

/// A timestamp exactly as precise as its source reported it.
///
/// Comparisons always go through [`SourceTime::normalized`]; date-only values
/// compare as midnight UTC while the stored value keeps its original form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceTime {
    Instant(DateTime<FixedOffset>),
    Date(NaiveDate),
}

impl SourceTime {
    pub fn from_utc(instant: DateTime<Utc>) -> Self {
        SourceTime::Instant(instant.fixed_offset())
    }

    /// Absolute instant used for every comparison.
    pub fn normalized(&self) -> DateTime<Utc> {
        match self {
            SourceTime::Instant(instant) => instant.with_timezone(&Utc),
            SourceTime::Date(date) => Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)),
        }
    }

    /// Calendar year of the normalized instant
    pub fn year(&self) -> i32 {
        use chrono::Datelike;
        self.normalized().year()
    }

    pub fn is_date_only(&self) -> bool {
        matches!(self, SourceTime::Date(_))
    }

    /// Parse the shapes upstream providers emit: `YYYY-MM-DD`, RFC 3339, or a
    /// naive `YYYY-MM-DDTHH:MM:SS[.fff]` which is taken as UTC.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Some(SourceTime::Date(date));
        }
        if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
            return Some(SourceTime::Instant(instant));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| SourceTime::from_utc(Utc.from_utc_datetime(&naive)))
    }
}

impl fmt::Display for SourceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTime::Instant(instant) => write!(f, "{}", instant.to_rfc3339()),
            SourceTime::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

/// Label recording which tier/adapter produced a value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Provenance(String);

impl Provenance {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_mtime() -> Self {
        Self::new("file:mtime")
    }

    pub fn notification_time() -> Self {
        Self::new("notification:received_at")
    }

    pub fn release(kind: ReleaseKind, adapter: &str) -> Self {
        Self(format!("{}:release.{}", adapter, kind))
    }

    /// Sentinel recorded when every tier came back empty.
    pub fn unresolved() -> Self {
        Self::new("manual_review_required")
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
