//! Sonarr v3 import-history adapter

use crate::error::AdapterError;
use crate::source::{map_http_error, ImportFact, ImportHistory};
use crate::types::{MediaKey, MediaType, Provenance, SourceTime};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const IMPORT_EVENT: &str = "downloadFolderImported";
const RENAME_EVENT: &str = "episodeFileRenamed";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrSeries {
    id: i64,
    #[serde(default)]
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrEpisode {
    id: i64,
    season_number: u32,
    episode_number: u32,
    #[serde(default)]
    episode_file_id: i64,
    #[serde(default)]
    episode_file: Option<SonarrEpisodeFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrEpisodeFile {
    #[serde(default)]
    date_added: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
    #[serde(default)]
    episode_id: i64,
    event_type: String,
    date: String,
}

/// Reads episode import events from a Sonarr instance. Movies always come
/// back unknown.
pub struct SonarrImportHistory {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SonarrImportHistory {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Unavailable(format!("sonarr client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AdapterError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("X-Api-Key", &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| map_http_error("sonarr", e))?
            .error_for_status()
            .map_err(|e| map_http_error("sonarr", e))?;
        response.json::<T>().await.map_err(|e| map_http_error("sonarr", e))
    }

    /// The episode file's `dateAdded`, fetched separately when the episode
    /// listing does not embed the file.
    async fn file_added(&self, episode: &SonarrEpisode) -> Result<Option<SourceTime>, AdapterError> {
        if let Some(file) = &episode.episode_file {
            return Ok(file.date_added.as_deref().and_then(SourceTime::parse));
        }
        if episode.episode_file_id <= 0 {
            return Ok(None);
        }
        let file: SonarrEpisodeFile = self
            .get_json(&format!("/api/v3/episodefile/{}", episode.episode_file_id), &[])
            .await?;
        Ok(file.date_added.as_deref().and_then(SourceTime::parse))
    }
}

fn find_series<'a>(series: &'a [SonarrSeries], external_id: &str) -> Option<&'a SonarrSeries> {
    series.iter().find(|s| {
        s.imdb_id
            .as_deref()
            .map_or(false, |id| id.eq_ignore_ascii_case(external_id))
    })
}

/// Decide what an episode's history says about its import date.
fn fact_from_history(
    episode_id: i64,
    file_added: Option<SourceTime>,
    history: &[HistoryRecord],
) -> Option<ImportFact> {
    let earliest = |event: &str| {
        history
            .iter()
            .filter(|record| record.episode_id == episode_id && record.event_type == event)
            .filter_map(|record| SourceTime::parse(&record.date))
            .min_by_key(|time| time.normalized())
    };

    let imported = earliest(IMPORT_EVENT);
    let renamed = earliest(RENAME_EVENT);

    let rename_first = match (renamed, imported) {
        (Some(renamed), Some(imported)) => renamed.normalized() < imported.normalized(),
        (Some(_), None) => true,
        _ => false,
    };

    let fact = match imported {
        Some(imported) => ImportFact::imported(imported, Provenance::new("sonarr:history.import")),
        None => ImportFact::file_time(file_added?, Provenance::new("sonarr:file.dateAdded")),
    };
    Some(if rename_first {
        fact.preferring_release_dates()
    } else {
        fact
    })
}

#[async_trait]
impl ImportHistory for SonarrImportHistory {
    fn name(&self) -> &'static str {
        "sonarr"
    }

    async fn import_fact(&self, key: &MediaKey) -> Result<Option<ImportFact>, AdapterError> {
        let (season, number) = match (key.media_type(), key.season(), key.episode_number()) {
            (MediaType::Episode, Some(season), Some(number)) => (season, number),
            _ => return Ok(None),
        };

        let all_series: Vec<SonarrSeries> = self.get_json("/api/v3/series", &[]).await?;
        let series_id = match find_series(&all_series, key.external_id()) {
            Some(series) => series.id,
            None => {
                debug!(key = %key, "Series not known to sonarr");
                return Ok(None);
            }
        };

        let episodes: Vec<SonarrEpisode> = self
            .get_json(
                "/api/v3/episode",
                &[
                    ("seriesId", series_id.to_string()),
                    ("includeEpisodeFile", "true".to_string()),
                ],
            )
            .await?;
        let episode = match episodes
            .into_iter()
            .find(|e| e.season_number == season && e.episode_number == number)
        {
            Some(episode) => episode,
            None => {
                debug!(key = %key, "Episode not known to sonarr");
                return Ok(None);
            }
        };

        let history: Vec<HistoryRecord> = self
            .get_json(
                "/api/v3/history/series",
                &[
                    ("seriesId", series_id.to_string()),
                    ("seasonNumber", season.to_string()),
                ],
            )
            .await?;
        debug!(key = %key, records = history.len(), "Fetched sonarr history");

        let file_added = self.file_added(&episode).await?;
        Ok(fact_from_history(episode.id, file_added, &history))
    }
}
