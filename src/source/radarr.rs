//! Radarr v3 import-history adapter

use crate::error::AdapterError;
use crate::source::{map_http_error, ImportFact, ImportHistory};
use crate::types::{MediaKey, MediaType, Provenance, SourceTime};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const IMPORT_EVENT: &str = "downloadFolderImported";
const RENAME_EVENT: &str = "movieFileRenamed";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadarrMovie {
    id: i64,
    #[serde(default)]
    movie_file: Option<RadarrMovieFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadarrMovieFile {
    #[serde(default)]
    date_added: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
    event_type: String,
    date: String,
}

/// Reads import events from a Radarr instance. Episodes are not Radarr's
/// concern and always come back unknown.
pub struct RadarrImportHistory {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RadarrImportHistory {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Unavailable(format!("radarr client: {}", e)))?;
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
            .map_err(|e| map_http_error("radarr", e))?
            .error_for_status()
            .map_err(|e| map_http_error("radarr", e))?;
        response.json::<T>().await.map_err(|e| map_http_error("radarr", e))
    }
}

/// Decide what a movie's history says about its import date.
fn fact_from_history(movie: &RadarrMovie, history: &[HistoryRecord]) -> Option<ImportFact> {
    let earliest = |event: &str| {
        history
            .iter()
            .filter(|record| record.event_type == event)
            .filter_map(|record| SourceTime::parse(&record.date))
            .min_by_key(|time| time.normalized())
    };

    let imported = earliest(IMPORT_EVENT);
    let renamed = earliest(RENAME_EVENT);

    // A rename that predates every import means the file was adopted from disk,
    // so the import timestamp reflects the adoption rather than acquisition.
    let rename_first = match (renamed, imported) {
        (Some(renamed), Some(imported)) => renamed.normalized() < imported.normalized(),
        (Some(_), None) => true,
        _ => false,
    };

    if let Some(imported) = imported {
        let fact = ImportFact::imported(imported, Provenance::new("radarr:history.import"));
        return Some(if rename_first {
            fact.preferring_release_dates()
        } else {
            fact
        });
    }

    let file_added = movie
        .movie_file
        .as_ref()
        .and_then(|file| file.date_added.as_deref())
        .and_then(SourceTime::parse)?;
    let fact = ImportFact::file_time(file_added, Provenance::new("radarr:file.dateAdded"));
    Some(if rename_first {
        fact.preferring_release_dates()
    } else {
        fact
    })
}

#[async_trait]
impl ImportHistory for RadarrImportHistory {
    fn name(&self) -> &'static str {
        "radarr"
    }

    async fn import_fact(&self, key: &MediaKey) -> Result<Option<ImportFact>, AdapterError> {
        if key.media_type() != MediaType::Movie {
            return Ok(None);
        }

        let movies: Vec<RadarrMovie> = self
            .get_json("/api/v3/movie", &[("imdbId", key.external_id().to_string())])
            .await?;
        let movie = match movies.into_iter().next() {
            Some(movie) => movie,
            None => {
                debug!(key = %key, "Movie not known to radarr");
                return Ok(None);
            }
        };

        // No eventType filter: rename events decide prefer_release_dates.
        let history: Vec<HistoryRecord> = self
            .get_json("/api/v3/history/movie", &[("movieId", movie.id.to_string())])
            .await?;
        debug!(key = %key, records = history.len(), "Fetched radarr history");

        Ok(fact_from_history(&movie, &history))
    }
}
