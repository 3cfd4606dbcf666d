//! TMDB release-date adapter

use crate::error::AdapterError;
use crate::source::{map_http_error, ReleaseCandidate, ReleaseDates};
use crate::types::{MediaKey, MediaType, Provenance, ReleaseKind, SourceTime};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<FoundItem>,
    #[serde(default)]
    tv_results: Vec<FoundItem>,
}

#[derive(Debug, Deserialize)]
struct FoundItem {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ReleaseDatesResponse {
    #[serde(default)]
    results: Vec<CountryReleases>,
}

#[derive(Debug, Deserialize)]
struct CountryReleases {
    iso_3166_1: String,
    #[serde(default)]
    release_dates: Vec<ReleaseEntry>,
}

#[derive(Debug, Deserialize)]
struct ReleaseEntry {
    release_date: String,
    #[serde(rename = "type")]
    release_type: u8,
}

#[derive(Debug, Deserialize)]
struct EpisodeResponse {
    #[serde(default)]
    air_date: Option<String>,
}

/// TMDB release types: 1 premiere, 2 limited, 3 theatrical, 4 digital, 5 physical, 6 tv.
fn release_kind(release_type: u8) -> Option<ReleaseKind> {
    match release_type {
        1..=3 => Some(ReleaseKind::Theatrical),
        4 => Some(ReleaseKind::Digital),
        5 => Some(ReleaseKind::Physical),
        _ => None,
    }
}

fn movie_candidates(response: ReleaseDatesResponse, region: Option<&str>) -> Vec<ReleaseCandidate> {
    response
        .results
        .into_iter()
        .filter(|country| region.map_or(true, |r| country.iso_3166_1.eq_ignore_ascii_case(r)))
        .flat_map(|country| country.release_dates)
        .filter_map(|entry| {
            let kind = release_kind(entry.release_type)?;
            let date = SourceTime::parse(&entry.release_date)?;
            Some(ReleaseCandidate::new(date, kind, Provenance::release(kind, "tmdb")))
        })
        .collect()
}

fn episode_candidates(response: EpisodeResponse) -> Vec<ReleaseCandidate> {
    response
        .air_date
        .as_deref()
        .and_then(SourceTime::parse)
        .map(|date| {
            vec![ReleaseCandidate::new(
                date,
                ReleaseKind::Digital,
                Provenance::new("tmdb:episode.air_date"),
            )]
        })
        .unwrap_or_default()
}

/// Release dates from The Movie Database, looked up by IMDb id
pub struct TmdbReleaseDates {
    client: Client,
    base_url: String,
    api_key: String,
    region: Option<String>,
}

impl TmdbReleaseDates {
    pub fn new(
        base_url: &str,
        api_key: &str,
        region: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Unavailable(format!("tmdb client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            region,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AdapterError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|e| map_http_error("tmdb", e))?
            .error_for_status()
            .map_err(|e| map_http_error("tmdb", e))?;
        response.json::<T>().await.map_err(|e| map_http_error("tmdb", e))
    }

    async fn find(&self, external_id: &str) -> Result<FindResponse, AdapterError> {
        self.get_json(
            &format!("/find/{}", external_id),
            &[("external_source", "imdb_id")],
        )
        .await
    }
}

#[async_trait]
impl ReleaseDates for TmdbReleaseDates {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    async fn release_dates(&self, key: &MediaKey) -> Result<Vec<ReleaseCandidate>, AdapterError> {
        let found = self.find(key.external_id()).await?;

        match key.media_type() {
            MediaType::Movie => {
                let Some(movie) = found.movie_results.first() else {
                    debug!(key = %key, "No tmdb movie for external id");
                    return Ok(Vec::new());
                };
                let response: ReleaseDatesResponse = self
                    .get_json(&format!("/movie/{}/release_dates", movie.id), &[])
                    .await?;
                let candidates = movie_candidates(response, self.region.as_deref());
                debug!(key = %key, candidates = candidates.len(), "Fetched tmdb release dates");
                Ok(candidates)
            }
            MediaType::Episode => {
                let (Some(show), Some(season), Some(episode)) =
                    (found.tv_results.first(), key.season(), key.episode_number())
                else {
                    debug!(key = %key, "No tmdb series for external id");
                    return Ok(Vec::new());
                };
                let response: EpisodeResponse = self
                    .get_json(
                        &format!("/tv/{}/season/{}/episode/{}", show.id, season, episode),
                        &[],
                    )
                    .await?;
                Ok(episode_candidates(response))
            }
        }
    }
}
