//! Filesystem modification-time probe

use crate::error::AdapterError;
use crate::source::FileMTime;
use crate::types::{MediaKey, MediaType, SourceTime};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;
use walkdir::WalkDir;

/// Walks media folders and reports the newest video-file mtime.
#[derive(Debug, Clone)]
pub struct FsMtimeProbe {
    library_roots: Vec<PathBuf>,
    video_extensions: Vec<String>,
    max_depth: usize,
}

impl FsMtimeProbe {
    pub fn new(library_roots: Vec<PathBuf>, video_extensions: Vec<String>) -> Self {
        Self {
            library_roots,
            video_extensions: video_extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_depth: 3,
        }
    }

    fn is_video(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.video_extensions.iter().any(|known| *known == ext)
            })
            .unwrap_or(false)
    }

    /// Find folders under the library roots whose name carries the external id.
    fn discover(&self, key: &MediaKey) -> Vec<PathBuf> {
        let needle = key.external_id();
        let mut found = Vec::new();
        for root in &self.library_roots {
            let walker = WalkDir::new(root).min_depth(1).max_depth(2).follow_links(false);
            for entry in walker.into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
                if contains_token(&name, needle) {
                    found.push(entry.into_path());
                }
            }
        }
        found.sort();
        found
    }

    fn episode_tag(key: &MediaKey) -> Option<String> {
        match (key.media_type(), key.season(), key.episode_number()) {
            (MediaType::Episode, Some(season), Some(episode)) => {
                Some(format!("s{:02}e{:02}", season, episode))
            }
            _ => None,
        }
    }

    fn newest_in(&self, key: &MediaKey, paths: &[PathBuf]) -> Option<SystemTime> {
        let episode_tag = Self::episode_tag(key);
        let mut newest: Option<SystemTime> = None;

        for path in paths {
            let walker = WalkDir::new(path).max_depth(self.max_depth).follow_links(false);
            for entry in walker.into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_file() || !self.is_video(entry.path()) {
                    continue;
                }
                if let Some(tag) = &episode_tag {
                    let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
                    if !name.contains(tag.as_str()) {
                        continue;
                    }
                }
                let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
                    Some(modified) => modified,
                    None => continue,
                };
                if newest.map_or(true, |current| modified > current) {
                    newest = Some(modified);
                }
            }
        }

        newest
    }
}

/// True when `needle` occurs in `haystack` with no alphanumeric neighbour on
/// either side, so `tt123` does not match inside `tt1234`.
fn contains_token(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let bytes = haystack.as_bytes();
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
        let after = end == bytes.len() || !bytes[end].is_ascii_alphanumeric();
        before && after
    })
}

#[async_trait]
impl FileMTime for FsMtimeProbe {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn newest_mtime(
        &self,
        key: &MediaKey,
        paths: &[PathBuf],
    ) -> Result<Option<SourceTime>, AdapterError> {
        let probe = self.clone();
        let key = key.clone();
        let paths = paths.to_vec();

        let newest = tokio::task::spawn_blocking(move || {
            let paths = if paths.is_empty() {
                probe.discover(&key)
            } else {
                paths
            };
            debug!(key = %key, candidates = paths.len(), "Probing media file mtimes");
            probe.newest_in(&key, &paths)
        })
        .await
        .map_err(|e| AdapterError::Unavailable(format!("file probe task failed: {}", e)))?;

        Ok(newest.map(|modified| SourceTime::from_utc(DateTime::<Utc>::from(modified))))
    }
}
