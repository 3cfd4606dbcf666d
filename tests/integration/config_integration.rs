//! Integration tests for the configuration system

use crate::integration::test_utils::with_isolated_home;
use dateline::config::{ConfigLoader, DatelineConfig, ResolverProfile};
use dateline::source::SourceSet;
use dateline::types::ReleaseKind;
use tempfile::TempDir;

fn write_workspace_config(workspace: &std::path::Path, name: &str, body: &str) {
    let config_dir = workspace.join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join(name), body).unwrap();
}

#[test]
fn test_workspace_config_builds_configured_sources() {
    let temp_dir = TempDir::new().unwrap();
    write_workspace_config(
        temp_dir.path(),
        "config.toml",
        r#"
[resolver]
profile = "release_first"
release_priority = ["digital", "theatrical"]
adapter_timeout_ms = 2500

[sources]
library_roots = ["/srv/media/movies"]

[sources.radarr]
url = "http://localhost:7878"
api_key = "radarr-key"

[sources.tmdb]
api_key = "tmdb-key"
region = "US"
"#,
    );

    let config = with_isolated_home(&temp_dir, || ConfigLoader::load(temp_dir.path())).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.resolver.profile, ResolverProfile::ReleaseFirst);
    assert_eq!(
        config.resolver.release_priority,
        vec![ReleaseKind::Digital, ReleaseKind::Theatrical]
    );
    assert_eq!(config.resolver.adapter_timeout().as_millis(), 2500);
    assert_eq!(
        config.sources.tmdb.as_ref().unwrap().base_url,
        "https://api.themoviedb.org/3"
    );

    let sources = SourceSet::from_config(&config.sources, config.resolver.adapter_timeout()).unwrap();
    assert_eq!(sources.import_history.as_ref().unwrap().name(), "radarr");
    assert_eq!(sources.release_dates.as_ref().unwrap().name(), "tmdb");
    assert!(sources.file_mtime.is_some());
}

#[test]
fn test_sonarr_section_routes_episode_history() {
    let temp_dir = TempDir::new().unwrap();
    write_workspace_config(
        temp_dir.path(),
        "config.toml",
        r#"
[sources.sonarr]
url = "http://localhost:8989"
api_key = "sonarr-key"
"#,
    );

    let config = with_isolated_home(&temp_dir, || ConfigLoader::load(temp_dir.path())).unwrap();
    assert!(config.validate().is_ok());
    let sources = SourceSet::from_config(&config.sources, config.resolver.adapter_timeout()).unwrap();
    assert_eq!(sources.import_history.as_ref().unwrap().name(), "sonarr");

    write_workspace_config(
        temp_dir.path(),
        "config.toml",
        r#"
[sources.radarr]
url = "http://localhost:7878"
api_key = "radarr-key"

[sources.sonarr]
url = "http://localhost:8989"
api_key = "sonarr-key"
"#,
    );
    let config = with_isolated_home(&temp_dir, || ConfigLoader::load(temp_dir.path())).unwrap();
    let sources = SourceSet::from_config(&config.sources, config.resolver.adapter_timeout()).unwrap();
    assert_eq!(sources.import_history.as_ref().unwrap().name(), "by-media");
}

#[test]
fn test_environment_file_overrides_base_file() {
    let temp_dir = TempDir::new().unwrap();
    write_workspace_config(
        temp_dir.path(),
        "config.toml",
        r#"
[coalescer]
debounce_ms = 2000
max_wait_ms = 30000
"#,
    );
    write_workspace_config(
        temp_dir.path(),
        "development.toml",
        r#"
[coalescer]
debounce_ms = 250
"#,
    );

    let config = with_isolated_home(&temp_dir, || ConfigLoader::load(temp_dir.path())).unwrap();
    assert_eq!(config.coalescer.debounce_ms, 250);
    assert_eq!(config.coalescer.max_wait_ms, 30_000);
}

#[test]
fn test_invalid_sources_fail_validation() {
    let temp_dir = TempDir::new().unwrap();
    write_workspace_config(
        temp_dir.path(),
        "config.toml",
        r#"
[sources.radarr]
url = "localhost:7878"
api_key = ""

[sources.sonarr]
url = "http://localhost:8989"
api_key = " "

[sources.tmdb]
api_key = "tmdb-key"
region = "USA"
"#,
    );

    let result = with_isolated_home(&temp_dir, || DatelineConfig::load_validated(temp_dir.path()));
    let message = result.unwrap_err().to_string();
    assert!(message.contains("radarr"), "{}", message);
    assert!(message.contains("sonarr"), "{}", message);
    assert!(message.contains("tmdb"), "{}", message);
}

#[test]
fn test_explicit_file_missing_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");
    assert!(ConfigLoader::load_from_file(&missing).is_err());
}
