//! Integration tests for CLI commands run through `RunContext`

use crate::integration::test_utils::with_isolated_home;
use dateline::cli::{Commands, RunContext};
use dateline::error::ApiError;
use filetime::FileTime;
use std::path::Path;
use tempfile::TempDir;

/// Workspace with one movie folder whose file mtime is 2020-09-13T12:26:40Z.
fn setup_workspace(temp_dir: &TempDir) -> std::path::PathBuf {
    let workspace = temp_dir.path().join("workspace");
    let movie_dir = temp_dir
        .path()
        .join("media/movies/The Shawshank Redemption (tt0111161)");
    std::fs::create_dir_all(&movie_dir).unwrap();
    let movie_file = movie_dir.join("movie.mkv");
    std::fs::write(&movie_file, b"not really a video").unwrap();
    filetime::set_file_mtime(&movie_file, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let config_dir = workspace.join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        format!(
            "[sources]\nlibrary_roots = [\"{}\"]\n",
            temp_dir.path().join("media/movies").display()
        ),
    )
    .unwrap();
    workspace
}

fn run(workspace: &Path, temp_dir: &TempDir, commands: &[Commands]) -> Vec<Result<String, ApiError>> {
    with_isolated_home(temp_dir, || {
        let context = RunContext::new(workspace.to_path_buf(), None).unwrap();
        commands.iter().map(|c| context.execute(c)).collect()
    })
}

#[test]
fn test_resolve_show_and_list() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = setup_workspace(&temp_dir);

    let results = run(
        &workspace,
        &temp_dir,
        &[
            Commands::Resolve {
                key: "movie:tt0111161".to_string(),
                force: false,
                paths: Vec::new(),
                format: "json".to_string(),
            },
            Commands::Resolve {
                key: "movie:tt0068646".to_string(),
                force: false,
                paths: Vec::new(),
                format: "text".to_string(),
            },
            Commands::Show {
                key: "movie:tt0111161".to_string(),
                format: "text".to_string(),
            },
            Commands::List {
                unresolved: true,
                format: "json".to_string(),
            },
        ],
    );

    let resolved: serde_json::Value =
        serde_json::from_str(results[0].as_ref().unwrap()).unwrap();
    assert_eq!(resolved["tier"], "file_fallback");
    assert_eq!(resolved["source"], "file:mtime");
    assert!(resolved["date_added"]
        .as_str()
        .unwrap()
        .starts_with("2020-09-13T12:26:40"));

    assert!(results[1].as_ref().unwrap().contains("manual review"));
    assert!(results[2].as_ref().unwrap().contains("file_fallback"));

    let unresolved: serde_json::Value =
        serde_json::from_str(results[3].as_ref().unwrap()).unwrap();
    assert_eq!(unresolved["total"], 1);
    assert_eq!(unresolved["decisions"][0]["key"], "movie:tt0068646");
}

#[test]
fn test_cache_persists_across_contexts_and_remaps() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = setup_workspace(&temp_dir);

    run(
        &workspace,
        &temp_dir,
        &[Commands::Resolve {
            key: "movie:tt0111161".to_string(),
            force: false,
            paths: Vec::new(),
            format: "text".to_string(),
        }],
    );

    let results = run(
        &workspace,
        &temp_dir,
        &[
            Commands::RemapSource {
                from: "file:mtime".to_string(),
                to: "legacy:file".to_string(),
            },
            Commands::Show {
                key: "movie:tt0111161".to_string(),
                format: "json".to_string(),
            },
        ],
    );
    assert_eq!(
        results[0].as_ref().unwrap(),
        "Remapped 1 decision(s) from file:mtime to legacy:file"
    );
    let shown: serde_json::Value = serde_json::from_str(results[1].as_ref().unwrap()).unwrap();
    assert_eq!(shown["source"], "legacy:file");
}

#[test]
fn test_invalid_input_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = setup_workspace(&temp_dir);

    let results = run(
        &workspace,
        &temp_dir,
        &[
            Commands::Resolve {
                key: "series:tt0111161".to_string(),
                force: false,
                paths: Vec::new(),
                format: "text".to_string(),
            },
            Commands::Resolve {
                key: "movie:tt0111161".to_string(),
                force: false,
                paths: vec![temp_dir.path().join("missing.mkv")],
                format: "text".to_string(),
            },
            Commands::List {
                unresolved: false,
                format: "yaml".to_string(),
            },
        ],
    );
    assert!(matches!(results[0], Err(ApiError::InvalidKey(_))));
    assert!(matches!(results[1], Err(ApiError::PathNotFound(_))));
    assert!(matches!(results[2], Err(ApiError::InvalidArgument(_))));
}

#[test]
fn test_ingest_coalesces_and_summarizes() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = setup_workspace(&temp_dir);

    let input = [
        r#"{"key":"movie:tt0111161","event":"Download"}"#,
        "",
        r#"{"key":"movie:tt0111161","event":"Rename"}"#,
        r#"{"key":"movie:tt0068646","event":"Download"}"#,
        r#"{"key":"movie:","event":"Download"}"#,
    ]
    .join("\n");

    let summary = with_isolated_home(&temp_dir, || {
        let context = RunContext::new(workspace.clone(), None).unwrap();
        context.ingest(input.as_bytes(), Some(1_000)).unwrap()
    });

    assert_eq!(summary.lines, 4);
    assert_eq!(summary.accepted, 3);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.resolved, 2);
    assert_eq!(summary.unresolved, 1);
    assert_eq!(summary.abandoned, 0);
}

#[test]
fn test_validate_describes_sources() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = setup_workspace(&temp_dir);

    let results = run(&workspace, &temp_dir, &[Commands::Validate]);
    let out = results[0].as_ref().unwrap();
    assert!(out.starts_with("Configuration is valid"));
    assert!(out.contains("Movie import history: none"));
    assert!(out.contains("Episode import history: none"));
    assert!(out.contains("Library roots: 1"));
}
