//! Loader facade: assembles the layered sources into a `DatelineConfig`.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::DatelineConfig;
use config::{ConfigError, Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence, lowest to highest: built-in defaults, the global file,
    /// `config/config.toml`, `config/{DATELINE_ENV}.toml`, then
    /// `DATELINE__SECTION__KEY` environment variables.
    pub fn load(workspace_root: &Path) -> Result<DatelineConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = builder.add_source(
            Environment::with_prefix("DATELINE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?.try_deserialize::<DatelineConfig>()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load a single explicit file over the built-in defaults.
    pub fn load_from_file(path: &Path) -> Result<DatelineConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        merge_policy::builder_with_defaults()?
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<DatelineConfig>()
    }

    /// Built-in defaults only
    pub fn default() -> DatelineConfig {
        DatelineConfig::default()
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
