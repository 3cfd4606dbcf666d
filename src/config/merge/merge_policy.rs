//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Struct-level serde defaults cover every other key; these are the values an
/// operator most often overrides per environment.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("resolver.profile", "import_first")?
        .set_default("coalescer.debounce_ms", 5_000i64)?
        .set_default("coalescer.max_wait_ms", 60_000i64)?
        .set_default("coalescer.drain_timeout_ms", 30_000i64)?
        .set_default("cache.path", ".dateline/cache")
}
