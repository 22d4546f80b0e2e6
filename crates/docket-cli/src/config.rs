//! Configuration and path resolution for the CLI.
//!
//! Settings are layered: the TOML file (`--config`, else `docket.toml` in
//! the working directory), then `DOCKET_*` environment variables, then the
//! flags on the command line. Validation runs once, after every layer.

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use docket_core::config::EmbeddingProvider;
use docket_core::EngineConfig;
use std::path::{Path, PathBuf};

/// Environment variable for a custom index directory
pub const INDEX_DIR_ENV: &str = "DOCKET_INDEX_DIR";

/// Flags that override file and environment settings.
#[derive(Debug, Clone, Default)]
pub struct FlagOverrides {
    pub cb_threshold: Option<f32>,
    pub provider: Option<EmbeddingProvider>,
}

/// Loads, overrides and validates the engine configuration.
///
/// # Errors
///
/// Returns an error naming the offending file or field.
pub fn load_engine_config(path: Option<&Path>, flags: &FlagOverrides) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => {
            let local = Path::new("docket.toml");
            if local.exists() {
                EngineConfig::from_file(local)?
            } else {
                EngineConfig::default()
            }
        }
    };
    config
        .apply_overrides(|key| std::env::var(key).ok())
        .context("Invalid DOCKET_* environment override")?;

    if let Some(threshold) = flags.cb_threshold {
        config.fusion.cb_threshold = threshold;
    }
    if let Some(provider) = flags.provider {
        config.embedding.provider = provider;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Returns the index directory.
///
/// Search order:
/// 1. `--index-dir`
/// 2. `$DOCKET_INDEX_DIR`
/// 3. the platform data directory, e.g. `~/.local/share/docket/index` on Linux
pub fn index_dir(custom: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = custom {
        return Ok(dir.clone());
    }
    if let Ok(dir) = std::env::var(INDEX_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    ProjectDirs::from("org", "docket", "docket")
        .map(|dirs| dirs.data_dir().join("index"))
        .ok_or_else(|| anyhow!("Could not determine data directory; pass --index-dir"))
}
