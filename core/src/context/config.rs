//! Engine configuration loading
//!
//! The config is looked up in a list of well-known paths, first hit wins.
//! When none exists the defaults are written to the first path so the user
//! has a complete file to edit.

use std::path::{Path, PathBuf};

use ember_types::EngineConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration paths given")]
    NoPaths,

    #[error("failed to load config {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: confy::ConfyError,
    },

    #[error("failed to write config {path:?}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: confy::ConfyError,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A validated config and where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: EngineConfig,
    pub path: PathBuf,
    /// Defaults were written because no file existed
    pub generated: bool,
}

pub fn load_config(paths: &[PathBuf]) -> Result<LoadedConfig, ConfigError> {
    let first = paths.first().ok_or(ConfigError::NoPaths)?;

    if let Some(path) = paths.iter().find(|p| p.is_file()) {
        let config: EngineConfig = confy::load_path(path).map_err(|source| ConfigError::Load {
            path: path.clone(),
            source,
        })?;
        validate(&config)?;
        tracing::info!(path = %path.display(), "Loaded config");
        return Ok(LoadedConfig {
            config,
            path: path.clone(),
            generated: false,
        });
    }

    let config = EngineConfig::default();
    store_config(first, &config)?;
    tracing::info!(path = %first.display(), "No config found, wrote defaults");
    Ok(LoadedConfig {
        config,
        path: first.clone(),
        generated: true,
    })
}

pub fn store_config(path: &Path, config: &EngineConfig) -> Result<(), ConfigError> {
    confy::store_path(path, config).map_err(|source| ConfigError::Store {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse and validate a config from TOML text.
pub fn parse_config(text: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml::from_str(text)?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.monitor.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("monitor.poll_interval_ms must be > 0".into()));
    }
    if config.retry.max_attempts == 0 {
        return Err(ConfigError::Invalid("retry.max_attempts must be > 0".into()));
    }
    if config.monitor.dedup_capacity == 0 {
        return Err(ConfigError::Invalid("monitor.dedup_capacity must be > 0".into()));
    }
    for reward in &config.rewards {
        if reward.interval_secs == 0 {
            return Err(ConfigError::Invalid(format!(
                "reward '{}' needs a non-zero interval_secs",
                reward.name
            )));
        }
    }
    Ok(())
}
