//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::algorithms::AlgorithmSettings;
use crate::infrastructure::remote::RemoteSettings;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_iterations: {0}. Must be at least 1")]
    InvalidMaxIterations(usize),

    #[error("Invalid batch count: {0}. Must be at least 1")]
    InvalidBatchCount(usize),

    #[error("Invalid remote retry count: {0}. Cannot be 0")]
    InvalidMaxRetries(usize),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Top-level optimizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Iteration budget for the closed loop.
    pub max_iterations: usize,
    /// Number of parallel experimental lanes.
    pub batch_count: usize,
    /// Use the remote optimization service instead of a local algorithm.
    pub use_remote: bool,
    pub algorithm: AlgorithmSettings,
    pub remote: RemoteSettings,
    /// Known-regions file seeding the novelty history, if any.
    pub known_regions: Option<PathBuf>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            batch_count: 1,
            use_remote: false,
            algorithm: AlgorithmSettings::default(),
            remote: RemoteSettings::default(),
            known_regions: None,
        }
    }
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. chemopt.yaml (project config)
    /// 3. Environment variables (CHEMOPT_* prefix, highest priority)
    pub fn load() -> Result<OptimizerConfig> {
        let config: OptimizerConfig = Figment::new()
            .merge(Serialized::defaults(OptimizerConfig::default()))
            .merge(Yaml::file("chemopt.yaml"))
            .merge(Env::prefixed("CHEMOPT_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<OptimizerConfig> {
        let config: OptimizerConfig = Figment::new()
            .merge(Serialized::defaults(OptimizerConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &OptimizerConfig) -> Result<()> {
        if config.max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations(config.max_iterations).into());
        }
        if config.batch_count == 0 {
            return Err(ConfigError::InvalidBatchCount(config.batch_count).into());
        }
        if config.use_remote && config.remote.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(config.remote.max_retries).into());
        }
        // Algorithm names are validated at selection time, but an early
        // check here turns a typo into a setup error rather than a
        // first-iteration one.
        config
            .algorithm
            .name
            .parse::<crate::algorithms::AlgorithmKind>()
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;
        Ok(())
    }
}
