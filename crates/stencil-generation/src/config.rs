//! Engine configuration
//!
//! Loaded from an optional file (format picked by extension) with
//! `STENCIL_*` environment overrides on top; nested keys use `__`, e.g.
//! `STENCIL_ANALYTICS__FLUSH_INTERVAL_MS=1000`.

use std::{path::PathBuf, time::Duration};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{
    error::{CompositionError, Result},
    scoring_system::ScoringWeights,
    templates::DEFAULT_MAX_DEPTH,
};

/// Default environment prefix
pub const ENV_PREFIX: &str = "STENCIL";

/// Analytics persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// JSON file for persisted records; in-memory only when absent
    pub persist_path: Option<PathBuf>,
    pub flush_interval_ms: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            persist_path: None,
            flush_interval_ms: 30_000,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_inheritance_depth: usize,
    /// Bound on every file read/write and store lock wait
    pub io_timeout_ms: u64,
    pub composition_cache_capacity: usize,
    pub max_supplements: usize,
    pub scoring: ScoringWeights,
    pub templates_dir: Option<PathBuf>,
    pub themes_dir: Option<PathBuf>,
    /// Watch `templates_dir` and hot-reload changed files
    pub watch: bool,
    pub analytics: AnalyticsConfig,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_inheritance_depth: DEFAULT_MAX_DEPTH,
            io_timeout_ms: 5_000,
            composition_cache_capacity: 256,
            max_supplements: 3,
            scoring: ScoringWeights::default(),
            templates_dir: None,
            themes_dir: None,
            watch: false,
            analytics: AnalyticsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.analytics.flush_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_inheritance_depth == 0 {
            return Err(CompositionError::Validation(
                "max_inheritance_depth must be greater than 0".to_string(),
            ));
        }
        if self.io_timeout_ms == 0 {
            return Err(CompositionError::Validation(
                "io_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.analytics.flush_interval_ms == 0 {
            return Err(CompositionError::Validation(
                "analytics.flush_interval_ms must be greater than 0".to_string(),
            ));
        }
        self.scoring.validate()
    }
}

/// Loads [`EngineConfig`] from a file and the environment
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: Some(path.into()),
            ..Self::new()
        }
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Build and validate the configuration
    pub fn load(&self) -> Result<EngineConfig> {
        let mut builder = Config::builder();
        if let Some(path) = &self.config_path {
            builder = builder.add_source(File::from(path.clone()).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        tracing::debug!(?config, "Loaded engine configuration");
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
