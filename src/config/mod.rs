//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod projection;
mod storage;

pub use projection::{
    ProjectionConfig, ProjectionOverride, ProjectionSettings, ProjectionsConfig, RetryConfig,
    RetryPolicy,
};
pub use storage::{StorageConfig, StorageType};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "IAM_PROJECTOR_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "IAM_PROJECTOR";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "IAM_PROJECTOR_LOG";

use serde::Deserialize;
use uuid::Uuid;

use crate::projection::ExecutorStrategy;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity used as run-lock holder. Generated per process if unset.
    pub holder: Option<String>,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Projection scheduling configuration.
    pub projections: ProjectionsConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.projections.defaults.validate("defaults")?;
        for name in self.projections.overrides.keys() {
            self.projections
                .settings_for(name, ExecutorStrategy::Batched)
                .validate(name)?;
        }
        if self.storage.path.is_empty() {
            return Err(ConfigError::Invalid("storage.path must be set".into()));
        }
        Ok(())
    }

    /// Run-lock holder identity for this process.
    pub fn holder_id(&self) -> String {
        self.holder
            .clone()
            .unwrap_or_else(|| format!("projector-{}-{}", std::process::id(), Uuid::new_v4()))
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}
