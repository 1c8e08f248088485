//! Configuration loading from files and environment variables

use crate::error::{Error, Result};
use config::{Config as ConfigLib, Environment, File, FileFormat};
use std::path::Path;
use tracing::debug;

use super::defaults::ENV_PREFIX;
use super::WatcherConfig;

impl WatcherConfig {
    /// Loads configuration from a TOML file with environment variable overrides
    ///
    /// Environment variables are prefixed with `STATWATCH_`, for example
    /// `STATWATCH_INTERVAL_MS=250` or `STATWATCH_RECURSIVE=true`. A missing
    /// file is not an error; defaults and environment overrides still apply.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut builder = ConfigLib::builder();

        if path.exists() {
            debug!("Loading watcher configuration from {:?}", path);
            builder = builder.add_source(File::from(path));
        } else {
            debug!("No configuration file at {:?}, using defaults", path);
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build config: {e}")))?
            .try_deserialize::<WatcherConfig>()
            .map_err(|e| Error::config(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string, without environment overrides
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = ConfigLib::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .map_err(|e| Error::config(format!("Failed to parse TOML: {e}")))?
            .try_deserialize::<WatcherConfig>()
            .map_err(|e| Error::config(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }
}
