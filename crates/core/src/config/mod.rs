//! Configuration for the polling watcher
//!
//! Options can be set programmatically through [`WatcherConfig::builder`] or
//! loaded from a TOML file with environment variable overrides.

mod defaults;
mod loading;


use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use defaults::*;

/// Options recognized by a polling watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Keep polling after the last watcher handle is dropped (default: false)
    #[serde(default = "default_persistent")]
    pub persistent: bool,

    /// Traverse below the root's immediate children (default: false)
    #[serde(default = "default_recursive")]
    pub recursive: bool,

    /// Delay between the end of one tick and the start of the next (default: 5007ms)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Deadline for each individual filesystem call; unbounded when unset
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: Option<u64>,

    /// Maximum number of links followed by a lookup (default: 40)
    #[serde(default = "default_max_symlink_hops")]
    pub max_symlink_hops: usize,

    /// Capacity of channel subscriptions (default: 1024)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            persistent: default_persistent(),
            recursive: default_recursive(),
            interval_ms: default_interval_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
            max_symlink_hops: default_max_symlink_hops(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl WatcherConfig {
    /// Create configuration from builder
    pub fn builder() -> WatcherConfigBuilder {
        WatcherConfigBuilder::default()
    }

    /// Get the poll interval
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Get the per-operation deadline, if any
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(Error::config(
                "interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.operation_timeout_ms == Some(0) {
            return Err(Error::config(
                "operation_timeout_ms must be greater than 0 when set".to_string(),
            ));
        }

        if self.max_symlink_hops == 0 {
            return Err(Error::config(
                "max_symlink_hops must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(Error::config(
                "event_buffer must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for WatcherConfig
#[derive(Debug, Default)]
pub struct WatcherConfigBuilder {
    config: WatcherConfig,
}

impl WatcherConfigBuilder {
    /// Set whether the poll task outlives its handles
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.config.persistent = persistent;
        self
    }

    /// Set whether nested directories are traversed
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.config.recursive = recursive;
        self
    }

    /// Set poll interval in milliseconds
    pub fn interval_ms(mut self, ms: u64) -> Self {
        self.config.interval_ms = ms;
        self
    }

    /// Bound every filesystem call by `ms` milliseconds
    pub fn operation_timeout_ms(mut self, ms: u64) -> Self {
        self.config.operation_timeout_ms = Some(ms);
        self
    }

    /// Set the symlink hop limit used by lookups
    pub fn max_symlink_hops(mut self, hops: usize) -> Self {
        self.config.max_symlink_hops = hops;
        self
    }

    /// Set channel subscription capacity
    pub fn event_buffer(mut self, size: usize) -> Self {
        self.config.event_buffer = size;
        self
    }

    /// Build the configuration
    pub fn build(self) -> WatcherConfig {
        self.config
    }
}
