//! Core types for the statwatch polling watcher
//!
//! This crate provides the foundations shared by the watcher crates:
//!
//! - **Error handling**: a unified error type and result alias
//! - **Configuration**: watcher options with defaults, validation and
//!   file/environment loading
//!

pub mod config;
pub mod error;

// Re-export main types for convenience
pub use config::{WatcherConfig, WatcherConfigBuilder};
pub use error::{Error, Result};

/// Version of the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::WatcherConfig;
    pub use crate::error::{Error, Result};
}
