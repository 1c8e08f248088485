#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Stat-polling directory watcher
//!
//! For filesystems where native change notification is missing or cannot be
//! trusted (network mounts, virtualized or sandboxed hosts), this crate polls
//! a directory tree at a fixed interval and reports changes by diffing each
//! poll against the previous one:
//! - A normalized [`StatRecord`] cache for every reachable entry
//! - Two-phase notifications: pre-commit while walking, post-commit after
//! - Asynchronous augmentation of records before they are committed
//! - Single-flight scheduling; failed ticks are reported and retried
//!
//! # Example
//!
//! ```no_run
//! use statwatch_watcher::{PollWatcher, WatcherConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WatcherConfig::builder().recursive(true).interval_ms(1000).build();
//! let watcher = PollWatcher::new("/path/to/share", config)?;
//! let mut changes = watcher.subscribe_channel();
//!
//! while let Some(batch) = changes.recv().await {
//!     for change in batch {
//!         println!("{:?}: {:?}", change.kind(), change.path);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// Private implementation modules
mod cache;
mod engine;
mod events;
mod fs;
mod generation;
mod notifier;
mod paths;
mod record;
#[cfg(test)]
mod testing;
mod walker;
mod watcher;

// Public exports - minimal API surface
pub use cache::StatCache;
pub use engine::TickSummary;
pub use events::{ChangeEvent, ChangeKind};
pub use fs::{FileSystem, LocalFileSystem, Lstat, NodeType};
pub use generation::{Augmentation, Augmenter};
pub use notifier::{PendingChange, SubscriptionId, WatchListener};
pub use record::{EntryKind, EntryMetadata, StatRecord, Timestamp};
pub use statwatch_core::{Error, Result, WatcherConfig, WatcherConfigBuilder};
pub use watcher::{ErrorSink, PollWatcher, TracingErrorSink, WatcherState};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::events::{ChangeEvent, ChangeKind};
    pub use crate::record::StatRecord;
    pub use crate::watcher::PollWatcher;
    pub use statwatch_core::WatcherConfig;
}
