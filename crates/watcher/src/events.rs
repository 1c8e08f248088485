//! Change notification types
//!
//! A [`ChangeEvent`] is raised after a tick commits, once per path that was
//! added, modified or removed. Unchanged paths never produce one.

use crate::record::StatRecord;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Classification of a committed change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Path had no record before this tick
    Added,
    /// Path's record was replaced
    Modified,
    /// Path vanished or became inaccessible
    Removed,
}

/// A committed change to one path
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Absolute path of the entry
    pub path: PathBuf,
    /// Record before this tick, if any
    pub previous: Option<Arc<StatRecord>>,
    /// Record after this tick; `None` exactly for removals
    pub current: Option<Arc<StatRecord>>,
}

impl ChangeEvent {
    pub(crate) fn new(
        path: PathBuf,
        previous: Option<Arc<StatRecord>>,
        current: Option<Arc<StatRecord>>,
    ) -> Self {
        Self {
            path,
            previous,
            current,
        }
    }

    /// Get the path associated with this change
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Classify the change
    pub fn kind(&self) -> ChangeKind {
        match (&self.previous, &self.current) {
            (_, None) => ChangeKind::Removed,
            (None, Some(_)) => ChangeKind::Added,
            (Some(_), Some(_)) => ChangeKind::Modified,
        }
    }

    pub fn is_removal(&self) -> bool {
        self.current.is_none()
    }
}
