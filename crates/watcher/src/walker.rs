//! Recursive stat walk
//!
//! One walk visits the root, the root's immediate children and, when the
//! watcher is recursive, everything below them. Each visited path either
//! gets a fresh record in the pending generation or, when its cached record
//! is at least as recent as the observed change time, is marked unchanged.
//!
//! Directories are always listed and descended into before their own
//! change time is compared. Some filesystems only bump the immediate
//! parent's change time when a child changes, so an unchanged directory
//! says nothing about its grandchildren.

use crate::cache::CacheMap;
use crate::fs::{FileSystem, Lstat, NodeType};
use crate::generation::{Augmenter, PendingGeneration};
use crate::notifier::{Notifier, PendingChange};
use crate::record::{EntryKind, StatRecord};
use futures::future::{try_join_all, BoxFuture, FutureExt};
use statwatch_core::error::{Error, Result};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::trace;

/// Per-path failures that just mean "no record this tick"
fn is_absent(error: &Error) -> bool {
    matches!(
        error.io_kind(),
        Some(io::ErrorKind::NotFound) | Some(io::ErrorKind::PermissionDenied)
    )
}

/// A single traversal of the watched tree
pub(crate) struct StatWalker<'a> {
    pub fs: &'a dyn FileSystem,
    /// Committed records from the previous tick
    pub cache: &'a CacheMap,
    pub generation: &'a PendingGeneration,
    pub notifier: &'a Notifier,
    pub augmenter: &'a Augmenter,
    pub recursive: bool,
    pub operation_timeout: Option<Duration>,
}

impl StatWalker<'_> {
    /// Walk from `root`. The root's own children are always visited.
    pub async fn walk(&self, root: &Path) -> Result<()> {
        self.visit(root.to_path_buf(), true).await
    }

    fn visit(&self, path: PathBuf, descend: bool) -> BoxFuture<'_, Result<()>> {
        async move {
            match self.visit_path(&path, descend).await {
                Err(e) if is_absent(&e) => {
                    trace!("Skipping {:?}: {}", path, e);
                    Ok(())
                }
                other => other,
            }
        }
        .boxed()
    }

    async fn visit_path(&self, path: &Path, descend: bool) -> Result<()> {
        let previous = self.cache.get(path);
        let Lstat {
            node_type,
            metadata,
        } = self.bounded("lstat", path, self.fs.lstat(path)).await?;

        let mut children = None;
        if node_type == NodeType::Dir {
            let names = self
                .bounded("read_dir", path, self.fs.read_dir(path))
                .await?;
            if descend {
                try_join_all(
                    names
                        .iter()
                        .map(|name| self.visit(path.join(name), self.recursive)),
                )
                .await?;
            }
            children = Some(names.into_iter().collect());
        }

        if let Some(previous) = previous {
            if previous.is_current(metadata.ctime) {
                trace!("Unchanged {:?}", path);
                self.generation.mark_unchanged(path.to_path_buf());
                return Ok(());
            }
        }

        let kind = match node_type {
            NodeType::Block => EntryKind::Block,
            NodeType::Char => EntryKind::Char,
            NodeType::Pipe => EntryKind::Pipe,
            NodeType::File => EntryKind::File,
            NodeType::Socket => EntryKind::Socket,
            NodeType::Symlink => EntryKind::Symlink {
                target: self
                    .bounded("read_link", path, self.fs.read_link(path))
                    .await?,
            },
            NodeType::Dir => EntryKind::Dir {
                children: children.unwrap_or_default(),
            },
        };

        trace!("Computed {} record for {:?}", kind.name(), path);
        self.generation
            .insert(path.to_path_buf(), StatRecord::new(kind, metadata));
        self.notifier
            .pre_change(&PendingChange::new(path, previous, self.augmenter));
        Ok(())
    }

    /// Run one filesystem call, applying the per-operation deadline if set
    async fn bounded<T>(
        &self,
        operation: &'static str,
        path: &Path,
        call: impl Future<Output = io::Result<T>>,
    ) -> Result<T> {
        let result = match self.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| Error::Timeout {
                    operation,
                    path: path.to_path_buf(),
                    elapsed: limit,
                })?,
            None => call.await,
        };
        result.map_err(|e| Error::path_io(path, e))
    }
}
