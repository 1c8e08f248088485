//! Pending generation and augmentation registry
//!
//! While a tick walks the tree, newly computed records collect in a
//! [`PendingGeneration`] alongside the set of paths found unchanged.
//! Collaborators may attach asynchronous augmentations to pending records
//! through an [`Augmenter`], but only while the walk is running; all of them
//! are resolved before the generation is committed.

use dashmap::{DashMap, DashSet};
use futures::future::{try_join_all, BoxFuture, FutureExt};
use serde_json::{Map, Value};
use statwatch_core::error::{Error, Result};
use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

use crate::record::StatRecord;

/// Fields to merge onto a pending record
pub type Augmentation = Map<String, Value>;

type AugmentTask = BoxFuture<'static, Result<(PathBuf, Augmentation)>>;

/// Records computed by the tick in progress
#[derive(Default)]
pub(crate) struct PendingGeneration {
    records: DashMap<PathBuf, StatRecord>,
    unchanged: DashSet<PathBuf>,
    /// `Some` exactly while the walking window is open
    tasks: Mutex<Option<Vec<AugmentTask>>>,
}

/// Everything a tick produced, ready to be committed
#[derive(Debug, Default)]
pub(crate) struct Generation {
    pub records: Vec<(PathBuf, StatRecord)>,
    pub unchanged: HashSet<PathBuf>,
}

impl PendingGeneration {
    fn tasks(&self) -> MutexGuard<'_, Option<Vec<AugmentTask>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discard leftovers and open the walking window
    pub fn begin(&self) {
        self.records.clear();
        self.unchanged.clear();
        *self.tasks() = Some(Vec::new());
    }

    /// Close the walking window, returning the registered augmentations
    fn close_window(&self) -> Vec<AugmentTask> {
        self.tasks().take().unwrap_or_default()
    }

    pub fn is_walking(&self) -> bool {
        self.tasks().is_some()
    }

    pub fn insert(&self, path: PathBuf, record: StatRecord) {
        self.records.insert(path, record);
    }

    pub fn mark_unchanged(&self, path: PathBuf) {
        self.unchanged.insert(path);
    }

    /// Register an augmentation for `path`
    ///
    /// Fails if the walking window is closed or `path` has no pending record.
    fn register(&self, path: PathBuf, task: AugmentTask) -> Result<()> {
        let mut tasks = self.tasks();
        let Some(tasks) = tasks.as_mut() else {
            return Err(Error::usage(format!(
                "cannot augment {path:?}: augmentations are only accepted while a walk is in progress"
            )));
        };
        if !self.records.contains_key(&path) {
            return Err(Error::usage(format!(
                "cannot augment {path:?}: no pending record for this path"
            )));
        }

        trace!("Registered augmentation for {:?}", path);
        tasks.push(task);
        Ok(())
    }

    /// Close the walking window and await every registered augmentation,
    /// merging each result onto its pending record
    pub async fn finish_walk(&self) -> Result<usize> {
        let tasks = self.close_window();
        let count = tasks.len();
        for (path, fields) in try_join_all(tasks).await? {
            if let Some(mut record) = self.records.get_mut(&path) {
                record.extend(fields);
            }
        }
        Ok(count)
    }

    /// Abandon the tick: close the window and drop anything pending
    pub fn abort(&self) {
        drop(self.close_window());
        self.records.clear();
        self.unchanged.clear();
    }

    /// Take the finished generation out of the store
    pub fn drain(&self) -> Generation {
        let records = self
            .records
            .iter()
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|path| self.records.remove(&path))
            .collect();
        let unchanged = self
            .unchanged
            .iter()
            .map(|path| path.key().clone())
            .collect();
        self.unchanged.clear();

        Generation { records, unchanged }
    }
}

/// Handle for attaching augmentations to the records of the tick in progress
#[derive(Clone)]
pub struct Augmenter {
    generation: Arc<PendingGeneration>,
}

impl std::fmt::Debug for Augmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Augmenter")
            .field("walking", &self.generation.is_walking())
            .finish()
    }
}

impl Augmenter {
    pub(crate) fn new(generation: Arc<PendingGeneration>) -> Self {
        Self { generation }
    }

    /// Whether augmentations are currently accepted
    pub fn is_walking(&self) -> bool {
        self.generation.is_walking()
    }

    /// Attach an asynchronous augmentation to the pending record for `path`
    ///
    /// The task's fields are merged onto the record before the tick commits,
    /// so they are visible on the record delivered with that tick's change
    /// event. A failing task fails the whole tick.
    pub fn augment<F>(&self, path: impl Into<PathBuf>, task: F) -> Result<()>
    where
        F: Future<Output = anyhow::Result<Augmentation>> + Send + 'static,
    {
        let path = path.into();
        let task_path = path.clone();
        let task = async move {
            match task.await {
                Ok(fields) => Ok((task_path, fields)),
                Err(e) => Err(Error::augmentation(task_path, e)),
            }
        }
        .boxed();

        self.generation.register(path, task)
    }

    /// Attach fields that are already known
    pub fn augment_with(&self, path: impl Into<PathBuf>, fields: Augmentation) -> Result<()> {
        self.augment(path, async move { Ok(fields) })
    }
}
