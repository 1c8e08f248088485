//! Two-phase change notification
//!
//! Listeners see every change twice: once as a [`PendingChange`] the moment
//! the walker computes a new record, and once as a [`ChangeEvent`] after the
//! tick has committed. Within a tick, every pre-change call happens before
//! any post-commit call.

use crate::events::ChangeEvent;
use crate::generation::{Augmentation, Augmenter};
use crate::record::StatRecord;
use dashmap::DashMap;
use statwatch_core::error::Result;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Observer of a watcher's change notifications
///
/// Both callbacks run on the tick's task and must not block.
pub trait WatchListener: Send + Sync {
    /// A new record was computed for a path during the walk, before commit
    fn pre_change(&self, change: &PendingChange<'_>) {
        let _ = change;
    }

    /// A change was committed to the cache
    fn change(&self, event: &ChangeEvent) {
        let _ = event;
    }

    /// Every change one tick committed, in a single call
    ///
    /// Defaults to calling [`WatchListener::change`] for each event.
    fn changes(&self, events: &[ChangeEvent]) {
        for event in events {
            self.change(event);
        }
    }
}

/// A record computed during the walk that has not been committed yet
pub struct PendingChange<'a> {
    path: &'a Path,
    previous: Option<&'a Arc<StatRecord>>,
    augmenter: &'a Augmenter,
}

impl<'a> PendingChange<'a> {
    pub(crate) fn new(
        path: &'a Path,
        previous: Option<&'a Arc<StatRecord>>,
        augmenter: &'a Augmenter,
    ) -> Self {
        Self {
            path,
            previous,
            augmenter,
        }
    }

    pub fn path(&self) -> &Path {
        self.path
    }

    /// The committed record this change will replace, if any
    pub fn previous(&self) -> Option<&Arc<StatRecord>> {
        self.previous
    }

    /// Attach an asynchronous augmentation to this path's pending record
    pub fn augment<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = anyhow::Result<Augmentation>> + Send + 'static,
    {
        self.augmenter.augment(self.path, task)
    }

    /// Attach fields that are already known to this path's pending record
    pub fn augment_with(&self, fields: Augmentation) -> Result<()> {
        self.augmenter.augment_with(self.path, fields)
    }

    /// Registry handle for augmenting other pending paths of this tick
    pub fn augmenter(&self) -> &Augmenter {
        self.augmenter
    }
}

/// Identifies a listener registered with [`Notifier::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Multi-subscriber fan-out of change notifications
#[derive(Default)]
pub(crate) struct Notifier {
    listeners: DashMap<u64, Arc<dyn WatchListener>>,
    next_id: AtomicU64,
}

impl Notifier {
    pub fn subscribe(&self, listener: Arc<dyn WatchListener>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, listener);
        SubscriptionId(id)
    }

    /// Returns whether the subscription existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.remove(&id.0).is_some()
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Snapshot in subscription order, so callbacks run without holding map locks
    fn snapshot(&self) -> Vec<Arc<dyn WatchListener>> {
        let mut listeners: Vec<_> = self
            .listeners
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        listeners.sort_by_key(|(id, _)| *id);
        listeners.into_iter().map(|(_, listener)| listener).collect()
    }

    pub fn pre_change(&self, change: &PendingChange<'_>) {
        trace!("Pre-change for {:?}", change.path());
        for listener in self.snapshot() {
            listener.pre_change(change);
        }
    }

    pub fn changes(&self, events: &[ChangeEvent]) {
        if events.is_empty() {
            return;
        }
        trace!("Delivering {} changes", events.len());
        for listener in self.snapshot() {
            listener.changes(events);
        }
    }
}

/// Forwards each tick's committed changes into a bounded channel as one batch
pub(crate) struct ChannelListener {
    tx: mpsc::Sender<Vec<ChangeEvent>>,
}

impl ChannelListener {
    pub fn new(tx: mpsc::Sender<Vec<ChangeEvent>>) -> Self {
        Self { tx }
    }
}

impl WatchListener for ChannelListener {
    fn changes(&self, events: &[ChangeEvent]) {
        match self.tx.try_send(events.to_vec()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(batch)) => {
                warn!(
                    "Change channel full, dropping a batch of {} changes",
                    batch.len()
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Change channel closed");
            }
        }
    }
}
