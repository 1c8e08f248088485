//! One poll cycle: walk, augment, diff & commit, notify

use crate::cache::StatCache;
use crate::fs::FileSystem;
use crate::generation::{Augmenter, PendingGeneration};
use crate::notifier::Notifier;
use crate::walker::StatWalker;
use statwatch_core::error::{Error, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// What a completed tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// 1-based count of successful ticks, including this one
    pub tick: u64,
    /// Paths that received a new record
    pub changed: usize,
    /// Paths whose cached record was kept
    pub unchanged: usize,
    /// Augmentations resolved before commit
    pub augmentations: usize,
    /// Change events delivered to listeners
    pub events: usize,
    /// Whether this tick only established the baseline
    pub baseline: bool,
    pub elapsed: Duration,
}

pub(crate) struct StatEngine {
    pub root: PathBuf,
    pub recursive: bool,
    pub operation_timeout: Option<Duration>,
    pub fs: Arc<dyn FileSystem>,
    pub cache: StatCache,
    pub generation: Arc<PendingGeneration>,
    pub augmenter: Augmenter,
    pub notifier: Notifier,
    initialized: AtomicBool,
    ticking: AtomicBool,
    halted: AtomicBool,
    completed: AtomicU64,
    /// Serializes ticks; at most one is ever in flight
    tick_lock: Mutex<()>,
}

impl StatEngine {
    pub fn new(
        root: PathBuf,
        recursive: bool,
        operation_timeout: Option<Duration>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let generation = Arc::new(PendingGeneration::default());
        Self {
            root,
            recursive,
            operation_timeout,
            fs,
            cache: StatCache::default(),
            augmenter: Augmenter::new(Arc::clone(&generation)),
            generation,
            notifier: Notifier::default(),
            initialized: AtomicBool::new(false),
            ticking: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            completed: AtomicU64::new(0),
            tick_lock: Mutex::new(()),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_ticking(&self) -> bool {
        self.ticking.load(Ordering::Acquire)
    }

    /// Refuse every tick that has not yet started
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    /// Wait until no tick is in flight
    pub async fn idle(&self) {
        drop(self.tick_lock.lock().await);
    }

    /// Run one tick. On failure nothing is committed and nothing is emitted.
    pub async fn tick(&self) -> Result<TickSummary> {
        let _guard = self.tick_lock.lock().await;
        if self.halted.load(Ordering::Acquire) {
            return Err(Error::watcher("watcher is stopped"));
        }
        self.ticking.store(true, Ordering::Release);
        let started = Instant::now();

        let result = self.run(started).await;
        if result.is_err() {
            self.generation.abort();
        }

        self.ticking.store(false, Ordering::Release);
        result
    }

    async fn run(&self, started: Instant) -> Result<TickSummary> {
        self.generation.begin();
        {
            let cache = self.cache.read().await;
            let walker = StatWalker {
                fs: self.fs.as_ref(),
                cache: &cache,
                generation: &self.generation,
                notifier: &self.notifier,
                augmenter: &self.augmenter,
                recursive: self.recursive,
                operation_timeout: self.operation_timeout,
            };
            walker.walk(&self.root).await?;
        }

        let augmentations = self.generation.finish_walk().await?;
        let generation = self.generation.drain();
        let changed = generation.records.len();
        let unchanged = generation.unchanged.len();

        let baseline = !self.is_initialized();
        let events = self.cache.commit(generation, !baseline).await;
        self.initialized.store(true, Ordering::Release);
        self.notifier.changes(&events);

        let summary = TickSummary {
            tick: self.completed.fetch_add(1, Ordering::AcqRel) + 1,
            changed,
            unchanged,
            augmentations,
            events: events.len(),
            baseline,
            elapsed: started.elapsed(),
        };
        debug!(
            "Tick {} of {:?}: {} changed, {} unchanged, {} events in {:?}",
            summary.tick,
            self.root,
            summary.changed,
            summary.unchanged,
            summary.events,
            summary.elapsed
        );
        Ok(summary)
    }
}
