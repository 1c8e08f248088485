//! Poll scheduling and watcher lifecycle
//!
//! A [`PollWatcher`] owns a single background task that sleeps for the
//! configured interval, runs one tick, and only then sleeps again, so ticks
//! never overlap. Tick failures go to an [`ErrorSink`] and the schedule
//! carries on.

use crate::cache::StatCache;
use crate::engine::{StatEngine, TickSummary};
use crate::events::ChangeEvent;
use crate::fs::{FileSystem, LocalFileSystem};
use crate::generation::{Augmentation, Augmenter};
use crate::notifier::{ChannelListener, SubscriptionId, WatchListener};
use crate::paths::absolutize;
use crate::record::StatRecord;
use statwatch_core::config::WatcherConfig;
use statwatch_core::error::{Error, Result};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receiver of tick-level failures
///
/// Tick failures are never fatal to the watcher; they are handed here and
/// the next tick is scheduled as usual.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &Error);
}

impl<F> ErrorSink for F
where
    F: Fn(&Error) + Send + Sync,
{
    fn report(&self, error: &Error) {
        self(error)
    }
}

/// Default sink, logging failures as warnings
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, error: &Error) {
        warn!("Watcher tick failed, will retry next interval: {}", error);
    }
}

/// Lifecycle state of a watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatcherState {
    /// Waiting for the next tick
    Idle,
    /// A tick is running
    Ticking,
    /// No further ticks will be scheduled
    Stopped,
}

struct Shared {
    engine: StatEngine,
    config: WatcherConfig,
    persistent: AtomicBool,
    cancel: CancellationToken,
    /// Cancelled once the poll task has exited
    finished: CancellationToken,
    sink: Arc<dyn ErrorSink>,
}

impl Shared {
    fn stop(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.engine.halt();
        self.cancel.cancel();
        self.engine.notifier.clear();
        info!("Stopped watching {:?}", self.engine.root);
    }
}

/// Polling watcher over one directory tree
///
/// Must be created inside a tokio runtime. The first tick runs one interval
/// after construction and only records a baseline; change events start with
/// the second tick.
///
/// `stop` returns without waiting for a tick that is already running. That
/// tick still commits to the cache, but listeners are detached first, so it
/// delivers nothing to them unless its delivery had already started. Use
/// `shutdown` to also wait until no tick is in flight.
pub struct PollWatcher {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for PollWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollWatcher")
            .field("root", &self.shared.engine.root)
            .field("state", &self.state())
            .field("listeners", &self.shared.engine.notifier.len())
            .finish_non_exhaustive()
    }
}

impl PollWatcher {
    /// Watch `root` on the local filesystem, logging tick failures
    pub fn new(root: impl AsRef<Path>, config: WatcherConfig) -> Result<Self> {
        Self::with_parts(
            root,
            config,
            Arc::new(LocalFileSystem),
            Arc::new(TracingErrorSink),
        )
    }

    /// Watch `root` through a custom filesystem and error sink
    pub fn with_parts(
        root: impl AsRef<Path>,
        config: WatcherConfig,
        fs: Arc<dyn FileSystem>,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<Self> {
        config.validate()?;
        let root = root.as_ref();
        let root = absolutize(root).map_err(|e| Error::path_io(root, e))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::watcher(format!("PollWatcher requires a tokio runtime: {e}")))?;

        let engine = StatEngine::new(
            root.clone(),
            config.recursive,
            config.operation_timeout(),
            fs,
        );
        let shared = Arc::new(Shared {
            engine,
            persistent: AtomicBool::new(config.persistent),
            config,
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
            sink,
        });

        // Signals `finished` on exit, panic, or the runtime dropping the task
        let finished = shared.finished.clone().drop_guard();
        let task_shared = Arc::clone(&shared);
        runtime.spawn(async move {
            let _finished = finished;
            Self::run(task_shared).await;
        });
        info!(
            "Polling {:?} every {:?} (recursive: {})",
            root,
            shared.config.interval(),
            shared.config.recursive
        );

        Ok(Self { shared })
    }

    async fn run(shared: Arc<Shared>) {
        let interval = shared.config.interval();
        loop {
            tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            match shared.engine.tick().await {
                Ok(summary) => debug!("Tick {} complete", summary.tick),
                Err(_) if shared.cancel.is_cancelled() => break,
                Err(e) => shared.sink.report(&e),
            }
        }
        debug!("Poll task for {:?} exited", shared.engine.root);
    }

    /// The absolute root being watched
    pub fn root(&self) -> &Path {
        &self.shared.engine.root
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.shared.config
    }

    pub fn state(&self) -> WatcherState {
        if self.shared.cancel.is_cancelled() {
            WatcherState::Stopped
        } else if self.shared.engine.is_ticking() {
            WatcherState::Ticking
        } else {
            WatcherState::Idle
        }
    }

    /// Whether the baseline tick has completed
    pub fn is_initialized(&self) -> bool {
        self.shared.engine.is_initialized()
    }

    /// Committed records; the handle stays valid for the watcher's lifetime
    pub fn cache(&self) -> &StatCache {
        &self.shared.engine.cache
    }

    /// Look up a path, following cached symlinks up to `max_symlink_hops`
    pub async fn lookup(&self, path: impl AsRef<Path>) -> Result<Option<Arc<StatRecord>>> {
        let path = path.as_ref();
        let path = absolutize(path).map_err(|e| Error::path_io(path, e))?;
        self.cache()
            .lookup(&path, self.shared.config.max_symlink_hops)
            .await
    }

    /// Keep polling after this handle is dropped
    pub fn set_persistent(&self, persistent: bool) {
        self.shared.persistent.store(persistent, Ordering::Release);
    }

    pub fn is_persistent(&self) -> bool {
        self.shared.persistent.load(Ordering::Acquire)
    }

    pub fn subscribe(&self, listener: Arc<dyn WatchListener>) -> SubscriptionId {
        self.shared.engine.notifier.subscribe(listener)
    }

    /// Returns whether the subscription existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.engine.notifier.unsubscribe(id)
    }

    /// Receive each tick's committed changes as one batch
    ///
    /// The channel holds up to `event_buffer` batches; when the receiver
    /// falls that many ticks behind, further batches are dropped whole.
    pub fn subscribe_channel(&self) -> mpsc::Receiver<Vec<ChangeEvent>> {
        let (tx, rx) = mpsc::channel(self.shared.config.event_buffer);
        self.subscribe(Arc::new(ChannelListener::new(tx)));
        rx
    }

    /// Registry for augmenting pending records while a walk is running
    pub fn augmenter(&self) -> Augmenter {
        self.shared.engine.augmenter.clone()
    }

    /// Attach an asynchronous augmentation to a pending record
    ///
    /// Fails with [`Error::Usage`] unless a walk is in progress and `path`
    /// has a pending record.
    pub fn augment<F>(&self, path: impl AsRef<Path>, task: F) -> Result<()>
    where
        F: Future<Output = anyhow::Result<Augmentation>> + Send + 'static,
    {
        self.shared.engine.augmenter.augment(path.as_ref(), task)
    }

    /// Run a tick now, queued behind any tick already running
    pub async fn poll_now(&self) -> Result<TickSummary> {
        if self.shared.cancel.is_cancelled() {
            return Err(Error::watcher("watcher is stopped"));
        }
        self.shared.engine.tick().await
    }

    /// Stop scheduling ticks and detach every listener. Idempotent.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Stop, then wait until no tick is in flight
    pub async fn shutdown(&self) {
        self.stop();
        self.closed().await;
    }

    /// Wait until the watcher has been stopped, its poll task has exited and
    /// no tick (scheduled or from `poll_now`) is still running
    pub async fn closed(&self) {
        self.shared.cancel.cancelled().await;
        self.shared.finished.cancelled().await;
        self.shared.engine.idle().await;
    }
}

impl Drop for PollWatcher {
    fn drop(&mut self) {
        if !self.is_persistent() {
            self.shared.stop();
        }
    }
}
