//! Authoritative stat cache and the diff & commit step
//!
//! The cache maps absolute paths to their current [`StatRecord`]. Only
//! [`StatCache::commit`] mutates it, under a single write lock, so readers
//! only ever see the state between ticks.

use crate::events::ChangeEvent;
use crate::generation::Generation;
use crate::paths::normalize;
use crate::record::StatRecord;
use statwatch_core::error::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::debug;

pub(crate) type CacheMap = HashMap<PathBuf, Arc<StatRecord>>;

/// Shared, read-only view of a watcher's committed records
#[derive(Clone, Default)]
pub struct StatCache {
    inner: Arc<RwLock<CacheMap>>,
}

impl std::fmt::Debug for StatCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatCache").finish_non_exhaustive()
    }
}

impl StatCache {
    /// Record for `path`, if committed
    pub async fn get(&self, path: &Path) -> Option<Arc<StatRecord>> {
        self.inner.read().await.get(path).cloned()
    }

    pub async fn contains(&self, path: &Path) -> bool {
        self.inner.read().await.contains_key(path)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// All committed paths, sorted
    pub async fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.inner.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Copy of the whole mapping; records are shared, not cloned
    pub async fn snapshot(&self) -> HashMap<PathBuf, Arc<StatRecord>> {
        self.inner.read().await.clone()
    }

    /// Look up `path`, following cached symlinks in any component
    ///
    /// Relative link destinations resolve against the link's directory.
    /// Returns `Ok(None)` when the resolved path has no record. Fails with
    /// [`Error::SymlinkLoop`] after `max_hops` links or when resolution
    /// comes back to a state it has already been in.
    pub async fn lookup(&self, path: &Path, max_hops: usize) -> Result<Option<Arc<StatRecord>>> {
        let cache = self.inner.read().await;
        resolve(&cache, path, max_hops)
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, CacheMap> {
        self.inner.read().await
    }

    /// Install a finished generation
    ///
    /// Every generated record replaces the cached one. Cached paths that are
    /// neither regenerated nor marked unchanged are removed. When `emit` is
    /// false no events are built (the baseline tick).
    pub(crate) async fn commit(&self, generation: Generation, emit: bool) -> Vec<ChangeEvent> {
        let Generation { records, unchanged } = generation;
        let mut cache = self.inner.write().await;
        let mut events = Vec::new();
        let mut regenerated = HashSet::with_capacity(records.len());

        for (path, record) in records {
            let record = Arc::new(record);
            let previous = cache.insert(path.clone(), Arc::clone(&record));
            if emit {
                events.push(ChangeEvent::new(path.clone(), previous, Some(record)));
            }
            regenerated.insert(path);
        }

        let vanished: Vec<PathBuf> = cache
            .keys()
            .filter(|path| !regenerated.contains(*path) && !unchanged.contains(*path))
            .cloned()
            .collect();
        for path in vanished {
            if let Some(previous) = cache.remove(&path) {
                if emit {
                    events.push(ChangeEvent::new(path, Some(previous), None));
                }
            }
        }

        debug!(
            "Committed {} records ({} unchanged), cache now holds {}",
            regenerated.len(),
            unchanged.len(),
            cache.len()
        );
        events
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Step {
    Root(OsString),
    Parent,
    Name(OsString),
}

fn steps(path: &Path) -> impl Iterator<Item = Step> + '_ {
    path.components().filter_map(|component| match component {
        Component::Prefix(_) | Component::RootDir => {
            Some(Step::Root(component.as_os_str().to_os_string()))
        }
        Component::CurDir => None,
        Component::ParentDir => Some(Step::Parent),
        Component::Normal(name) => Some(Step::Name(name.to_os_string())),
    })
}

fn resolve(cache: &CacheMap, path: &Path, max_hops: usize) -> Result<Option<Arc<StatRecord>>> {
    let mut pending: VecDeque<Step> = steps(&normalize(path)).collect();
    let mut resolved = PathBuf::new();
    let mut seen: HashSet<(PathBuf, VecDeque<Step>)> = HashSet::new();
    let mut hops = 0;

    while let Some(step) = pending.pop_front() {
        match step {
            Step::Root(root) => {
                resolved = PathBuf::from(root);
            }
            Step::Parent => {
                resolved.pop();
            }
            Step::Name(name) => {
                resolved.push(name);
                let Some(target) = cache.get(&resolved).and_then(|r| r.link_target()) else {
                    continue;
                };

                if hops >= max_hops || !seen.insert((resolved.clone(), pending.clone())) {
                    return Err(Error::SymlinkLoop {
                        path: path.to_path_buf(),
                        hops,
                    });
                }
                hops += 1;

                resolved.pop();
                for step in steps(target).collect::<Vec<_>>().into_iter().rev() {
                    pending.push_front(step);
                }
            }
        }
    }

    Ok(cache.get(&resolved).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EntryKind, EntryMetadata};
    use pretty_assertions::assert_eq;

    fn file(size: u64) -> StatRecord {
        StatRecord::new(
            EntryKind::File,
            EntryMetadata {
                size,
                ..Default::default()
            },
        )
    }

    fn link(target: &str) -> StatRecord {
        StatRecord::new(
            EntryKind::Symlink {
                target: PathBuf::from(target),
            },
            EntryMetadata::default(),
        )
    }

    fn generation(records: Vec<(&str, StatRecord)>, unchanged: &[&str]) -> Generation {
        Generation {
            records: records
                .into_iter()
                .map(|(p, r)| (PathBuf::from(p), r))
                .collect(),
            unchanged: unchanged.iter().map(PathBuf::from).collect(),
        }
    }

    #[tokio::test]
    async fn test_baseline_commit_is_silent() {
        let cache = StatCache::default();
        let events = cache
            .commit(generation(vec![("/r/a", file(1)), ("/r/b", file(2))], &[]), false)
            .await;

        assert!(events.is_empty());
        assert_eq!(cache.paths().await, vec![PathBuf::from("/r/a"), PathBuf::from("/r/b")]);
    }

    #[tokio::test]
    async fn test_commit_adds_modifies_removes_and_keeps_unchanged() {
        let cache = StatCache::default();
        cache
            .commit(
                generation(vec![("/r/a", file(1)), ("/r/b", file(2)), ("/r/c", file(3))], &[]),
                false,
            )
            .await;
        let kept = cache.get(Path::new("/r/c")).await.unwrap();

        let mut events = cache
            .commit(
                generation(vec![("/r/a", file(10)), ("/r/d", file(4))], &["/r/c"]),
                true,
            )
            .await;
        events.sort_by(|a, b| a.path.cmp(&b.path));

        let summary: Vec<_> = events
            .iter()
            .map(|e| (e.path.to_string_lossy().into_owned(), e.kind()))
            .collect();
        use crate::events::ChangeKind::*;
        assert_eq!(
            summary,
            vec![
                ("/r/a".to_string(), Modified),
                ("/r/b".to_string(), Removed),
                ("/r/d".to_string(), Added),
            ]
        );
        assert_eq!(events[0].previous.as_ref().unwrap().size(), 1);
        assert_eq!(events[0].current.as_ref().unwrap().size(), 10);

        assert!(!cache.contains(Path::new("/r/b")).await);
        let still = cache.get(Path::new("/r/c")).await.unwrap();
        assert!(Arc::ptr_eq(&kept, &still));
    }

    #[tokio::test]
    async fn test_lookup_follows_links() {
        let cache = StatCache::default();
        cache
            .commit(
                generation(
                    vec![
                        ("/r", StatRecord::new(
                            EntryKind::Dir { children: Default::default() },
                            EntryMetadata::default(),
                        )),
                        ("/r/real", file(7)),
                        ("/r/rel", link("real")),
                        ("/r/abs", link("/r/rel")),
                        ("/r/sub", link(".")),
                        ("/r/dangling", link("nowhere")),
                    ],
                    &[],
                ),
                false,
            )
            .await;

        let found = cache.lookup(Path::new("/r/abs"), 40).await.unwrap().unwrap();
        assert_eq!(found.size(), 7);
        let through_dir = cache.lookup(Path::new("/r/sub/real"), 40).await.unwrap().unwrap();
        assert_eq!(through_dir.size(), 7);
        let plain = cache.lookup(Path::new("/r/real"), 40).await.unwrap().unwrap();
        assert_eq!(plain.size(), 7);

        assert!(cache.lookup(Path::new("/r/dangling"), 40).await.unwrap().is_none());
        assert!(cache.lookup(Path::new("/r/unknown"), 40).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_detects_cycles_and_hop_limit() {
        let cache = StatCache::default();
        cache
            .commit(
                generation(
                    vec![
                        ("/r/a", link("b")),
                        ("/r/b", link("a")),
                        ("/r/c1", link("c2")),
                        ("/r/c2", link("c3")),
                        ("/r/c3", file(0)),
                    ],
                    &[],
                ),
                false,
            )
            .await;

        let err = cache.lookup(Path::new("/r/a"), 40).await.unwrap_err();
        assert!(matches!(err, Error::SymlinkLoop { hops: 2, .. }), "got {err:?}");

        let err = cache.lookup(Path::new("/r/c1"), 1).await.unwrap_err();
        assert!(matches!(err, Error::SymlinkLoop { hops: 1, .. }), "got {err:?}");
        assert!(cache.lookup(Path::new("/r/c1"), 2).await.unwrap().is_some());
    }
}
