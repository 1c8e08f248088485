//! In-memory filesystem for deterministic engine tests
//!
//! Every mutation advances a logical clock that becomes the change time of
//! the touched entry; creating or removing an entry also bumps its parent,
//! as directory change times do on disk.

use crate::fs::{FileSystem, Lstat, NodeType};
use crate::record::{EntryMetadata, Timestamp};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

#[derive(Debug, Clone)]
struct Node {
    node_type: NodeType,
    size: u64,
    ctime: i64,
    target: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    failures: HashMap<PathBuf, io::ErrorKind>,
    stalled: HashSet<PathBuf>,
    clock: i64,
}

impl State {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn bump_parent(&mut self, path: &Path, now: i64) {
        if let Some(parent) = path.parent().and_then(|p| self.nodes.get_mut(p)) {
            parent.ctime = now;
        }
    }

    fn put(&mut self, path: &str, node_type: NodeType, size: u64, target: Option<PathBuf>) {
        let now = self.tick();
        let path = PathBuf::from(path);
        self.bump_parent(&path, now);
        self.nodes.insert(
            path,
            Node {
                node_type,
                size,
                ctime: now,
                target,
            },
        );
    }

    fn check(&self, path: &Path) -> io::Result<()> {
        match self.failures.get(path) {
            Some(kind) => Err(io::Error::new(*kind, format!("injected failure on {path:?}"))),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MemoryFileSystem {
    state: Arc<Mutex<State>>,
    /// Bumped whenever a stalled path is released
    resume: Arc<watch::Sender<u64>>,
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            resume: Arc::new(watch::channel(0).0),
        }
    }
}

impl MemoryFileSystem {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn dir(&self, path: &str) {
        self.state().put(path, NodeType::Dir, 4096, None);
    }

    pub fn file(&self, path: &str, size: u64) {
        self.state().put(path, NodeType::File, size, None);
    }

    pub fn symlink(&self, path: &str, target: &str) {
        self.state()
            .put(path, NodeType::Symlink, target.len() as u64, Some(target.into()));
    }

    /// Rewrite a file in place; only its own change time moves
    pub fn touch(&self, path: &str, size: u64) {
        let mut state = self.state();
        let now = state.tick();
        let node = state.nodes.get_mut(Path::new(path)).unwrap();
        node.size = size;
        node.ctime = now;
    }

    /// Remove an entry and everything below it
    pub fn remove(&self, path: &str) {
        let mut state = self.state();
        let now = state.tick();
        let path = PathBuf::from(path);
        state.nodes.retain(|p, _| !p.starts_with(&path));
        state.bump_parent(&path, now);
    }

    pub fn fail(&self, path: &str, kind: io::ErrorKind) {
        self.state().failures.insert(PathBuf::from(path), kind);
    }

    pub fn clear_failure(&self, path: &str) {
        self.state().failures.remove(Path::new(path));
    }

    /// Make every call on `path` hang until it is released
    pub fn stall(&self, path: &str) {
        self.state().stalled.insert(PathBuf::from(path));
    }

    pub fn release(&self, path: &str) {
        self.state().stalled.remove(Path::new(path));
        self.resume.send_modify(|generation| *generation += 1);
    }

    async fn stall_if_needed(&self, path: &Path) {
        let mut resumed = self.resume.subscribe();
        loop {
            let stalled = self.state().stalled.contains(path);
            if !stalled || resumed.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn lstat(&self, path: &Path) -> io::Result<Lstat> {
        self.stall_if_needed(path).await;
        let state = self.state();
        state.check(path)?;
        let node = state
            .nodes
            .get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{path:?}")))?;
        Ok(Lstat {
            node_type: node.node_type,
            metadata: EntryMetadata {
                ino: node.ctime as u64,
                nlink: 1,
                size: node.size,
                ctime: Timestamp::new(node.ctime, 0),
                mtime: Timestamp::new(node.ctime, 0),
                ..Default::default()
            },
        })
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>> {
        self.stall_if_needed(path).await;
        let state = self.state();
        state.check(path)?;
        match state.nodes.get(path) {
            Some(node) if node.node_type == NodeType::Dir => Ok(state
                .nodes
                .keys()
                .filter(|p| p.parent() == Some(path))
                .filter_map(|p| p.file_name().map(OsString::from))
                .collect()),
            Some(_) => Err(io::Error::other(format!("not a directory: {path:?}"))),
            None => Err(io::Error::new(io::ErrorKind::NotFound, format!("{path:?}"))),
        }
    }

    async fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        self.stall_if_needed(path).await;
        let state = self.state();
        state.check(path)?;
        state
            .nodes
            .get(path)
            .and_then(|node| node.target.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("{path:?}")))
    }
}
