//! Filesystem capability used by the stat walker
//!
//! The watcher never touches the disk directly; it goes through a
//! [`FileSystem`] so that hosts with unusual filesystems (and tests) can
//! supply their own primitives. [`LocalFileSystem`] is the `tokio::fs`
//! backed default.

use crate::record::{EntryMetadata, Timestamp};
use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Entry type as reported by a non-link-following stat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Block,
    Char,
    Dir,
    Pipe,
    File,
    Socket,
    Symlink,
}

impl NodeType {
    /// Classify a std file type; `None` for types the platform cannot name
    pub fn from_file_type(file_type: std::fs::FileType) -> Option<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if file_type.is_block_device() {
                return Some(Self::Block);
            }
            if file_type.is_char_device() {
                return Some(Self::Char);
            }
            if file_type.is_fifo() {
                return Some(Self::Pipe);
            }
            if file_type.is_socket() {
                return Some(Self::Socket);
            }
        }

        if file_type.is_file() {
            Some(Self::File)
        } else if file_type.is_symlink() {
            Some(Self::Symlink)
        } else if file_type.is_dir() {
            Some(Self::Dir)
        } else {
            None
        }
    }
}

/// Result of a non-link-following stat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lstat {
    pub node_type: NodeType,
    pub metadata: EntryMetadata,
}

impl Lstat {
    /// Convert std metadata obtained without following links
    pub fn from_std(metadata: &std::fs::Metadata) -> io::Result<Self> {
        let node_type = NodeType::from_file_type(metadata.file_type()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unrecognized file type {:?}", metadata.file_type()),
            )
        })?;

        Ok(Self {
            node_type,
            metadata: entry_metadata(metadata),
        })
    }
}

#[cfg(unix)]
fn entry_metadata(metadata: &std::fs::Metadata) -> EntryMetadata {
    use std::os::unix::fs::MetadataExt;

    EntryMetadata {
        dev: metadata.dev(),
        ino: metadata.ino(),
        mode: metadata.mode(),
        nlink: metadata.nlink(),
        uid: metadata.uid(),
        gid: metadata.gid(),
        rdev: metadata.rdev(),
        size: metadata.size(),
        blksize: metadata.blksize(),
        blocks: metadata.blocks(),
        atime: Timestamp::new(metadata.atime(), metadata.atime_nsec()),
        mtime: Timestamp::new(metadata.mtime(), metadata.mtime_nsec()),
        ctime: Timestamp::new(metadata.ctime(), metadata.ctime_nsec()),
        birthtime: metadata
            .created()
            .map(Timestamp::from)
            .unwrap_or(Timestamp::EPOCH),
    }
}

#[cfg(not(unix))]
fn entry_metadata(metadata: &std::fs::Metadata) -> EntryMetadata {
    let time = |t: io::Result<std::time::SystemTime>| t.map(Timestamp::from).unwrap_or_default();
    let mtime = time(metadata.modified());

    // No inode change time here; the modification time is the closest stand-in
    EntryMetadata {
        size: metadata.len(),
        atime: time(metadata.accessed()),
        mtime,
        ctime: mtime,
        birthtime: time(metadata.created()),
        ..Default::default()
    }
}

/// Filesystem primitives the walker depends on
#[async_trait]
pub trait FileSystem: Send + Sync + 'static {
    /// Stat `path` without following a trailing symlink
    async fn lstat(&self, path: &Path) -> io::Result<Lstat>;

    /// Names of the immediate children of the directory at `path`
    async fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>>;

    /// Destination of the symlink at `path`, not resolved any further
    async fn read_link(&self, path: &Path) -> io::Result<PathBuf>;
}

/// [`FileSystem`] backed by the local disk through `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn lstat(&self, path: &Path) -> io::Result<Lstat> {
        let metadata = tokio::fs::symlink_metadata(path).await?;
        Lstat::from_std(&metadata)
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name());
        }
        Ok(names)
    }

    async fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        tokio::fs::read_link(path).await
    }
}
