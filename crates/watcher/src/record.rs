//! Normalized per-entry stat records
//!
//! A [`StatRecord`] is the snapshot the watcher keeps for every path it has
//! visited. The kind of entry decides which optional data is present:
//! directories carry their child names, symlinks their destination.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// A point in time relative to the Unix epoch, at nanosecond precision
///
/// Serializes as epoch milliseconds (`ms`) plus an RFC 3339 date (`date`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    secs: i64,
    nanos: u32,
}

impl Timestamp {
    /// The Unix epoch
    pub const EPOCH: Self = Self { secs: 0, nanos: 0 };

    /// Create a timestamp from seconds and nanoseconds since the epoch.
    ///
    /// Nanoseconds outside `0..1_000_000_000` are carried into the seconds.
    pub fn new(secs: i64, nanos: i64) -> Self {
        let secs = secs + nanos.div_euclid(1_000_000_000);
        let nanos = nanos.rem_euclid(1_000_000_000) as u32;
        Self { secs, nanos }
    }

    /// Milliseconds since the epoch, with sub-millisecond precision as the fraction
    pub fn as_millis(&self) -> f64 {
        self.secs as f64 * 1_000.0 + f64::from(self.nanos) / 1_000_000.0
    }

    /// Structured UTC date
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.secs, self.nanos).unwrap_or_default()
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Timestamp", 2)?;
        state.serialize_field("ms", &self.as_millis())?;
        state.serialize_field(
            "date",
            &self
                .to_datetime()
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
        )?;
        state.end()
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Self::new(d.as_secs() as i64, i64::from(d.subsec_nanos())),
            Err(e) => {
                let d = e.duration();
                Self::new(-(d.as_secs() as i64), -i64::from(d.subsec_nanos()))
            }
        }
    }
}

/// Raw metadata as reported by a non-link-following stat
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct EntryMetadata {
    /// Device containing the entry
    pub dev: u64,
    /// Inode number
    pub ino: u64,
    /// File type and permission bits
    pub mode: u32,
    /// Number of hard links
    pub nlink: u64,
    /// Owner user id
    pub uid: u32,
    /// Owner group id
    pub gid: u32,
    /// Device number, for special files
    pub rdev: u64,
    /// Size in bytes
    pub size: u64,
    /// Preferred I/O block size
    pub blksize: u64,
    /// Number of 512-byte blocks allocated
    pub blocks: u64,
    /// Last access
    pub atime: Timestamp,
    /// Last modification of the contents
    pub mtime: Timestamp,
    /// Last change of the inode
    pub ctime: Timestamp,
    /// Creation, or the epoch where the platform does not report it
    pub birthtime: Timestamp,
}

/// What kind of entry a record describes, with the data specific to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntryKind {
    /// Block device
    Block,
    /// Character device
    Char,
    /// Directory, with the names of its immediate children
    Dir { children: BTreeSet<OsString> },
    /// Named pipe
    Pipe,
    /// Regular file
    File,
    /// Unix domain socket
    Socket,
    /// Symbolic link, with its unresolved destination
    Symlink { target: PathBuf },
}

impl EntryKind {
    /// Lowercase name of the kind
    pub fn name(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Char => "char",
            Self::Dir { .. } => "dir",
            Self::Pipe => "pipe",
            Self::File => "file",
            Self::Socket => "socket",
            Self::Symlink { .. } => "symlink",
        }
    }
}

/// Snapshot of one filesystem entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatRecord {
    /// Entry kind and kind-specific data
    #[serde(flatten)]
    pub kind: EntryKind,
    /// Stat metadata
    pub metadata: EntryMetadata,
    /// Fields merged in by augmentations during the tick that produced this record
    pub extensions: Map<String, Value>,
}

impl StatRecord {
    /// Create a record with no extensions
    pub fn new(kind: EntryKind, metadata: EntryMetadata) -> Self {
        Self {
            kind,
            metadata,
            extensions: Map::new(),
        }
    }

    /// Lowercase name of the entry kind
    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    /// Child names, present only for directories
    pub fn children(&self) -> Option<&BTreeSet<OsString>> {
        match &self.kind {
            EntryKind::Dir { children } => Some(children),
            _ => None,
        }
    }

    /// Link destination, present only for symlinks
    pub fn link_target(&self) -> Option<&Path> {
        match &self.kind {
            EntryKind::Symlink { target } => Some(target),
            _ => None,
        }
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.metadata.size
    }

    /// Whether this record is at least as recent as an observed change time
    pub fn is_current(&self, observed_ctime: Timestamp) -> bool {
        self.metadata.ctime >= observed_ctime
    }

    /// Merge fields onto the extensions, overwriting existing keys
    pub fn extend(&mut self, fields: Map<String, Value>) {
        self.extensions.extend(fields);
    }
}
