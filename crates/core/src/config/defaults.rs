//! Default values and functions for configuration

/// Poll interval in milliseconds. Deliberately not a round number so that
/// many watchers started together drift apart instead of polling in lockstep.
pub(crate) const DEFAULT_INTERVAL_MS: u64 = 5007;

/// Mirrors the usual kernel `MAXSYMLINKS`
pub(crate) const DEFAULT_MAX_SYMLINK_HOPS: usize = 40;

pub(crate) const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Prefix for environment variable overrides
pub(crate) const ENV_PREFIX: &str = "STATWATCH";

pub(crate) fn default_persistent() -> bool {
    false
}

pub(crate) fn default_recursive() -> bool {
    false
}

pub(crate) fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

pub(crate) fn default_operation_timeout_ms() -> Option<u64> {
    None
}

pub(crate) fn default_max_symlink_hops() -> usize {
    DEFAULT_MAX_SYMLINK_HOPS
}

pub(crate) fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}
