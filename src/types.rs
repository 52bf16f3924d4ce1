use std::fmt;

use serde::Deserialize;

/// How the scheduler treats a new dispatch of a tag that already has a
/// running instance.
///
/// - `Every`: every dispatch gets its own independent task instance.
/// - `Latest`: the running instance is cancelled at its current suspension
///   point before the new one starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    Every,
    Latest,
}

impl fmt::Display for ConcurrencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyPolicy::Every => f.write_str("every"),
            ConcurrencyPolicy::Latest => f.write_str("latest"),
        }
    }
}

/// API version as reported by the engine, or as required by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Backward-compatible check: `self` (the actual version) satisfies
    /// `required` when its major is newer, or the majors match and the minor
    /// is at least the required one.
    pub fn satisfies(&self, required: &Version) -> bool {
        self.major > required.major
            || (self.major == required.major && self.minor >= required.minor)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Kind of destructive mutation tracked while awaiting confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PendingKind {
    DiskRemoval,
    SnapshotRemoval,
}

/// Bookkeeping entry for an accepted but unconfirmed removal.
///
/// At most one entry exists per `(kind, resource_id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PendingTask {
    pub kind: PendingKind,
    pub resource_id: String,
}

impl PendingTask {
    pub fn new(kind: PendingKind, resource_id: impl Into<String>) -> Self {
        Self {
            kind,
            resource_id: resource_id.into(),
        }
    }
}
