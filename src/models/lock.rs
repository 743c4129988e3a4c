//! Identity lock record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ownership record of one worker identity, stored as JSON in the lock file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockRecord {
    /// PID of the owning process.
    pub pid: i64,
    /// When the lock was written.
    pub acquired_at: DateTime<Utc>,
    /// Session token of the owner.
    #[serde(default)]
    pub session_id: String,
    /// Host the owner ran on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl LockRecord {
    /// Construct a record owned by `pid`, acquired now.
    #[must_use]
    pub fn new(pid: i64, session_id: impl Into<String>, hostname: Option<String>) -> Self {
        Self {
            pid,
            acquired_at: Utc::now(),
            session_id: session_id.into(),
            hostname,
        }
    }

    /// Whether the owning process is gone.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        !crate::lock::liveness::is_alive(self.pid)
    }

    /// Whether the calling process owns this record.
    #[must_use]
    pub fn is_held_by_current_process(&self) -> bool {
        self.pid == crate::lock::liveness::current_pid()
    }
}
