//! Agent identity locking.
//!
//! Prevents two agent processes from claiming the same worker identity.
//! Each worker directory holds `<runtime_dir>/agent.lock` naming the owning
//! PID, session, and acquisition time. A lock whose PID is dead is stale and
//! is reclaimed by the next [`IdentityLock::acquire`].

pub mod identity;
pub mod liveness;
pub mod scan;

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use chrono::SecondsFormat;

use crate::models::LockRecord;

pub use identity::IdentityLock;
pub use scan::{
    clean_stale_locks, detect_collisions, find_all_locks, LockFinding, SessionProbe, TmuxSessions,
};

/// Details of a failed claim, reported to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockCollision {
    /// Worker identity directory.
    pub identity_dir: PathBuf,
    /// Lock file path.
    pub lock_path: PathBuf,
    /// Current holder; `None` while another process is mid-claim.
    pub holder: Option<LockRecord>,
}

impl LockCollision {
    /// Operator-facing steps for resolving the collision.
    #[must_use]
    pub fn remediation(&self) -> Vec<String> {
        vec![
            "Find the other session and close it, OR".to_owned(),
            "Run: town-identity lock clean (removes stale locks)".to_owned(),
            format!(
                "If the holder is gone: town-identity lock release --force --dir {}",
                self.identity_dir.display()
            ),
        ]
    }
}

impl Display for LockCollision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.holder {
            Some(holder) => write!(
                f,
                "{} is held by PID {} (session: {}, acquired: {})",
                self.identity_dir.display(),
                holder.pid,
                holder.session_id,
                holder.acquired_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            None => write!(
                f,
                "{} is being claimed by another process",
                self.identity_dir.display()
            ),
        }
    }
}

/// Point-in-time view of a lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    /// No lock file.
    Unlocked,
    /// Held by the calling process.
    HeldBySelf(LockRecord),
    /// Held by another live process.
    Held(LockRecord),
    /// Owner process is dead.
    Stale(LockRecord),
    /// Lock file could not be read or parsed.
    Invalid(String),
}

impl Display for LockStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unlocked => f.write_str("unlocked"),
            Self::HeldBySelf(_) => f.write_str("locked (by us)"),
            Self::Held(record) => write!(
                f,
                "locked by PID {} (session: {})",
                record.pid, record.session_id
            ),
            Self::Stale(record) => write!(f, "stale (dead PID {})", record.pid),
            Self::Invalid(reason) => write!(f, "error: {reason}"),
        }
    }
}
