//! Whole-town lock inspection: discovery, stale cleanup, collision report.

use std::collections::{BTreeMap, HashSet};
use std::fmt::{Display, Formatter};
use std::fs;
use std::hash::BuildHasher;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use super::IdentityLock;
use crate::config::IdentityConfig;
use crate::models::LockRecord;
use crate::{AppError, Result};

/// Source of terminal multiplexer sessions considered live.
pub trait SessionProbe {
    /// Names and ids of every live session.
    fn live_sessions(&self) -> HashSet<String>;
}

/// Asks the local tmux server for its sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TmuxSessions;

impl SessionProbe for TmuxSessions {
    fn live_sessions(&self) -> HashSet<String> {
        let output = Command::new("tmux")
            .args(["list-sessions", "-F", "#{session_name}:#{session_id}"])
            .output();
        match output {
            Ok(out) if out.status.success() => {
                parse_tmux_sessions(&String::from_utf8_lossy(&out.stdout))
            }
            Ok(out) => {
                debug!(status = %out.status, "tmux list-sessions failed, assuming no sessions");
                HashSet::new()
            }
            Err(err) => {
                debug!(%err, "tmux unavailable, assuming no sessions");
                HashSet::new()
            }
        }
    }
}

/// Parse `name:$id` lines into the set of names and ids.
///
/// Ids are recorded both as `$N` and `%N`, since lock records may carry
/// either a session or a pane form.
#[must_use]
pub fn parse_tmux_sessions(output: &str) -> HashSet<String> {
    let mut live = HashSet::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((name, id)) = line.rsplit_once(':') else {
            live.insert(line.to_owned());
            continue;
        };
        if !name.is_empty() {
            live.insert(name.to_owned());
        }
        if let Some(num) = id.strip_prefix('$') {
            live.insert(format!("${num}"));
            live.insert(format!("%{num}"));
        } else if !id.is_empty() {
            live.insert(id.to_owned());
        }
    }
    live
}

/// Every readable identity lock under `root`, keyed by identity directory.
///
/// Unreadable or corrupt lock files are skipped with a warning, and matches
/// reached through a symbolic link below `root` are ignored.
///
/// # Errors
///
/// Returns `AppError::Workspace` if the search pattern cannot be built.
pub fn find_all_locks(
    root: &Path,
    config: &IdentityConfig,
) -> Result<BTreeMap<PathBuf, LockRecord>> {
    let pattern = format!(
        "{}/**/{}/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        glob::Pattern::escape(&config.runtime_dir),
        glob::Pattern::escape(&config.lock_file),
    );
    let paths = glob::glob(&pattern)
        .map_err(|err| AppError::Workspace(format!("invalid lock search pattern: {err}")))?;

    let mut locks = BTreeMap::new();
    for entry in paths {
        let lock_path = match entry {
            Ok(path) => path,
            Err(err) => {
                debug!(%err, "skipping unreadable path during lock scan");
                continue;
            }
        };
        if crosses_symlink(root, &lock_path) {
            debug!(lock = %lock_path.display(), "skipping lock reached through a symlink");
            continue;
        }
        let Some(identity_dir) = lock_path.parent().and_then(Path::parent) else {
            continue;
        };
        match IdentityLock::new(identity_dir, config).read() {
            Ok(record) => {
                locks.insert(identity_dir.to_path_buf(), record);
            }
            Err(err) => warn!(lock = %lock_path.display(), %err, "skipping lock file"),
        }
    }
    Ok(locks)
}

/// Whether any component of `path` below `root` is a symbolic link.
///
/// The scan does not follow links, so one lock file is reported once under
/// its real location.
fn crosses_symlink(root: &Path, path: &Path) -> bool {
    path.ancestors()
        .take_while(|dir| *dir != root && dir.starts_with(root))
        .any(|dir| {
            fs::symlink_metadata(dir).is_ok_and(|meta| meta.file_type().is_symlink())
        })
}

/// Remove locks whose PID is dead and whose session is not live.
///
/// A dead PID with a live session usually means the agent restarted under
/// the same session and is about to reclaim its identity, so such locks
/// are left alone. Returns the number of locks removed.
///
/// # Errors
///
/// Returns errors from [`find_all_locks`].
pub fn clean_stale_locks(
    root: &Path,
    config: &IdentityConfig,
    probe: &dyn SessionProbe,
) -> Result<usize> {
    let live = probe.live_sessions();
    let mut cleaned = 0;
    for (identity_dir, record) in find_all_locks(root, config)? {
        if !record.is_stale() {
            continue;
        }
        if !record.session_id.is_empty() && live.contains(&record.session_id) {
            debug!(
                identity = %identity_dir.display(),
                session = %record.session_id,
                "dead PID but session still live, keeping lock"
            );
            continue;
        }
        match IdentityLock::new(&identity_dir, config).force_release() {
            Ok(()) => {
                info!(identity = %identity_dir.display(), pid = record.pid, "stale lock removed");
                cleaned += 1;
            }
            Err(err) => warn!(identity = %identity_dir.display(), %err, "stale lock not removed"),
        }
    }
    Ok(cleaned)
}

/// A lock that needs operator attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockFinding {
    /// Owner PID is dead.
    Stale {
        /// Worker identity directory.
        identity_dir: PathBuf,
        /// Lock contents.
        record: LockRecord,
    },
    /// Owner PID is alive but its session no longer exists.
    Orphaned {
        /// Worker identity directory.
        identity_dir: PathBuf,
        /// Lock contents.
        record: LockRecord,
    },
}

impl LockFinding {
    /// Identity directory the finding is about.
    #[must_use]
    pub fn identity_dir(&self) -> &Path {
        match self {
            Self::Stale { identity_dir, .. } | Self::Orphaned { identity_dir, .. } => identity_dir,
        }
    }
}

impl Display for LockFinding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stale {
                identity_dir,
                record,
            } => write!(
                f,
                "stale lock in {} (dead PID {}, session {})",
                identity_dir.display(),
                record.pid,
                record.session_id
            ),
            Self::Orphaned {
                identity_dir,
                record,
            } => write!(
                f,
                "orphaned lock in {} (session {} not found, PID {} still alive)",
                identity_dir.display(),
                record.session_id,
                record.pid
            ),
        }
    }
}

/// Report stale locks and live-PID locks whose session is gone.
///
/// # Errors
///
/// Returns errors from [`find_all_locks`].
pub fn detect_collisions<S: BuildHasher>(
    root: &Path,
    config: &IdentityConfig,
    live_sessions: &HashSet<String, S>,
) -> Result<Vec<LockFinding>> {
    let findings = find_all_locks(root, config)?
        .into_iter()
        .filter_map(|(identity_dir, record)| {
            if record.is_stale() {
                Some(LockFinding::Stale {
                    identity_dir,
                    record,
                })
            } else if !record.session_id.is_empty() && !live_sessions.contains(&record.session_id)
            {
                Some(LockFinding::Orphaned {
                    identity_dir,
                    record,
                })
            } else {
                None
            }
        })
        .collect();
    Ok(findings)
}
