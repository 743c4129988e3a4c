//! Lock file for a single worker identity directory.
//!
//! The record file is only ever replaced by an atomic rename of a fully
//! written temp file, and every read-decide-write sequence runs while an
//! exclusive OS lock is held on a sidecar guard file. Two processes racing
//! on the same stale lock therefore cannot both win: the loser either fails
//! to take the guard or sees the winner's live record.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fd_lock::RwLock;
use tempfile::NamedTempFile;
use tracing::{debug, info, info_span, warn};

use super::liveness::current_pid;
use super::{LockCollision, LockStatus};
use crate::config::IdentityConfig;
use crate::models::LockRecord;
use crate::{AppError, Result};

/// Suffix of the sidecar file guarding lock transitions.
const GUARD_SUFFIX: &str = "guard";

/// Advisory lock on one worker identity.
#[derive(Debug, Clone)]
pub struct IdentityLock {
    identity_dir: PathBuf,
    runtime_dir: PathBuf,
    lock_path: PathBuf,
    guard_path: PathBuf,
}

impl IdentityLock {
    /// Lock for `identity_dir`, using file names from `config`.
    #[must_use]
    pub fn new(identity_dir: impl Into<PathBuf>, config: &IdentityConfig) -> Self {
        let identity_dir = identity_dir.into();
        let runtime_dir = config.runtime_dir_in(&identity_dir);
        let lock_path = config.lock_path_in(&identity_dir);
        let guard_path = runtime_dir.join(format!("{}.{GUARD_SUFFIX}", config.lock_file));
        Self {
            identity_dir,
            runtime_dir,
            lock_path,
            guard_path,
        }
    }

    /// Worker identity directory.
    #[must_use]
    pub fn identity_dir(&self) -> &Path {
        &self.identity_dir
    }

    /// Lock file path.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Read the current record without modifying it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when no lock file exists,
    /// `AppError::InvalidLock` when it cannot be parsed, and
    /// `AppError::Io` on other read failures.
    pub fn read(&self) -> Result<LockRecord> {
        let raw = match fs::read(&self.lock_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(format!(
                    "no lock at {}",
                    self.lock_path.display()
                )));
            }
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to read lock {}: {err}",
                    self.lock_path.display()
                )));
            }
        };

        serde_json::from_slice(&raw).map_err(|err| {
            AppError::InvalidLock(format!("{}: {err}", self.lock_path.display()))
        })
    }

    /// Claim the identity for the calling process.
    ///
    /// Succeeds when the identity is unlocked, held by a dead process,
    /// holds an unreadable record, or is already held by this process
    /// (the record is refreshed). Makes exactly one attempt.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Locked` if another live process holds the
    /// identity or is claiming it right now, and `AppError::Io` if the
    /// lock file cannot be written.
    pub fn acquire(&self, session_id: &str) -> Result<LockRecord> {
        let span = info_span!(
            "acquire_identity_lock",
            identity = %self.identity_dir.display()
        );
        let _guard = span.enter();

        self.exclusive(|| {
            match self.read() {
                Ok(existing) if existing.is_held_by_current_process() => {
                    debug!("refreshing lock already held by this process");
                }
                Ok(existing) if existing.is_stale() => {
                    info!(
                        stale_pid = existing.pid,
                        stale_session = %existing.session_id,
                        "reclaiming stale identity lock"
                    );
                }
                Ok(existing) => return Err(self.collision(Some(existing))),
                Err(AppError::NotFound(_)) => {}
                Err(AppError::InvalidLock(reason)) => {
                    warn!(%reason, "overwriting unreadable identity lock");
                }
                Err(err) => return Err(err),
            }

            let record = LockRecord::new(current_pid(), session_id, hostname());
            self.write(&record)?;
            info!(pid = record.pid, session = %record.session_id, "identity lock acquired");
            Ok(record)
        })
    }

    /// Release the lock if this process holds it.
    ///
    /// Absent, stale, and unreadable locks are removed as well.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Locked` if another live process holds the lock,
    /// and `AppError::Io` if the file cannot be removed.
    pub fn release(&self) -> Result<()> {
        if !self.lock_path.exists() {
            return Ok(());
        }

        self.exclusive(|| match self.read() {
            Err(AppError::NotFound(_)) => Ok(()),
            Ok(record) if !record.is_held_by_current_process() && !record.is_stale() => {
                Err(self.collision(Some(record)))
            }
            Ok(_) | Err(AppError::InvalidLock(_)) => self.remove(),
            Err(err) => Err(err),
        })
    }

    /// Remove the lock regardless of who holds it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file exists and cannot be removed.
    pub fn force_release(&self) -> Result<()> {
        warn!(lock = %self.lock_path.display(), "force-releasing identity lock");
        self.remove()
    }

    /// Verify no other live process holds the identity.
    ///
    /// Stale locks are removed on a best-effort basis.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Locked` if another live process holds the lock,
    /// or the read error for unreadable lock files.
    pub fn check(&self) -> Result<()> {
        match self.read() {
            Err(AppError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
            Ok(record) if record.is_held_by_current_process() => Ok(()),
            Ok(record) if record.is_stale() => {
                if let Err(err) = self.release() {
                    debug!(%err, "stale lock cleanup skipped");
                }
                Ok(())
            }
            Ok(record) => Err(self.collision(Some(record))),
        }
    }

    /// Classify the current lock file.
    #[must_use]
    pub fn status(&self) -> LockStatus {
        match self.read() {
            Err(AppError::NotFound(_)) => LockStatus::Unlocked,
            Err(err) => LockStatus::Invalid(err.to_string()),
            Ok(record) if record.is_stale() => LockStatus::Stale(record),
            Ok(record) if record.is_held_by_current_process() => LockStatus::HeldBySelf(record),
            Ok(record) => LockStatus::Held(record),
        }
    }

    fn collision(&self, holder: Option<LockRecord>) -> AppError {
        AppError::Locked(Box::new(LockCollision {
            identity_dir: self.identity_dir.clone(),
            lock_path: self.lock_path.clone(),
            holder,
        }))
    }

    /// Run `op` while holding the guard file lock. Never waits: a guard
    /// held by another process means that process is mid-claim.
    fn exclusive<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        fs::create_dir_all(&self.runtime_dir).map_err(|err| {
            AppError::Io(format!(
                "failed to create lock directory {}: {err}",
                self.runtime_dir.display()
            ))
        })?;

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.guard_path)
            .map_err(|err| {
                AppError::Io(format!(
                    "failed to open lock guard {}: {err}",
                    self.guard_path.display()
                ))
            })?;

        let mut guard: RwLock<File> = RwLock::new(file);
        let _held = match guard.try_write() {
            Ok(held) => held,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                debug!("lock guard is held by another process");
                return Err(self.collision(self.read().ok()));
            }
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to lock guard {}: {err}",
                    self.guard_path.display()
                )));
            }
        };

        op()
    }

    /// Atomically replace the lock file with `record`.
    fn write(&self, record: &LockRecord) -> Result<()> {
        let body = serde_json::to_vec_pretty(record)
            .map_err(|err| AppError::Io(format!("failed to serialize lock record: {err}")))?;

        let mut tmp = NamedTempFile::new_in(&self.runtime_dir)
            .map_err(|err| AppError::Io(format!("failed to create temporary lock file: {err}")))?;
        tmp.write_all(&body)
            .map_err(|err| AppError::Io(format!("failed to write temporary lock file: {err}")))?;
        tmp.persist(&self.lock_path).map_err(|err| {
            AppError::Io(format!(
                "failed to persist lock {}: {err}",
                self.lock_path.display()
            ))
        })?;
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::Io(format!(
                "failed to remove lock {}: {err}",
                self.lock_path.display()
            ))),
        }
    }
}

#[cfg(unix)]
fn hostname() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
}

#[cfg(not(unix))]
fn hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}
