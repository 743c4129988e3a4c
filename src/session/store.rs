//! Per-directory session record persistence.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::config::IdentityConfig;
use crate::models::SessionRecord;
use crate::{AppError, Result};

/// Write `token` to `<dir>/<runtime_dir>/<session_file>`, replacing any
/// previous record atomically.
///
/// # Errors
///
/// Returns `AppError::Io` if the runtime directory or file cannot be
/// written.
pub fn persist_session(dir: &Path, token: &str, config: &IdentityConfig) -> Result<PathBuf> {
    let runtime_dir = config.runtime_dir_in(dir);
    fs::create_dir_all(&runtime_dir).map_err(|err| {
        AppError::Io(format!(
            "failed to create {}: {err}",
            runtime_dir.display()
        ))
    })?;

    let path = config.session_path_in(dir);
    let body = SessionRecord::new(token).to_file_contents();

    let mut tmp = NamedTempFile::new_in(&runtime_dir)
        .map_err(|err| AppError::Io(format!("failed to create temporary session file: {err}")))?;
    tmp.write_all(body.as_bytes())
        .map_err(|err| AppError::Io(format!("failed to write temporary session file: {err}")))?;
    tmp.persist(&path)
        .map_err(|err| AppError::Io(format!("failed to persist {}: {err}", path.display())))?;

    debug!(path = %path.display(), "session record written");
    Ok(path)
}

/// Read the session record in `dir`.
///
/// # Errors
///
/// Returns `AppError::NotFound` if no usable record exists and
/// `AppError::Io` on read failures.
pub fn read_session(dir: &Path, config: &IdentityConfig) -> Result<SessionRecord> {
    let path = config.session_path_in(dir);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!(
                "no session record at {}",
                path.display()
            )));
        }
        Err(err) => {
            return Err(AppError::Io(format!(
                "failed to read {}: {err}",
                path.display()
            )));
        }
    };

    SessionRecord::parse(&contents)
        .ok_or_else(|| AppError::NotFound(format!("empty session record at {}", path.display())))
}

/// Persist `token` at the town root and, when different, the working
/// directory. Failures are logged and skipped.
///
/// Returns the paths written.
#[must_use]
pub fn persist_everywhere(
    town_root: &Path,
    work_dir: &Path,
    token: &str,
    config: &IdentityConfig,
) -> Vec<PathBuf> {
    let mut targets = vec![town_root];
    if work_dir != town_root {
        targets.push(work_dir);
    }

    targets
        .into_iter()
        .filter_map(|dir| match persist_session(dir, token, config) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(dir = %dir.display(), %err, "session record not persisted");
                None
            }
        })
        .collect()
}
