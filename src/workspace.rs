//! Town root discovery.
//!
//! The town root is the directory containing `mayor/town.json` (primary
//! marker) or, failing that, the outermost directory containing a `mayor/`
//! folder. Rigs carry their own `mayor/` folders, so the outermost match
//! is the one that counts.

use std::env;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::config::IdentityConfig;
use crate::{AppError, Result};

/// Primary marker, relative to the town root.
pub const PRIMARY_MARKER: &str = "mayor/town.json";

/// Secondary marker directory, relative to the town root.
pub const SECONDARY_MARKER: &str = "mayor";

/// Path segments that mark a worker worktree. Worktrees may contain their
/// own copy of the primary marker, so the search keeps going past them.
const WORKTREE_SEGMENTS: [&str; 2] = ["polecats", "crew"];

/// Town root and the directory the process runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TownLocation {
    /// Town root.
    pub root: PathBuf,
    /// Working directory of the process.
    pub work_dir: PathBuf,
}

/// Resolve `.` and `..` without touching the filesystem.
///
/// `..` at the root is dropped, matching how the kernel treats `/..`.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let at_anchor = matches!(
                    normalized.components().next_back(),
                    None | Some(Component::RootDir | Component::Prefix(_))
                );
                if !at_anchor {
                    normalized.pop();
                }
            }
            Component::RootDir | Component::Prefix(_) | Component::Normal(_) => {
                normalized.push(component.as_os_str());
            }
        }
    }
    normalized
}

/// Walk upward from `start` looking for the town root.
///
/// Returns `Ok(None)` when no marker is found before the filesystem root.
///
/// # Errors
///
/// Returns `AppError::Workspace` if `start` is relative and the current
/// directory cannot be read.
pub fn find(start: &Path) -> Result<Option<PathBuf>> {
    let absolute = if start.is_absolute() {
        start.to_path_buf()
    } else {
        env::current_dir()
            .map_err(|err| AppError::Workspace(format!("cannot read current directory: {err}")))?
            .join(start)
    };
    let absolute = absolute
        .canonicalize()
        .unwrap_or_else(|_| normalize(&absolute));

    let in_worktree = absolute.components().any(|c| match c {
        Component::Normal(part) => WORKTREE_SEGMENTS.iter().any(|s| part == *s),
        _ => false,
    });

    let mut primary: Option<&Path> = None;
    let mut secondary: Option<&Path> = None;
    for dir in absolute.ancestors() {
        if dir.join(PRIMARY_MARKER).is_file() {
            if !in_worktree {
                debug!(root = %dir.display(), "town root found by primary marker");
                return Ok(Some(dir.to_path_buf()));
            }
            primary = Some(dir);
        }
        if dir.join(SECONDARY_MARKER).is_dir() {
            secondary = Some(dir);
        }
    }

    let found = primary.or(secondary).map(Path::to_path_buf);
    if let Some(root) = &found {
        debug!(root = %root.display(), in_worktree, "town root found by outermost marker");
    }
    Ok(found)
}

/// Locate the town from the current directory.
///
/// When the current directory cannot be read (deleted worktree), the
/// configured fallback variable names the root.
///
/// # Errors
///
/// Returns `AppError::Workspace` when no town root can be determined.
pub fn find_from_cwd(config: &IdentityConfig) -> Result<TownLocation> {
    let work_dir = match env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            let fallback = env::var(&config.env.town_root)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    AppError::Workspace(format!(
                        "cannot read current directory ({err}) and {} is not set",
                        config.env.town_root
                    ))
                })?;
            debug!(root = %fallback, "current directory unreadable, using fallback root");
            let root = PathBuf::from(fallback);
            return Ok(TownLocation {
                work_dir: root.clone(),
                root,
            });
        }
    };

    let root = find(&work_dir)?.ok_or_else(|| {
        AppError::Workspace(format!(
            "{} is not inside a town (no {PRIMARY_MARKER} or {SECONDARY_MARKER}/ found)",
            work_dir.display()
        ))
    })?;
    let work_dir = work_dir.canonicalize().unwrap_or(work_dir);
    Ok(TownLocation { root, work_dir })
}
