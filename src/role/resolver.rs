//! Pure role resolution.

use std::path::{Component, Path, PathBuf};

use super::declared::RoleOverride;
use super::rules::{classify, PathMatch};
use crate::models::{Role, RoleInfo, RoleSource};
use crate::workspace::normalize;

/// Classify `current_dir` relative to `town_root`, honoring a declared
/// override.
///
/// Reads neither the environment nor the filesystem. A directory outside
/// the town classifies as [`Role::Unknown`]. With an override, the declared
/// role is authoritative and `mismatch` records disagreement with a known
/// path-derived role.
#[must_use]
pub fn resolve_role(
    town_root: &Path,
    current_dir: &Path,
    declared: Option<&RoleOverride>,
) -> RoleInfo {
    let from_path = detect_from_path(town_root, current_dir);

    let (role, rig, worker, source, mismatch, env_incomplete) = match declared {
        None => (
            from_path.role,
            from_path.rig.clone(),
            from_path.worker.clone(),
            RoleSource::Cwd,
            false,
            false,
        ),
        Some(declared) => {
            let parsed = declared.resolve();
            let mut rig = parsed.rig;
            let mut worker = parsed.worker.filter(|_| parsed.role.is_worker());
            let mut incomplete = false;

            if parsed.role.needs_rig() && rig.is_none() && from_path.rig.is_some() {
                rig.clone_from(&from_path.rig);
                incomplete = true;
            }
            if parsed.role.is_worker() && worker.is_none() && from_path.worker.is_some() {
                worker.clone_from(&from_path.worker);
                incomplete = true;
            }

            let mismatch = from_path.role != Role::Unknown && from_path.role != parsed.role;
            (parsed.role, rig, worker, RoleSource::Env, mismatch, incomplete)
        }
    };

    RoleInfo {
        home: role_home(town_root, role, rig.as_deref(), worker.as_deref()),
        role,
        rig,
        worker_name: worker,
        source,
        mismatch,
        cwd_role: from_path.role,
        env_role: declared.map(|d| d.declared.clone()),
        env_incomplete,
        town_root: town_root.to_path_buf(),
        work_dir: current_dir.to_path_buf(),
    }
}

/// Classify `dir` from its position under `town_root` alone.
#[must_use]
pub fn detect_from_path(town_root: &Path, dir: &Path) -> PathMatch {
    let root = normalize(town_root);
    let dir = normalize(dir);
    let Ok(relative) = dir.strip_prefix(&root) else {
        return classify_outside();
    };

    let segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
    classify(&segments)
}

fn classify_outside() -> PathMatch {
    PathMatch {
        role: Role::Unknown,
        rig: None,
        worker: None,
    }
}

/// Canonical home directory of `role`.
///
/// `None` for [`Role::Unknown`] and when a required rig or worker name is
/// missing.
#[must_use]
pub fn role_home(
    town_root: &Path,
    role: Role,
    rig: Option<&str>,
    worker: Option<&str>,
) -> Option<PathBuf> {
    let home = match (role, rig, worker) {
        (Role::Mayor, _, _) => town_root.join("mayor"),
        (Role::Deacon, _, _) => town_root.join("deacon"),
        (Role::Boot, _, _) => town_root.join("deacon").join("dogs").join("boot"),
        (Role::Witness, Some(rig), _) => town_root.join(rig).join("witness"),
        (Role::Refinery, Some(rig), _) => town_root.join(rig).join("refinery").join("rig"),
        (Role::Polecat, Some(rig), Some(name)) => {
            town_root.join(rig).join("polecats").join(name).join("rig")
        }
        (Role::Crew, Some(rig), Some(name)) => {
            town_root.join(rig).join("crew").join(name).join("rig")
        }
        _ => return None,
    };
    Some(home)
}
