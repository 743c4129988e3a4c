//! Agent role model.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role an agent process plays inside the town.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Town-wide coordinator; home is the town root or `mayor/`.
    Mayor,
    /// Background supervisor.
    Deacon,
    /// Deacon's watchdog, living under `deacon/dogs/boot`.
    Boot,
    /// Per-rig worker lifecycle manager.
    Witness,
    /// Per-rig merge queue processor.
    Refinery,
    /// Ephemeral worker with its own worktree.
    Polecat,
    /// Persistent worker with its own worktree.
    Crew,
    /// Directory matches no known layout.
    Unknown,
}

impl Role {
    /// All known roles, in listing order.
    pub const KNOWN: [Role; 7] = [
        Role::Mayor,
        Role::Deacon,
        Role::Boot,
        Role::Witness,
        Role::Refinery,
        Role::Polecat,
        Role::Crew,
    ];

    /// Lowercase name as used in paths, env vars, and JSON.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mayor => "mayor",
            Self::Deacon => "deacon",
            Self::Boot => "boot",
            Self::Witness => "witness",
            Self::Refinery => "refinery",
            Self::Polecat => "polecat",
            Self::Crew => "crew",
            Self::Unknown => "unknown",
        }
    }

    /// Worker roles need a file lock; their uniqueness is not supervised.
    #[must_use]
    pub fn is_worker(self) -> bool {
        matches!(self, Self::Polecat | Self::Crew)
    }

    /// Singleton roles whose uniqueness is guaranteed by the supervisor.
    #[must_use]
    pub fn is_infrastructure(self) -> bool {
        matches!(
            self,
            Self::Mayor | Self::Deacon | Self::Boot | Self::Witness | Self::Refinery
        )
    }

    /// Roles scoped to a single rig.
    #[must_use]
    pub fn needs_rig(self) -> bool {
        matches!(
            self,
            Self::Witness | Self::Refinery | Self::Polecat | Self::Crew
        )
    }

    /// Roles that run patrol loops and tag their sessions for filtering.
    #[must_use]
    pub fn patrols(self) -> bool {
        matches!(self, Self::Witness | Self::Refinery | Self::Deacon)
    }

    /// One-line description for `role list`.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Mayor => "Global coordinator at mayor/",
            Self::Deacon => "Background supervisor daemon",
            Self::Boot => "Deacon watchdog at deacon/dogs/boot/",
            Self::Witness => "Per-rig polecat lifecycle manager",
            Self::Refinery => "Per-rig merge queue processor",
            Self::Polecat => "Ephemeral worker with own worktree",
            Self::Crew => "Persistent worker with own worktree",
            Self::Unknown => "Unrecognized location",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "mayor" => Ok(Self::Mayor),
            "deacon" => Ok(Self::Deacon),
            "boot" => Ok(Self::Boot),
            "witness" => Ok(Self::Witness),
            "refinery" => Ok(Self::Refinery),
            "polecat" | "polecats" => Ok(Self::Polecat),
            "crew" => Ok(Self::Crew),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

/// Where the authoritative role came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoleSource {
    /// Derived from the working directory.
    Cwd,
    /// Declared through the environment.
    Env,
}

impl Display for RoleSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cwd => f.write_str("cwd"),
            Self::Env => f.write_str("env"),
        }
    }
}

/// Role classification for one process invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleInfo {
    /// Authoritative role.
    pub role: Role,
    /// Rig name for rig-scoped locations.
    pub rig: Option<String>,
    /// Polecat or crew member name.
    pub worker_name: Option<String>,
    /// Origin of `role`.
    pub source: RoleSource,
    /// Canonical home directory of `role`.
    pub home: Option<PathBuf>,
    /// Declared role disagrees with the path-derived role.
    pub mismatch: bool,
    /// Role derived from the working directory alone.
    pub cwd_role: Role,
    /// Raw declared role, if any.
    pub env_role: Option<String>,
    /// Declared role lacked rig or worker name; filled from the path.
    pub env_incomplete: bool,
    /// Town root the path was resolved against.
    pub town_root: PathBuf,
    /// Directory that was classified.
    pub work_dir: PathBuf,
}

impl RoleInfo {
    /// Actor identity used for attribution and discovery.
    ///
    /// `None` for [`Role::Unknown`].
    #[must_use]
    pub fn actor(&self) -> Option<String> {
        let rig = self.rig.as_deref();
        let worker = self.worker_name.as_deref();
        let actor = match self.role {
            Role::Mayor => "mayor".to_owned(),
            Role::Deacon => "deacon".to_owned(),
            Role::Boot => "boot".to_owned(),
            Role::Witness => rig.map_or_else(|| "witness".to_owned(), |r| format!("{r}/witness")),
            Role::Refinery => {
                rig.map_or_else(|| "refinery".to_owned(), |r| format!("{r}/refinery"))
            }
            Role::Polecat => match (rig, worker) {
                (Some(r), Some(w)) => format!("{r}/polecats/{w}"),
                _ => "polecat".to_owned(),
            },
            Role::Crew => match (rig, worker) {
                (Some(r), Some(w)) => format!("{r}/crew/{w}"),
                _ => "crew".to_owned(),
            },
            Role::Unknown => return None,
        };
        Some(actor)
    }

    /// Directory keyed by the worker identity, where the lock lives.
    ///
    /// `None` for non-worker roles and for workers missing rig or name.
    #[must_use]
    pub fn identity_dir(&self) -> Option<PathBuf> {
        worker_identity_dir(
            &self.town_root,
            self.role,
            self.rig.as_deref(),
            self.worker_name.as_deref(),
        )
    }
}

/// `<root>/<rig>/polecats/<name>` or `<root>/<rig>/crew/<name>`.
#[must_use]
pub fn worker_identity_dir(
    town_root: &Path,
    role: Role,
    rig: Option<&str>,
    worker: Option<&str>,
) -> Option<PathBuf> {
    let kind = match role {
        Role::Polecat => "polecats",
        Role::Crew => "crew",
        _ => return None,
    };
    match (rig, worker) {
        (Some(rig), Some(name)) => Some(town_root.join(rig).join(kind).join(name)),
        _ => None,
    }
}
