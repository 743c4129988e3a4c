//! Declared role override read from the environment.

use std::env;

use serde::Serialize;

use crate::config::IdentityConfig;
use crate::models::{Role, RoleInfo};

/// Role declared outside the directory layout.
///
/// `rig` and `worker` complete bare declarations such as `crew`; they are
/// ignored when the declared string already names them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleOverride {
    /// Raw declared role string.
    pub declared: String,
    /// Rig name supplied separately.
    pub rig: Option<String>,
    /// Worker name supplied separately.
    pub worker: Option<String>,
}

/// Parsed form of a declared role string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredRole {
    /// Declared role; [`Role::Unknown`] for unrecognized strings.
    pub role: Role,
    /// Rig named in the string.
    pub rig: Option<String>,
    /// Worker named in the string.
    pub worker: Option<String>,
}

impl RoleOverride {
    /// Override declaring `declared` with no separate rig or worker.
    #[must_use]
    pub fn new(declared: impl Into<String>) -> Self {
        Self {
            declared: declared.into(),
            rig: None,
            worker: None,
        }
    }

    /// Set the separately supplied rig.
    #[must_use]
    pub fn with_rig(mut self, rig: impl Into<String>) -> Self {
        self.rig = Some(rig.into());
        self
    }

    /// Set the separately supplied worker name.
    #[must_use]
    pub fn with_worker(mut self, worker: impl Into<String>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    /// Read the override from the configured environment variables.
    ///
    /// Returns `None` when no role is declared. The crew variable wins
    /// over the polecat variable when both are set.
    #[must_use]
    pub fn from_env(config: &IdentityConfig) -> Option<Self> {
        let declared = non_empty_var(&config.env.role)?;
        Some(Self {
            declared,
            rig: non_empty_var(&config.env.rig),
            worker: non_empty_var(&config.env.crew).or_else(|| non_empty_var(&config.env.polecat)),
        })
    }

    /// Parse the declared string and apply the separate rig and worker.
    #[must_use]
    pub fn resolve(&self) -> DeclaredRole {
        let mut parsed = parse_declared_role(&self.declared);
        if parsed.rig.is_none() {
            parsed.rig.clone_from(&self.rig);
        }
        if parsed.worker.is_none() {
            parsed.worker.clone_from(&self.worker);
        }
        parsed
    }
}

/// Parse `mayor`, `<rig>/witness`, `<rig>/polecats/<name>`, `<rig>/<name>` and
/// the other accepted forms.
#[must_use]
pub fn parse_declared_role(raw: &str) -> DeclaredRole {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split('/').collect();

    let declared = |role: Role, rig: Option<&str>, worker: Option<&str>| DeclaredRole {
        role,
        rig: rig.filter(|s| !s.is_empty()).map(str::to_owned),
        worker: worker.filter(|s| !s.is_empty()).map(str::to_owned),
    };

    match parts.as_slice() {
        [single] => declared(single.parse().unwrap_or(Role::Unknown), None, None),
        [rig, "witness", ..] => declared(Role::Witness, Some(*rig), None),
        [rig, "refinery", ..] => declared(Role::Refinery, Some(*rig), None),
        [rig, "polecats", rest @ ..] => declared(Role::Polecat, Some(*rig), rest.first().copied()),
        [rig, "crew", rest @ ..] => declared(Role::Crew, Some(*rig), rest.first().copied()),
        [rig, name, ..] => declared(Role::Polecat, Some(*rig), Some(*name)),
        [] => declared(Role::Unknown, None, None),
    }
}

/// Environment that declares `info` to a child agent process.
///
/// The role variable carries the compound actor form, which parses back to
/// the same role, rig, and worker. Empty for unknown locations.
#[must_use]
pub fn agent_env(info: &RoleInfo, config: &IdentityConfig) -> Vec<(String, String)> {
    let Some(actor) = info.actor() else {
        return Vec::new();
    };

    let mut vars = vec![(config.env.role.clone(), actor)];
    if let Some(rig) = &info.rig {
        vars.push((config.env.rig.clone(), rig.clone()));
    }
    if let Some(worker) = &info.worker_name {
        let name = if info.role == Role::Crew {
            &config.env.crew
        } else {
            &config.env.polecat
        };
        vars.push((name.clone(), worker.clone()));
    }
    vars.push((
        config.env.town_root.clone(),
        info.town_root.to_string_lossy().into_owned(),
    ));
    vars
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
