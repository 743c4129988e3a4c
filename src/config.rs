//! Town-level configuration parsing and validation.
//!
//! Every field has a default, so a town without `mayor/identity.toml` runs
//! with [`IdentityConfig::default`]. File names and environment variable
//! names live here instead of being scattered as literals.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::{AppError, Result};

/// Relative path within a town root to the optional config file.
pub const CONFIG_PATH: &str = "mayor/identity.toml";

/// Environment variable names consulted at startup.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct EnvConfig {
    /// Declared role (`mayor`, `<rig>/witness`, `<rig>/crew/<name>`, ...).
    pub role: String,
    /// Rig name completing a bare declared role.
    pub rig: String,
    /// Crew member name completing a bare declared role.
    pub crew: String,
    /// Polecat name completing a bare declared role.
    pub polecat: String,
    /// Primary session identifier variable.
    pub session_id: String,
    /// Legacy session identifier variable.
    pub legacy_session_id: String,
    /// Town root fallback when the working directory cannot be read.
    pub town_root: String,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            role: "GT_ROLE".into(),
            rig: "GT_RIG".into(),
            crew: "GT_CREW".into(),
            polecat: "GT_POLECAT".into(),
            session_id: "GT_SESSION_ID".into(),
            legacy_session_id: "CLAUDE_SESSION_ID".into(),
            town_root: "GT_TOWN_ROOT".into(),
        }
    }
}

/// Global configuration parsed from `mayor/identity.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct IdentityConfig {
    /// Per-directory runtime state folder holding lock and session files.
    pub runtime_dir: String,
    /// Lock file name inside the runtime folder.
    pub lock_file: String,
    /// Session record file name inside the runtime folder.
    pub session_file: String,
    /// Append-only discovery log at the town root.
    pub events_file: String,
    /// Value of the `source` field on emitted events.
    pub event_source: String,
    /// Topic attached to session events of patrolling roles.
    pub patrol_topic: String,
    /// Environment variable names.
    pub env: EnvConfig,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            runtime_dir: ".runtime".into(),
            lock_file: "agent.lock".into(),
            session_file: "session_id".into(),
            events_file: ".events.jsonl".into(),
            event_source: "gt".into(),
            patrol_topic: "patrol".into(),
            env: EnvConfig::default(),
        }
    }
}

impl IdentityConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Load `mayor/identity.toml` under `town_root`, or defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file exists but is invalid.
    pub fn load_for_town(town_root: &Path) -> Result<Self> {
        let path = town_root.join(CONFIG_PATH);
        if !path.is_file() {
            debug!(path = %path.display(), "no identity config, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&path)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// `<dir>/<runtime_dir>`.
    #[must_use]
    pub fn runtime_dir_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.runtime_dir)
    }

    /// `<dir>/<runtime_dir>/<lock_file>`.
    #[must_use]
    pub fn lock_path_in(&self, dir: &Path) -> PathBuf {
        self.runtime_dir_in(dir).join(&self.lock_file)
    }

    /// `<dir>/<runtime_dir>/<session_file>`.
    #[must_use]
    pub fn session_path_in(&self, dir: &Path) -> PathBuf {
        self.runtime_dir_in(dir).join(&self.session_file)
    }

    /// `<town_root>/<events_file>`.
    #[must_use]
    pub fn events_path(&self, town_root: &Path) -> PathBuf {
        town_root.join(&self.events_file)
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("runtime_dir", &self.runtime_dir),
            ("lock_file", &self.lock_file),
            ("session_file", &self.session_file),
            ("events_file", &self.events_file),
        ] {
            ensure_file_name(field, value)?;
        }

        if self.lock_file == self.session_file {
            return Err(AppError::Config(
                "lock_file and session_file must differ".into(),
            ));
        }

        if self.event_source.trim().is_empty() {
            return Err(AppError::Config("event_source must not be empty".into()));
        }

        for (field, value) in [
            ("env.role", &self.env.role),
            ("env.session_id", &self.env.session_id),
            ("env.legacy_session_id", &self.env.legacy_session_id),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::Config(format!("{field} must not be empty")));
            }
        }

        Ok(())
    }
}

/// A configured name must be exactly one normal path component.
fn ensure_file_name(field: &str, value: &str) -> Result<()> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(AppError::Config(format!(
            "{field} must be a single file name, got {value:?}"
        ))),
    }
}
