//! Session token resolution.
//!
//! Sources in priority order: hook handshake, primary environment variable,
//! legacy environment variable, persisted record (working directory, then
//! town root), freshly generated UUID. Resolution itself never writes.

use std::env;
use std::fmt::{Display, Formatter};
use std::path::Path;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::store::read_session;
use crate::config::IdentityConfig;
use crate::models::HookInput;

/// Externally supplied session identifiers, gathered before resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSources {
    /// Identifier from the hook handshake.
    pub hook: Option<String>,
    /// Primary environment variable.
    pub primary_env: Option<String>,
    /// Legacy environment variable.
    pub legacy_env: Option<String>,
}

impl SessionSources {
    /// Read both environment variables named in `config`.
    #[must_use]
    pub fn from_env(config: &IdentityConfig) -> Self {
        Self {
            hook: None,
            primary_env: non_empty_var(&config.env.session_id),
            legacy_env: non_empty_var(&config.env.legacy_session_id),
        }
    }

    /// Attach the hook handshake, if it carried an identifier.
    #[must_use]
    pub fn with_hook(mut self, input: Option<&HookInput>) -> Self {
        self.hook = input.and_then(HookInput::session_id).map(str::to_owned);
        self
    }

    fn first_supplied(&self) -> Option<(String, SessionOrigin)> {
        [
            (&self.hook, SessionOrigin::Hook),
            (&self.primary_env, SessionOrigin::PrimaryEnv),
            (&self.legacy_env, SessionOrigin::LegacyEnv),
        ]
        .into_iter()
        .find_map(|(value, origin)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (v.to_owned(), origin))
        })
    }
}

/// Where a resolved token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrigin {
    /// Hook handshake on stdin.
    Hook,
    /// Primary environment variable.
    PrimaryEnv,
    /// Legacy environment variable.
    LegacyEnv,
    /// Record in the working directory.
    PersistedWorkDir,
    /// Record at the town root.
    PersistedTownRoot,
    /// Freshly generated.
    Generated,
}

impl Display for SessionOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Hook => "hook",
            Self::PrimaryEnv => "primary env",
            Self::LegacyEnv => "legacy env",
            Self::PersistedWorkDir => "persisted (cwd)",
            Self::PersistedTownRoot => "persisted (town root)",
            Self::Generated => "generated",
        };
        f.write_str(label)
    }
}

/// Resolved token and its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSession {
    /// Session token.
    pub token: String,
    /// Source of the token.
    pub origin: SessionOrigin,
}

impl ResolvedSession {
    fn generated() -> Self {
        Self {
            token: Uuid::new_v4().to_string(),
            origin: SessionOrigin::Generated,
        }
    }
}

/// Resolve the session token for `actor` through the full priority chain.
///
/// A generated token is not persisted here.
#[must_use]
pub fn resolve_session_id(
    actor: &str,
    sources: &SessionSources,
    work_dir: &Path,
    town_root: &Path,
    config: &IdentityConfig,
) -> ResolvedSession {
    let resolved = sources
        .first_supplied()
        .map(|(token, origin)| ResolvedSession { token, origin })
        .or_else(|| persisted(work_dir, SessionOrigin::PersistedWorkDir, config))
        .or_else(|| persisted(town_root, SessionOrigin::PersistedTownRoot, config))
        .unwrap_or_else(ResolvedSession::generated);

    debug!(actor, origin = %resolved.origin, "session token resolved");
    resolved
}

/// Resolve the token in hook mode: supplied sources, else generated.
#[must_use]
pub fn resolve_hook_session(sources: &SessionSources) -> ResolvedSession {
    sources
        .first_supplied()
        .map_or_else(ResolvedSession::generated, |(token, origin)| {
            ResolvedSession { token, origin }
        })
}

fn persisted(dir: &Path, origin: SessionOrigin, config: &IdentityConfig) -> Option<ResolvedSession> {
    match read_session(dir, config) {
        Ok(record) => Some(ResolvedSession {
            token: record.token,
            origin,
        }),
        Err(err) => {
            debug!(dir = %dir.display(), %err, "no persisted session");
            None
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
