//! Agent startup sequence.
//!
//! Ties the pieces together for one invocation: hook handshake and session
//! persistence, role resolution, identity lock, discovery event, beacon.
//! Only a lock collision stops the sequence; session persistence and event
//! emission are best-effort.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::config::IdentityConfig;
use crate::events::{emit_session_start, EventLog};
use crate::lock::liveness::current_pid;
use crate::lock::IdentityLock;
use crate::mode::RunFlags;
use crate::models::{HookInput, HookSource, LockRecord, RoleInfo};
use crate::role::{resolve_role, RoleOverride};
use crate::session::{
    persist_everywhere, resolve_hook_session, resolve_session_id, ResolvedSession, SessionSources,
};
use crate::Result;

/// Prefix of the discovery beacon line.
pub const BEACON_TAG: &str = "[town]";

/// Everything the startup sequence reads from outside.
#[derive(Debug, Clone, Default)]
pub struct PrimeRequest {
    /// Town root.
    pub town_root: PathBuf,
    /// Working directory of the agent.
    pub work_dir: PathBuf,
    /// Declared role, if any.
    pub declared: Option<RoleOverride>,
    /// Session identifiers from the environment.
    pub sources: SessionSources,
    /// Invoked as the runtime's session-start hook.
    pub hook_mode: bool,
    /// Handshake read from stdin in hook mode.
    pub hook_input: Option<HookInput>,
}

/// What happened with the identity lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockOutcome {
    /// Lock written for this process.
    Acquired {
        /// Written record.
        record: LockRecord,
        /// Worker identity directory.
        identity_dir: PathBuf,
    },
    /// Role is supervised externally.
    NotRequired,
    /// Declared role disagrees with the directory.
    SkippedMismatch,
    /// Dry run.
    SkippedDryRun,
}

/// Result of one startup sequence.
#[derive(Debug, Clone, Serialize)]
pub struct PrimeReport {
    /// Role classification.
    pub role: RoleInfo,
    /// Actor identity, absent for unknown locations.
    pub actor: Option<String>,
    /// Resolved session token.
    pub session: ResolvedSession,
    /// Hook trigger reason.
    pub hook_source: Option<HookSource>,
    /// Session record files written.
    pub persisted: Vec<PathBuf>,
    /// Identity lock outcome.
    pub lock: LockOutcome,
    /// Whether the discovery event was written.
    pub event_emitted: bool,
    /// Discovery beacon line.
    pub beacon: Option<String>,
    /// Step-by-step reasoning, when requested.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub explanations: Vec<String>,
}

/// Run the startup sequence.
///
/// # Errors
///
/// Returns `AppError::Locked` when another live process holds this worker
/// identity, and `AppError::Io` when the lock cannot be written.
pub fn run_prime(
    request: &PrimeRequest,
    config: &IdentityConfig,
    flags: RunFlags,
    events: &dyn EventLog,
) -> Result<PrimeReport> {
    let span = info_span!(
        "prime",
        town_root = %request.town_root.display(),
        work_dir = %request.work_dir.display(),
        hook = request.hook_mode,
        dry_run = flags.dry_run
    );
    let _guard = span.enter();

    let mut explain = Explainer::new(flags.explain);
    let (hooked, persisted) = if request.hook_mode {
        let (resolved, persisted) = hook_session(request, config, flags, &mut explain);
        (Some(resolved), persisted)
    } else {
        (None, Vec::new())
    };

    let role = resolve_role(
        &request.town_root,
        &request.work_dir,
        request.declared.as_ref(),
    );
    explain.note(format!(
        "role {} from {} (path suggests {})",
        role.role, role.source, role.cwd_role
    ));
    if role.mismatch {
        warn!(
            declared = %role.role,
            from_path = %role.cwd_role,
            "declared role does not match working directory"
        );
    }

    let actor = role.actor();
    let session = hooked.unwrap_or_else(|| {
        resolve_session_id(
            actor.as_deref().unwrap_or(role.role.as_str()),
            &request.sources,
            &request.work_dir,
            &request.town_root,
            config,
        )
    });

    let lock = lock_step(&role, &session.token, config, flags, &mut explain)?;

    let event_emitted = if flags.writes_allowed() {
        let emitted = emit_session_start(
            events,
            &role,
            &session.token,
            &request.work_dir,
            config,
        )
        .is_some();
        explain.note(if emitted {
            "session_start event emitted"
        } else {
            "session_start event not emitted"
        });
        emitted
    } else {
        explain.note("dry run: session_start event skipped");
        false
    };

    let beacon = actor.as_deref().map(|a| beacon_line(a, &session.token));
    info!(actor = actor.as_deref().unwrap_or("-"), session = %session.token, "prime complete");

    Ok(PrimeReport {
        actor,
        session,
        hook_source: request.hook_input.as_ref().and_then(|input| input.source),
        persisted,
        lock,
        event_emitted,
        beacon,
        explanations: explain.finish(),
        role,
    })
}

/// Resolve the hook-mode token and persist it unless this is a dry run.
fn hook_session(
    request: &PrimeRequest,
    config: &IdentityConfig,
    flags: RunFlags,
    explain: &mut Explainer,
) -> (ResolvedSession, Vec<PathBuf>) {
    let sources = request
        .sources
        .clone()
        .with_hook(request.hook_input.as_ref());
    let resolved = resolve_hook_session(&sources);
    explain.note(format!("hook mode: session token from {}", resolved.origin));

    if flags.dry_run {
        explain.note("dry run: session record not persisted");
        return (resolved, Vec::new());
    }
    let persisted = persist_everywhere(
        &request.town_root,
        &request.work_dir,
        &resolved.token,
        config,
    );
    (resolved, persisted)
}

/// A mismatched role must not claim an identity it may not own.
fn lock_step(
    role: &RoleInfo,
    session_id: &str,
    config: &IdentityConfig,
    flags: RunFlags,
    explain: &mut Explainer,
) -> Result<LockOutcome> {
    if role.mismatch {
        explain.note("identity lock skipped: role/location mismatch");
        return Ok(LockOutcome::SkippedMismatch);
    }
    if flags.dry_run {
        explain.note("identity lock skipped: dry run");
        return Ok(LockOutcome::SkippedDryRun);
    }

    let outcome = match acquire_identity_lock(role, session_id, config)? {
        Some((identity_dir, record)) => {
            explain.note(format!("identity lock acquired in {}", identity_dir.display()));
            LockOutcome::Acquired {
                record,
                identity_dir,
            }
        }
        None => {
            explain.note(format!("identity lock not required for {}", role.role));
            LockOutcome::NotRequired
        }
    };
    Ok(outcome)
}

/// Acquire the identity lock for worker roles.
///
/// Returns `Ok(None)` for infrastructure roles and unknown locations.
/// Workers whose rig or name is unknown are keyed by their working
/// directory.
///
/// # Errors
///
/// Returns `AppError::Locked` if another live process holds the identity.
pub fn acquire_identity_lock(
    role: &RoleInfo,
    session_id: &str,
    config: &IdentityConfig,
) -> Result<Option<(PathBuf, LockRecord)>> {
    if !role.role.is_worker() {
        return Ok(None);
    }

    let identity_dir = role.identity_dir().unwrap_or_else(|| {
        warn!(work_dir = %role.work_dir.display(), "worker identity incomplete, locking working directory");
        role.work_dir.clone()
    });
    let record = IdentityLock::new(&identity_dir, config).acquire(session_id)?;
    Ok(Some((identity_dir, record)))
}

/// `[town] role:<actor> pid:<pid> session:<token>`
#[must_use]
pub fn beacon_line(actor: &str, session_id: &str) -> String {
    format!(
        "{BEACON_TAG} role:{actor} pid:{} session:{session_id}",
        current_pid()
    )
}

/// Collects explanation lines only when asked to.
struct Explainer {
    enabled: bool,
    lines: Vec<String>,
}

impl Explainer {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            lines: Vec::new(),
        }
    }

    fn note(&mut self, line: impl Into<String>) {
        if self.enabled {
            self.lines.push(line.into());
        }
    }

    fn finish(self) -> Vec<String> {
        self.lines
    }
}
