//! Discovery event log.
//!
//! Provides the [`EventLog`] trait and the session event types. The primary
//! implementation, [`JsonlEventLog`], appends JSONL records to
//! `<town_root>/.events.jsonl` where other tooling tails them to discover
//! running agents.

pub mod writer;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::IdentityConfig;
use crate::lock::liveness::current_pid;
use crate::models::RoleInfo;

/// Event type classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Agent session started or resumed.
    SessionStart,
}

/// Who sees an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Audit trail only.
    Audit,
    /// Activity feed only.
    Feed,
    /// Both.
    Both,
}

/// Payload of a `session_start` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionPayload {
    /// Resolved session token.
    pub session_id: String,
    /// Actor identity.
    pub role: String,
    /// `<actor>-<pid>`, unique per process.
    pub actor_pid: String,
    /// Filtering hint for patrol roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Working directory of the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

/// One line of the event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Emission time.
    pub ts: DateTime<Utc>,
    /// Emitting tool.
    pub source: String,
    /// Event classification.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Actor identity.
    pub actor: String,
    /// Type-specific payload.
    pub payload: SessionPayload,
    /// Audience.
    pub visibility: Visibility,
}

/// Appends events to a persistent store.
pub trait EventLog {
    /// Record a single event.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn append(&self, event: &Event) -> crate::Result<()>;
}

pub use writer::JsonlEventLog;

/// Build the `session_start` event for `info`.
///
/// Returns `None` for roles without an actor identity.
#[must_use]
pub fn session_start_event(
    info: &RoleInfo,
    session_id: &str,
    work_dir: &Path,
    config: &IdentityConfig,
) -> Option<Event> {
    let actor = info.actor()?;
    let cwd = work_dir.to_string_lossy();

    Some(Event {
        ts: Utc::now(),
        source: config.event_source.clone(),
        event_type: EventType::SessionStart,
        payload: SessionPayload {
            session_id: session_id.to_owned(),
            role: actor.clone(),
            actor_pid: format!("{actor}-{}", current_pid()),
            topic: info.role.patrols().then(|| config.patrol_topic.clone()),
            cwd: (!cwd.is_empty()).then(|| cwd.into_owned()),
        },
        actor,
        visibility: Visibility::Feed,
    })
}

/// Emit the `session_start` event, logging and swallowing failures.
///
/// Returns the event when it was written.
#[must_use]
pub fn emit_session_start(
    log: &dyn EventLog,
    info: &RoleInfo,
    session_id: &str,
    work_dir: &Path,
    config: &IdentityConfig,
) -> Option<Event> {
    let Some(event) = session_start_event(info, session_id, work_dir, config) else {
        debug!(role = %info.role, "no actor identity, session event skipped");
        return None;
    };

    match log.append(&event) {
        Ok(()) => {
            debug!(actor = %event.actor, "session event emitted");
            Some(event)
        }
        Err(err) => {
            warn!(actor = %event.actor, %err, "failed to emit session event");
            None
        }
    }
}
