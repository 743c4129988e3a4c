//! Session token models: persisted record and hook handshake payload.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Persisted session token. Line one is the token, line two the RFC 3339
/// resolution time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    /// Session token.
    pub token: String,
    /// When the token was resolved; absent in hand-written files.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Record for `token`, resolved now.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            resolved_at: Some(Utc::now()),
        }
    }

    /// Render the two-line file body.
    #[must_use]
    pub fn to_file_contents(&self) -> String {
        match self.resolved_at {
            Some(at) => format!(
                "{}\n{}\n",
                self.token,
                at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            None => format!("{}\n", self.token),
        }
    }

    /// Parse a file body. Returns `None` when the first line is blank.
    ///
    /// An unparseable timestamp is dropped rather than rejected, since
    /// readers only depend on the token.
    #[must_use]
    pub fn parse(contents: &str) -> Option<Self> {
        let mut lines = contents.lines();
        let token = lines.next()?.trim();
        if token.is_empty() {
            return None;
        }
        let resolved_at = lines
            .next()
            .and_then(|line| DateTime::parse_from_rfc3339(line.trim()).ok())
            .map(|at| at.with_timezone(&Utc));
        Some(Self {
            token: token.to_owned(),
            resolved_at,
        })
    }
}

/// Why the agent runtime fired its session-start hook.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HookSource {
    /// Fresh session.
    Startup,
    /// Resumed session.
    Resume,
    /// Context cleared.
    Clear,
    /// Context compacted.
    Compact,
    /// Any value this build does not know about.
    #[serde(other)]
    Other,
}

impl HookSource {
    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Resume => "resume",
            Self::Clear => "clear",
            Self::Compact => "compact",
            Self::Other => "other",
        }
    }
}

/// Single-line JSON payload the agent runtime writes to stdin in hook mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HookInput {
    /// Session identifier assigned by the runtime.
    #[serde(default)]
    pub session_id: String,
    /// Transcript location, informational only.
    #[serde(default)]
    pub transcript_path: Option<String>,
    /// Trigger reason.
    #[serde(default)]
    pub source: Option<HookSource>,
}

impl HookInput {
    /// Non-empty session identifier, if the payload carried one.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        let id = self.session_id.trim();
        (!id.is_empty()).then_some(id)
    }
}
