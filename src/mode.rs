//! Per-invocation run flags.
//!
//! Output mode and dry-run are passed explicitly into every operation that
//! can write or print, rather than read from process-wide state.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How command results are rendered on stdout.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Human-readable lines. Default.
    #[default]
    Text,
    /// A single JSON document.
    Json,
}

/// Flags controlling side effects and verbosity of one invocation.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct RunFlags {
    /// Skip every filesystem write and event emission.
    pub dry_run: bool,
    /// Output rendering.
    pub format: OutputFormat,
    /// Record why each step ran or was skipped.
    pub explain: bool,
}

impl RunFlags {
    /// Whether mutating steps may run.
    #[must_use]
    pub fn writes_allowed(&self) -> bool {
        !self.dry_run
    }

    /// Whether results are rendered as JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}
