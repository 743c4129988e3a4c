//! Error types shared across the application.

use std::fmt::{Display, Formatter};

use crate::lock::LockCollision;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The current directory is not inside a town workspace.
    Workspace(String),
    /// Lock or session record is absent.
    NotFound(String),
    /// Another live process owns the worker identity.
    Locked(Box<LockCollision>),
    /// Lock file exists but cannot be parsed.
    InvalidLock(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether this error only reports an absent record.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Workspace(msg) => write!(f, "workspace: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Locked(collision) => write!(f, "locked: {collision}"),
            Self::InvalidLock(msg) => write!(f, "invalid lock: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
