//! JSONL event log writer.

use std::{
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::warn;

use super::{Event, EventLog};
use crate::{AppError, Result};

/// Appends one JSON object per line to a single log file.
///
/// The file is opened lazily on the first append and kept open for the
/// lifetime of the writer.
pub struct JsonlEventLog {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<fs::File>>>,
}

impl JsonlEventLog {
    /// Writer appending to `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            writer: Mutex::new(None),
        }
    }

    /// Log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> Result<BufWriter<fs::File>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AppError::Io(format!("failed to open event log {}: {e}", path.display())))?;
        Ok(BufWriter::new(file))
    }
}

impl EventLog for JsonlEventLog {
    fn append(&self, event: &Event) -> Result<()> {
        let line = serde_json::to_string(event)
            .map_err(|e| AppError::Io(format!("failed to serialize event: {e}")))?;

        let mut guard = self
            .writer
            .lock()
            .map_err(|_| AppError::Io("event log mutex poisoned".to_owned()))?;

        if guard.is_none() {
            *guard = Some(Self::open(&self.path)?);
        }

        if let Some(writer) = guard.as_mut() {
            if let Err(e) = writeln!(writer, "{line}") {
                warn!("failed to write event: {e}");
                return Err(AppError::Io(format!("event write failed: {e}")));
            }
            if let Err(e) = writer.flush() {
                warn!("failed to flush event log: {e}");
                return Err(AppError::Io(format!("event flush failed: {e}")));
            }
        }

        Ok(())
    }
}
