//! Hook-mode stdin handshake.

use std::io::{self, BufRead, IsTerminal};

use tracing::debug;

use crate::models::HookInput;

/// Read one JSON line from `reader`.
///
/// Empty input, read errors, and malformed JSON all mean "no handshake".
#[must_use]
pub fn read_hook_input<R: BufRead>(mut reader: R) -> Option<HookInput> {
    let mut line = String::new();
    if let Err(err) = reader.read_line(&mut line) {
        debug!(%err, "hook input unreadable");
        return None;
    }

    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str(line) {
        Ok(input) => Some(input),
        Err(err) => {
            debug!(%err, "hook input is not valid JSON, ignoring");
            None
        }
    }
}

/// Read the handshake from process stdin.
///
/// An interactive terminal never carries a handshake, so it is not read.
/// A piped stdin is read until the first newline or end of input, so the
/// writer must terminate the line or close the pipe.
#[must_use]
pub fn read_stdin_hook_input() -> Option<HookInput> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        debug!("stdin is a terminal, no hook input");
        return None;
    }
    read_hook_input(stdin.lock())
}
