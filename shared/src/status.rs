//! Status trailer
//!
//! The last line on every connection tells the caller how the request ended.
//! These literals are what existing callers scan for, so they never change.

use crate::{ExecutionResult, TerminalState};

pub const STATUS_SUCCESS: &str = "status: SUCCESS";
pub const STATUS_FAILED: &str = "status: FAILED";

/// The status line for a terminal state, newline included
pub fn status_line(state: TerminalState) -> String {
    match state {
        TerminalState::Success => format!("{STATUS_SUCCESS}\n"),
        TerminalState::Failed => format!("{STATUS_FAILED}\n"),
    }
}

/// Render the bytes written after the command output
///
/// A failure is preceded by its error description on its own line.
pub fn render_trailer(result: &ExecutionResult) -> String {
    match result.state {
        TerminalState::Success => status_line(TerminalState::Success),
        TerminalState::Failed => {
            let error = result
                .error
                .as_deref()
                .map(str::trim_end)
                .filter(|e| !e.is_empty())
                .unwrap_or("unknown error");
            format!("{error}\n{}", status_line(TerminalState::Failed))
        }
    }
}

/// Classify a complete response by its final line
pub fn parse_status(response: &[u8]) -> Option<TerminalState> {
    let body = response.strip_suffix(b"\n")?;
    let last_line = match body.iter().rposition(|b| *b == b'\n') {
        Some(pos) => &body[pos + 1..],
        None => body,
    };

    if last_line == STATUS_SUCCESS.as_bytes() {
        Some(TerminalState::Success)
    } else if last_line == STATUS_FAILED.as_bytes() {
        Some(TerminalState::Failed)
    } else {
        None
    }
}
