//! Interactive confirmation for destructive commands.

use std::io::{BufRead, IsTerminal, Write};

use crate::error::{Result, SwapError};

/// Ask a yes/no question on stderr.
///
/// Returns `true` without asking when stdin is not a terminal, so scripted
/// runs are never blocked.
pub fn confirm(question: &str) -> Result<bool> {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        return Ok(true);
    }

    let mut stderr = std::io::stderr();
    write!(stderr, "{question} [y/N] ").map_err(SwapError::Io)?;
    stderr.flush().map_err(SwapError::Io)?;

    let mut answer = String::new();
    stdin.lock().read_line(&mut answer).map_err(SwapError::Io)?;
    Ok(is_yes(&answer))
}

/// Whether an answer means yes.
#[must_use]
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
