//! Terminal detection.

use std::io::IsTerminal;

/// Output stream a rendering decision applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    /// Whether this stream is attached to a terminal.
    #[must_use]
    pub fn is_tty(self) -> bool {
        match self {
            Self::Stdout => std::io::stdout().is_terminal(),
            Self::Stderr => std::io::stderr().is_terminal(),
        }
    }
}

/// Whether ANSI color should be written to `stream`.
///
/// `no_color` is the already-resolved setting (flag, env, config file).
#[must_use]
pub fn should_use_color(no_color: bool, stream: Stream) -> bool {
    color_allowed(no_color, std::env::var("TERM").ok().as_deref(), stream.is_tty())
}

fn color_allowed(no_color: bool, term: Option<&str>, is_tty: bool) -> bool {
    if no_color || term == Some("dumb") {
        return false;
    }
    is_tty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_needs_a_terminal() {
        assert!(color_allowed(false, Some("xterm-256color"), true));
        assert!(!color_allowed(false, Some("xterm-256color"), false));
    }

    #[test]
    fn no_color_and_dumb_term_disable_color() {
        assert!(!color_allowed(true, None, true));
        assert!(!color_allowed(false, Some("dumb"), true));
    }
}
