use std::fmt;

use thiserror::Error;

/// Failure categories surfaced by the script engine.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script compilation failed: {0}")]
    Compile(String),
    #[error("script invocation failed: {0}")]
    Invocation(String),
    #[error("script interrupted by watchdog: {0}")]
    Timeout(String),
    #[error("engine lifecycle failure: {0}")]
    Lifecycle(String),
}

impl ScriptError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ScriptError::Timeout(_))
    }
}

/// Read-only view of the most recent error reported by the script
/// environment. Overwritten on each failing compile or call; callers must
/// check the result of the operation that produced it rather than polling
/// this view on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptRunError {
    pub message: String,
    pub line: Option<usize>,
    pub position: Option<usize>,
    pub timed_out: bool,
}

impl ScriptRunError {
    pub(crate) fn record(message: String, line: Option<usize>, position: Option<usize>) -> Self {
        Self { message, line, position, timed_out: false }
    }

    pub(crate) fn record_timeout(message: String) -> Self {
        Self { message, line: None, position: None, timed_out: true }
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_empty()
    }
}

impl fmt::Display for ScriptRunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.position) {
            (Some(line), Some(position)) => {
                write!(f, "{} (line {}, position {})", self.message, line, position)
            }
            (Some(line), None) => write!(f, "{} (line {})", self.message, line),
            _ => write!(f, "{}", self.message),
        }
    }
}
