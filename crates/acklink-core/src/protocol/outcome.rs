//! Command outcomes
//!
//! Published on the outcome bus while a command is retried, and returned to
//! the caller of `send`.

use serde::{Deserialize, Serialize};

/// Result of executing one command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CommandOutcome {
    /// No command has been executed
    #[default]
    Init,

    /// Command was acknowledged
    Success,

    /// Command went unanswered and is being sent again
    Retry,

    /// Command could not be executed
    Failure,

    /// Command went unanswered on every attempt
    Timeout,
}

impl CommandOutcome {
    /// Whether this outcome ends the command
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandOutcome::Success | CommandOutcome::Failure | CommandOutcome::Timeout
        )
    }
}
