//! Unified error handling for autosleepd.
//!
//! The monitor deliberately has a tiny error surface: everything that can go
//! wrong while talking to the game server collapses into [`CommandError`],
//! and the monitor classifies any such failure as a connectivity failure.

use thiserror::Error;

/// Errors from executing a command against the game server.
///
/// The monitor does not distinguish the variants: an unreachable rcon
/// binary and a non-zero exit both mean "server cannot be confirmed online
/// right now". The variants exist so operators see an accurate log line.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The rcon binary could not be spawned at all.
    #[error("failed to launch rcon binary: {0}")]
    Spawn(#[from] std::io::Error),

    /// The rcon binary ran but reported a non-zero exit code.
    #[error("rcon exited with code {code}: {output}")]
    Failed {
        /// Captured stderr (or stdout when stderr is empty).
        output: String,
        /// Process exit code, or -1 when terminated by signal.
        code: i32,
    },
}

impl CommandError {
    /// Static code string for log field labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Spawn(_) => "spawn",
            Self::Failed { .. } => "non_zero_exit",
        }
    }
}

/// Result type for command channel operations.
pub type CommandResult<T> = Result<T, CommandError>;
