//! Error types for dockit.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A builder command exited nonzero. Displays the command's last
    /// diagnostic line.
    #[error("{message}")]
    ProcessFailed {
        command: String,
        code: i32,
        message: String,
    },

    #[error("{0}")]
    NotificationFailed(String),

    #[error("not implemented: {0}")]
    Unimplemented(String),

    #[error("credential store query failed: {0}")]
    CredentialStore(String),

    #[error("version lookup failed: {0}")]
    VersionLookup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Exit code reported for this error in an [`crate::ExecutionResult`].
    ///
    /// Process failures keep the child's own code; everything else is `1`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ProcessFailed { code, .. } if *code != 0 => *code,
            _ => 1,
        }
    }

    /// Whether the orchestrator may retry the goal after this error.
    pub fn is_retry_feasible(&self) -> bool {
        matches!(
            self,
            Error::ProcessFailed { .. }
                | Error::NotificationFailed(_)
                | Error::CredentialStore(_)
                | Error::VersionLookup(_)
                | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
