//! Errors returned by `ProcessSupervisor::start`. A failed start leaves the
//! role slot exactly as it was.

use std::path::PathBuf;

use super::state_machine::TransitionError;
use super::Role;

#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    #[error("a {0} process is already running")]
    AlreadyRunning(Role),

    #[error("executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("executable is not runnable (permission denied): {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("failed to spawn '{}': {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl ProcessError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning(_) => "ALREADY_RUNNING",
            Self::ExecutableNotFound(_) => "EXECUTABLE_NOT_FOUND",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::Spawn { .. } => "SPAWN_FAILED",
            Self::Transition(_) => "INVALID_STATE",
        }
    }
}
