use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("failed to query service '{name}': {message}")]
    Query { name: String, message: String },

    #[error("service '{name}' failed to {action}: {message}")]
    Control {
        name: String,
        action: &'static str,
        message: String,
    },

    #[error("service '{name}' did not stop after {attempts} status checks")]
    StopTimeout { name: String, attempts: u32 },

    #[error("cannot create service, required files are missing: {}", format_missing(.missing))]
    MissingFiles { missing: Vec<PathBuf> },

    #[error("failed to create service '{name}': {message}")]
    Create { name: String, message: String },

    #[error("failed to delete service '{name}': {message}")]
    Delete { name: String, message: String },

    #[error("failed to run service manager: {0}")]
    Command(#[from] std::io::Error),
}

impl ServiceError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Query { .. } => "SERVICE_QUERY_FAILED",
            Self::Control { .. } => "SERVICE_CONTROL_FAILED",
            Self::StopTimeout { .. } => "SERVICE_STOP_TIMEOUT",
            Self::MissingFiles { .. } => "SERVICE_FILES_MISSING",
            Self::Create { .. } => "SERVICE_CREATE_FAILED",
            Self::Delete { .. } => "SERVICE_DELETE_FAILED",
            Self::Command(_) => "SERVICE_COMMAND_FAILED",
        }
    }
}

fn format_missing(missing: &[PathBuf]) -> String {
    missing
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
