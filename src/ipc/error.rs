use axum::http::StatusCode;

use crate::autostart::AutostartError;
use crate::config::ConfigError;
use crate::service::ServiceError;
use crate::supervisor::ProcessError;
use crate::updater::UpdateError;

/// Error returned by IPC handlers; renders as
/// `{"success": false, "error": ..., "error_code": ...}`.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error(transparent)]
    Autostart(#[from] AutostartError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config(ConfigError::ProfileNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Config(ConfigError::Read { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::BAD_REQUEST,
            Self::Process(ProcessError::AlreadyRunning(_)) => StatusCode::CONFLICT,
            Self::Process(ProcessError::ExecutableNotFound(_))
            | Self::Process(ProcessError::PermissionDenied(_)) => StatusCode::BAD_REQUEST,
            Self::Process(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Service(ServiceError::MissingFiles { .. }) => StatusCode::BAD_REQUEST,
            Self::Service(ServiceError::StopTimeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Service(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Update(UpdateError::Network { .. }) | Self::Update(UpdateError::Status { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Update(UpdateError::Hook(_)) => StatusCode::CONFLICT,
            Self::Update(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Autostart(AutostartError::Unsupported) => StatusCode::NOT_IMPLEMENTED,
            Self::Autostart(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.error_code(),
            Self::Process(e) => e.error_code(),
            Self::Service(e) => e.error_code(),
            Self::Update(e) => e.error_code(),
            Self::Autostart(e) => e.error_code(),
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("IPC request failed: {}", self);
        } else {
            tracing::debug!("IPC request rejected: {}", self);
        }
        (status, axum::Json(self.to_json())).into_response()
    }
}
