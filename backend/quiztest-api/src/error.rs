use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::engine::checker::CheckError;
use crate::repositories::StoreError;

/// Error categories surfaced by the engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{collaborator} failed: {source}")]
    Internal {
        collaborator: &'static str,
        #[source]
        source: StoreError,
    },
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Wraps a store failure, keeping not-found distinct from backend errors.
    pub fn store(collaborator: &'static str) -> impl FnOnce(StoreError) -> EngineError {
        move |source| match source {
            StoreError::NotFound(what) => EngineError::NotFound(what),
            source => EngineError::Internal {
                collaborator,
                source,
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            EngineError::FailedPrecondition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(errors: validator::ValidationErrors) -> Self {
        EngineError::InvalidArgument(errors.to_string())
    }
}

impl From<CheckError> for EngineError {
    fn from(error: CheckError) -> Self {
        EngineError::FailedPrecondition(error.to_string())
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}
