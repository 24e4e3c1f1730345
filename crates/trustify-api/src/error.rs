//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use trustify_core::{Error as CoreError, workflow::WorkflowError};

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("missing or empty principal id")]
  Unauthenticated,

  #[error("not found: {0}")]
  NotFound(String),

  #[error("precondition failed: {0}")]
  PreconditionFailed(String),

  #[error(transparent)]
  Rule(#[from] CoreError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl<E> From<WorkflowError<E>> for ApiError
where
  E: std::error::Error + Send + Sync + 'static,
{
  fn from(e: WorkflowError<E>) -> Self {
    match e {
      WorkflowError::Rule(e) => ApiError::Rule(e),
      WorkflowError::Store(e) => ApiError::Store(Box::new(e)),
    }
  }
}

impl ApiError {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    ApiError::Store(Box::new(e))
  }

  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
      ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
      ApiError::Rule(e) if e.is_validation() => StatusCode::UNPROCESSABLE_ENTITY,
      ApiError::Rule(e) if e.is_authorization() => StatusCode::FORBIDDEN,
      ApiError::Rule(e) => match e {
        CoreError::ApplicationNotFound(_) | CoreError::UserNotFound(_) => {
          StatusCode::NOT_FOUND
        }
        CoreError::NotApproved(_)
        | CoreError::RevisionConflict { .. }
        | CoreError::AlreadyInFlight(_) => StatusCode::CONFLICT,
        CoreError::UnknownStatus(_) | CoreError::UnknownRole(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
