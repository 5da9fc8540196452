use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use missive_db::StoreError;
use missive_types::api::ErrorResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Store(e) => match e {
                StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
                StoreError::InvalidReference { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
                }
                StoreError::ConflictingEdit { .. } | StoreError::DuplicateUser(_) => {
                    (StatusCode::CONFLICT, e.to_string())
                }
                StoreError::CascadeFailure { .. } => {
                    error!("{}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                }
                _ => {
                    error!("store error: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
                }
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        if status.is_client_error() {
            warn!(%status, "{}", message);
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
