//! Mapping from the core error taxonomy to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dispatch_core::error::DispatchError;
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    /// The `x-user-id` header was absent or empty.
    MissingIdentity,
    Dispatch(DispatchError),
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        ApiError::Dispatch(e)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn status_for(e: &DispatchError) -> StatusCode {
    match e {
        DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
        DispatchError::InvalidState
        | DispatchError::IllegalTransition
        | DispatchError::TripAlreadyFinalized
        | DispatchError::NotInterested
        | DispatchError::DriverBusy => StatusCode::CONFLICT,
        DispatchError::Unauthorized => StatusCode::FORBIDDEN,
        DispatchError::NotFound => StatusCode::NOT_FOUND,
        DispatchError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::MissingIdentity => (
                StatusCode::UNAUTHORIZED,
                "x-user-id header is required".to_string(),
            ),
            ApiError::Dispatch(e) => (status_for(e), e.to_string()),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
