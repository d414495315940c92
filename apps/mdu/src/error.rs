//! HTTP-facing error type for the MDU control plane (§6, §7, grounded on
//! `liveion/src/error.rs::AppError`): library errors (`anyhow::Error`)
//! convert for free at the HTTP boundary via the blanket `From` impl,
//! while the typed variants map state/validation failures to stable
//! status codes.

use axum::response::{IntoResponse, Response};
use http::StatusCode;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    PusherNotFound(String),
    PusherAlreadyExists(String),
    InternalServerError(anyhow::Error),
}

impl AppError {
    pub fn bad_request(msg: impl ToString) -> Self {
        Self::BadRequest(msg.to_string())
    }

    pub fn pusher_not_found(id: impl ToString) -> Self {
        Self::PusherNotFound(id.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::PusherNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("pusher not found: {id}")).into_response()
            }
            AppError::PusherAlreadyExists(path) => (
                StatusCode::CONFLICT,
                format!("pusher already exists for path: {path}"),
            )
                .into_response(),
            AppError::InternalServerError(err) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        AppError::InternalServerError(err.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
