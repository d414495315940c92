//! HTTP-facing error type for the MSU control plane (§6, §7, grounded on
//! `liveion/src/error.rs::AppError`). [`recorder::ChannelError`]'s typed
//! state variants map to stable status codes (§7 "State... mapped to
//! stable user-facing codes by the control-plane layer").

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use recorder::ChannelError;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    ChannelNotFound(String),
    Channel(ChannelError),
    InternalServerError(anyhow::Error),
}

impl AppError {
    pub fn bad_request(msg: impl ToString) -> Self {
        Self::BadRequest(msg.to_string())
    }

    pub fn channel_not_found(uuid: impl ToString) -> Self {
        Self::ChannelNotFound(uuid.to_string())
    }

    /// Explicit conversion from the typed state error -- not a `From`
    /// impl, since `ChannelError` already converts to `anyhow::Error`
    /// (it's a `std::error::Error`) and would otherwise overlap with the
    /// blanket `From<E: Into<anyhow::Error>>` impl below.
    pub fn channel(err: ChannelError) -> Self {
        Self::Channel(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::ChannelNotFound(uuid) => {
                (StatusCode::NOT_FOUND, format!("channel not found: {uuid}")).into_response()
            }
            AppError::Channel(err @ (ChannelError::Running(_) | ChannelError::Restarting(_))) => {
                (StatusCode::CONFLICT, err.to_string()).into_response()
            }
            AppError::Channel(err @ ChannelError::Destroyed(_)) => {
                (StatusCode::GONE, err.to_string()).into_response()
            }
            AppError::Channel(
                err @ (ChannelError::InvalidName(_) | ChannelError::InvalidUrl(_)),
            ) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
            AppError::Channel(err) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
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
