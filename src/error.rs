use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::email::EmailError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request")]
    BadRequest,

    /// Covers unknown resources and every authentication failure, so wrong
    /// sessions, expired codes and unknown emails are indistinguishable.
    #[error("Not Found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("email error: {0}")]
    Email(#[from] EmailError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::BadRequest => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Database(ref error) => {
                log::error!("database error: {error}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Email(ref error) => {
                log::error!("email error: {error}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match status {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::NOT_FOUND => "Not Found",
            _ => "Internal Server Error",
        };

        (status, message).into_response()
    }
}
