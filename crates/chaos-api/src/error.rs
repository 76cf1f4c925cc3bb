//! Error types for the management API

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type for API handlers
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned from an API handler
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request body failed validation
    #[error("{0}")]
    BadRequest(String),

    /// The experiment store rejected the operation
    #[error(transparent)]
    Store(#[from] chaos_common::Error),
}

impl Error {
    /// HTTP status mirroring the error class
    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Store(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Error::Store(e) if e.is_conflict() => StatusCode::CONFLICT,
            Error::Store(chaos_common::Error::Kube {
                source: kube::Error::Api(response),
            }) => StatusCode::from_u16(response.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, self.to_string()).into_response()
    }
}
