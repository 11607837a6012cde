//! Defines the `ApiError` type that can be returned from an API handler, which
//! specifies an HTTP status code and wraps an `anyhow::Error`. It implements
//! `IntoResponse`, allowing handlers to return a `Result<Json<T>, ApiError>`.
//! `From<pipeline::Error>` maps each pipeline failure to its status. Other
//! statuses are set using `ApiErrorExt::with_status`.
use axum::http::StatusCode;

pub trait ApiErrorExt {
    /// Sets the given http response status to use when responding with this error.
    fn with_status(self, status: StatusCode) -> ApiError;
}

impl<E: Into<anyhow::Error>> ApiErrorExt for E {
    fn with_status(self, status: StatusCode) -> ApiError {
        ApiError::new(status, self.into())
    }
}

/// An error response
#[derive(Debug, thiserror::Error, serde::Serialize)]
#[error("status: {status}, error: {error}")]
pub struct ApiError {
    /// The HTTP status code
    #[serde(serialize_with = "serialize_status")]
    pub status: StatusCode,

    /// The error message
    #[serde(serialize_with = "serialize_error")]
    #[source]
    pub error: anyhow::Error,
}

fn serialize_status<S: serde::Serializer>(status: &StatusCode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(status.as_u16())
}

fn serialize_error<S: serde::Serializer>(error: &anyhow::Error, s: S) -> Result<S::Ok, S::Error> {
    let err_str = format!("{error:#}"); // alternate renders nested causes
    s.serialize_str(&err_str)
}

impl ApiError {
    pub fn new(status: StatusCode, error: anyhow::Error) -> ApiError {
        ApiError { status, error }
    }

    pub fn not_found(what: impl std::fmt::Display) -> ApiError {
        ApiError::new(StatusCode::NOT_FOUND, anyhow::anyhow!("{what} was not found"))
    }
}

impl From<pipeline::Error> for ApiError {
    fn from(error: pipeline::Error) -> ApiError {
        let status = match &error {
            pipeline::Error::Input(_) => StatusCode::BAD_REQUEST,
            pipeline::Error::Authorization(_) => StatusCode::UNAUTHORIZED,
            pipeline::Error::Remote { .. } => StatusCode::BAD_GATEWAY,
        };
        let error = anyhow::Error::from(error);

        if status == StatusCode::BAD_GATEWAY {
            tracing::error!(error = %format!("{error:#}"), "API responding with remote error");
        }
        ApiError::new(status, error)
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status;
        (status, axum::Json(self)).into_response()
    }
}
