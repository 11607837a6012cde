/// Error is the failure of a Warehouse operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required connection parameter is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
    /// Credentials are missing, or were rejected by the remote engine.
    #[error("authorization error: {0}")]
    Authorization(String),
    /// A statement reached a terminal state other than success.
    #[error("statement {statement_id} {state}: {message}")]
    Statement {
        statement_id: String,
        state: String,
        error_code: Option<String>,
        message: String,
    },
    #[error("{status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("invalid url")]
    Url(#[from] url::ParseError),
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl Error {
    pub fn is_authorization(&self) -> bool {
        matches!(self, Error::Authorization(_))
    }
}
