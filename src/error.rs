use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::env;
use std::fmt::{self, Debug, Display};

#[derive(Debug)]
pub struct Error {
    pub code: i32,
    pub message: String,
    pub fields: Vec<String>,
}

/// Coarse classification used by callers to decide between retrying and
/// re-prompting the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Unauthenticated,
    InvalidState,
    Conflict,
    Unavailable,
    Internal,
}

impl Error {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            fields: vec![],
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self.code {
            6 => ErrorKind::Unavailable,
            100 => ErrorKind::InvalidState,
            101 => ErrorKind::Validation,
            102 => ErrorKind::Forbidden,
            103 => ErrorKind::NotFound,
            104 => ErrorKind::Conflict,
            105 => ErrorKind::Unauthenticated,
            _ => ErrorKind::Internal,
        }
    }

    /// Seat races and store outages may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Unavailable)
    }

    pub fn is_invalid_state_error(&self) -> bool {
        self.kind() == ErrorKind::InvalidState
    }

    pub fn is_invalid_input_error(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub fn is_unauthorized_error(&self) -> bool {
        self.kind() == ErrorKind::Forbidden
    }

    pub fn is_not_found_error(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict_error(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub fn is_unavailable_error(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }

    pub fn invalid_state_error() -> Self {
        Self::new(100, "invalid state")
    }

    pub fn invalid_input_error() -> Self {
        Self::new(101, "invalid input")
    }

    /// Validation failure naming every offending field.
    pub fn invalid_fields_error(fields: Vec<String>) -> Self {
        Self {
            fields,
            ..Self::new(101, "invalid input")
        }
    }

    pub fn unauthorized_error() -> Self {
        Self::new(102, "unauthorized")
    }

    pub fn not_found_error() -> Self {
        Self::new(103, "not found")
    }

    pub fn conflict_error() -> Self {
        Self::new(104, "conflict")
    }

    pub fn unauthenticated_error() -> Self {
        Self::new(105, "unauthenticated")
    }

    pub fn env_var_error() -> Self {
        Self::new(1, "environment variable error")
    }

    pub fn database_error() -> Self {
        Self::new(2, "database error")
    }

    pub fn reqwest_error() -> Self {
        Self::new(3, "reqwest error")
    }

    pub fn upstream_error() -> Self {
        Self::new(4, "upstream error")
    }

    pub fn unexpected_error() -> Self {
        Self::new(5, "unexpected error")
    }

    pub fn unavailable_error() -> Self {
        Self::new(6, "service unavailable")
    }

    pub fn authorizor_error() -> Self {
        Self::new(7, "authorization error")
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fields.is_empty() {
            write!(f, "{} ({})", self.message, self.code)
        } else {
            write!(f, "{} ({}): {}", self.message, self.code, self.fields.join(", "))
        }
    }
}

impl std::error::Error for Error {}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        tracing::error!(error = %err, "environment variable error");
        Self::env_var_error()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found_error(),
            sqlx::Error::PoolTimedOut => Self::unavailable_error(),
            err => {
                tracing::error!(error = ?err, "database error");
                Self::database_error()
            }
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!(error = ?err, "reqwest error");
        Self::reqwest_error()
    }
}

impl From<oso::OsoError> for Error {
    fn from(err: oso::OsoError) -> Self {
        tracing::error!(error = ?err, "authorization engine error");
        Self::authorizor_error()
    }
}

impl From<serde_json::Error> for Error {
    fn from(_: serde_json::Error) -> Self {
        Self::invalid_input_error()
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::unavailable_error()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::Validation | ErrorKind::InvalidState => StatusCode::BAD_REQUEST,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let error_message = match self.kind() {
            ErrorKind::Internal => "Internal Server Error",
            _ => self.message.as_str(),
        };

        let body = if self.fields.is_empty() {
            json!({
                "code": self.code,
                "error": error_message,
            })
        } else {
            json!({
                "code": self.code,
                "error": error_message,
                "fields": self.fields,
            })
        };

        (status, Json(body)).into_response()
    }
}

#[test]
fn status_mapping_test() {
    let cases = vec![
        (Error::invalid_input_error(), StatusCode::BAD_REQUEST),
        (Error::invalid_state_error(), StatusCode::BAD_REQUEST),
        (Error::unauthorized_error(), StatusCode::FORBIDDEN),
        (Error::not_found_error(), StatusCode::NOT_FOUND),
        (Error::conflict_error(), StatusCode::CONFLICT),
        (Error::unauthenticated_error(), StatusCode::UNAUTHORIZED),
        (Error::unavailable_error(), StatusCode::SERVICE_UNAVAILABLE),
        (Error::database_error(), StatusCode::INTERNAL_SERVER_ERROR),
    ];

    for (err, status) in cases {
        assert_eq!(err.into_response().status(), status);
    }
}

#[test]
fn retryable_test() {
    assert!(Error::conflict_error().is_retryable());
    assert!(Error::unavailable_error().is_retryable());
    assert!(!Error::invalid_input_error().is_retryable());
    assert!(!Error::unauthorized_error().is_retryable());
    assert!(!Error::invalid_state_error().is_retryable());
}

#[test]
fn invalid_fields_display_test() {
    let err = Error::invalid_fields_error(vec!["from".into(), "seats".into()]);

    assert!(err.is_invalid_input_error());
    assert_eq!(err.to_string(), "invalid input (101): from, seats");
}
