//! Error types for HTTP API calls.
//!
//! Every failed call resolves to exactly one [`Error`] variant. The set is closed so
//! retry and reporting logic can match on it exhaustively. Whether a variant may be
//! retried is fixed by its kind, see [`Error::is_retryable`].

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The main error type for HTTP API calls.
///
/// [`Error::Cancelled`] is not a failure of the remote call: it reports that the
/// caller abandoned the operation. It is never retried, never cached and never
/// handed to a [`FailureObserver`](crate::observer::FailureObserver).
///
/// # Examples
///
/// ```no_run
/// use fetchkit::{Client, Endpoint, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// match client.execute::<serde_json::Value>(&Endpoint::get("/me"), None).await {
///     Ok(me) => println!("Hello {me}"),
///     Err(Error::Unauthorized) => eprintln!("Please sign in again"),
///     Err(Error::ValidationFailed { errors }) => {
///         for e in errors {
///             eprintln!("{}: {}", e.field, e.message);
///         }
///     }
///     Err(e) if e.is_retryable() => eprintln!("Temporary problem: {e}"),
///     Err(e) => eprintln!("Request failed: {e}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request could not be built or the server rejected it with a status
    /// that has no more specific variant.
    ///
    /// `status` is `None` when the problem was caught before anything was sent
    /// (bad URL, bad header, body on a GET, body serialization).
    #[error("Invalid request: {reason}")]
    InvalidRequest {
        /// Human readable description of the problem
        reason: String,
        /// The raw status code, if the server produced one
        status: Option<StatusCode>,
    },

    /// The server answered 401.
    #[error("Unauthorized")]
    Unauthorized,

    /// The server answered 403.
    #[error("Forbidden")]
    Forbidden,

    /// The server answered 404.
    #[error("Not found")]
    NotFound,

    /// The server answered 422.
    ///
    /// `errors` is decoded best-effort from the response body and is empty when
    /// the body had no recognizable shape.
    #[error("Validation failed ({} field errors)", errors.len())]
    ValidationFailed {
        /// Per-field validation messages
        errors: Vec<FieldError>,
    },

    /// The server answered with a 5xx status.
    #[error("Server error {status}")]
    ServerError {
        /// The HTTP status code
        status: StatusCode,
    },

    /// The request never produced a status code.
    #[error("Transport failure: {0}")]
    TransportFailure(#[from] TransportError),

    /// A successful response body did not match the expected type.
    ///
    /// The raw body is kept so the payload can be inspected when this shows up in
    /// production logs.
    #[error("Failed to decode response (status {status}): {message}")]
    DecodeFailure {
        /// The decoder's error message
        message: String,
        /// The raw response body
        raw_response: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// The caller cancelled the operation.
    #[error("Request cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn invalid_request(reason: impl Into<String>) -> Self {
        Error::InvalidRequest {
            reason: reason.into(),
            status: None,
        }
    }

    /// Returns `true` if repeating the request may produce a different outcome.
    ///
    /// Only [`Error::ServerError`] and [`Error::TransportFailure`] are retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use fetchkit::Error;
    /// use http::StatusCode;
    ///
    /// assert!(Error::ServerError { status: StatusCode::BAD_GATEWAY }.is_retryable());
    /// assert!(!Error::NotFound.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ServerError { .. } => true,
            Error::TransportFailure(_) => true,
            Error::InvalidRequest { .. } => false,
            Error::Unauthorized => false,
            Error::Forbidden => false,
            Error::NotFound => false,
            Error::ValidationFailed { .. } => false,
            Error::DecodeFailure { .. } => false,
            Error::Cancelled => false,
        }
    }

    /// Returns `true` for the cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns the fieldless kind of this error, suitable for metrics labels.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Error::Unauthorized => ErrorKind::Unauthorized,
            Error::Forbidden => ErrorKind::Forbidden,
            Error::NotFound => ErrorKind::NotFound,
            Error::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            Error::ServerError { .. } => ErrorKind::ServerError,
            Error::TransportFailure(_) => ErrorKind::TransportFailure,
            Error::DecodeFailure { .. } => ErrorKind::DecodeFailure,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::InvalidRequest { status, .. } => *status,
            Error::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            Error::Forbidden => Some(StatusCode::FORBIDDEN),
            Error::NotFound => Some(StatusCode::NOT_FOUND),
            Error::ValidationFailed { .. } => Some(StatusCode::UNPROCESSABLE_ENTITY),
            Error::ServerError { status } => Some(*status),
            Error::DecodeFailure { status, .. } => Some(*status),
            Error::TransportFailure(_) | Error::Cancelled => None,
        }
    }

    /// Returns the raw response body for decode failures.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::DecodeFailure { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Returns the field errors of a validation failure, or an empty slice.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Error::ValidationFailed { errors } => errors,
            _ => &[],
        }
    }
}

/// Fieldless discriminant of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    ValidationFailed,
    ServerError,
    TransportFailure,
    DecodeFailure,
    Cancelled,
}

impl ErrorKind {
    /// Stable snake_case name, used as the `kind` field in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::ServerError => "server_error",
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::DecodeFailure => "decode_failure",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a 422 response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Why a transport could not produce a response.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The attempt exceeded its timeout.
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established (refused, reset, DNS).
    #[error("connection failed: {0}")]
    Connect(String),

    /// The transport observed a cancellation of the in-flight request.
    #[error("request cancelled")]
    Cancelled,

    /// Anything else the transport reported.
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// A specialized `Result` type for HTTP API calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_only_for_server_and_transport() {
        let retryable = [
            Error::ServerError {
                status: StatusCode::SERVICE_UNAVAILABLE,
            },
            Error::TransportFailure(TransportError::Timeout),
        ];
        for err in &retryable {
            assert!(err.is_retryable(), "{err:?} should be retryable");
        }

        let terminal = [
            Error::invalid_request("bad"),
            Error::Unauthorized,
            Error::Forbidden,
            Error::NotFound,
            Error::ValidationFailed { errors: vec![] },
            Error::DecodeFailure {
                message: "missing field".into(),
                raw_response: "{}".into(),
                status: StatusCode::OK,
            },
            Error::Cancelled,
        ];
        for err in &terminal {
            assert!(!err.is_retryable(), "{err:?} should not be retryable");
        }
    }

    #[test]
    fn status_is_reported_per_variant() {
        assert_eq!(Error::NotFound.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(
            Error::ValidationFailed { errors: vec![] }.status(),
            Some(StatusCode::UNPROCESSABLE_ENTITY)
        );
        assert_eq!(Error::invalid_request("no url").status(), None);
        assert_eq!(Error::Cancelled.status(), None);
    }

    #[test]
    fn kind_names_are_snake_case() {
        assert_eq!(Error::Forbidden.kind().to_string(), "forbidden");
        assert_eq!(
            Error::TransportFailure(TransportError::Connect("reset".into()))
                .kind()
                .as_str(),
            "transport_failure"
        );
    }
}
