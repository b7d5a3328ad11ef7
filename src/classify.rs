//! Mapping of raw transport outcomes onto [`Error`].

use crate::error::{FieldError, TransportError};
use crate::transport::RawResponse;
use crate::Error;
use http::StatusCode;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Classifies the outcome of one transport call.
///
/// Returns `None` when the response is a success and should be decoded.
pub fn classify(outcome: &Result<RawResponse, TransportError>) -> Option<Error> {
    match outcome {
        Ok(response) => classify_status(response.status, &response.body),
        Err(err) => Some(classify_transport(err.clone())),
    }
}

/// Classifies a response by status code.
///
/// `body` is only consulted for 422, to recover field errors.
///
/// # Examples
///
/// ```
/// use fetchkit::{classify::classify_status, Error};
/// use http::StatusCode;
///
/// assert!(classify_status(StatusCode::CREATED, b"").is_none());
/// assert!(matches!(classify_status(StatusCode::NOT_FOUND, b""), Some(Error::NotFound)));
/// assert!(classify_status(StatusCode::BAD_GATEWAY, b"").unwrap().is_retryable());
/// ```
pub fn classify_status(status: StatusCode, body: &[u8]) -> Option<Error> {
    if status.is_success() {
        return None;
    }
    let error = match status.as_u16() {
        401 => Error::Unauthorized,
        403 => Error::Forbidden,
        404 => Error::NotFound,
        422 => Error::ValidationFailed {
            errors: parse_field_errors(body),
        },
        500..=599 => Error::ServerError { status },
        _ => Error::InvalidRequest {
            reason: format!("Unexpected status {}", status),
            status: Some(status),
        },
    };
    Some(error)
}

/// Classifies a failure that produced no status code.
///
/// A cancellation seen by the transport is reported as [`Error::Cancelled`],
/// never as a retryable transport failure.
pub fn classify_transport(err: TransportError) -> Error {
    match err {
        TransportError::Cancelled => Error::Cancelled,
        other => Error::TransportFailure(other),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ValidationBody {
    List { errors: Vec<FieldError> },
    Keyed { errors: BTreeMap<String, Vec<String>> },
    Bare(Vec<FieldError>),
}

/// Best-effort: an unrecognized body yields an empty list.
fn parse_field_errors(body: &[u8]) -> Vec<FieldError> {
    match serde_json::from_slice::<ValidationBody>(body) {
        Ok(ValidationBody::List { errors }) | Ok(ValidationBody::Bare(errors)) => errors,
        Ok(ValidationBody::Keyed { errors }) => errors
            .into_iter()
            .flat_map(|(field, messages)| {
                messages.into_iter().map(move |message| FieldError {
                    field: field.clone(),
                    message,
                })
            })
            .collect(),
        Err(e) => {
            tracing::debug!(error = %e, "Unrecognized validation error body");
            Vec::new()
        }
    }
}
