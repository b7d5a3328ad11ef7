//! Reporting of terminal failures to an external collaborator.
//!
//! Every call that ends in an error, other than a cancellation, produces one
//! [`FailureReport`]. The report is always logged through `tracing`; a
//! [`FailureObserver`] can additionally forward it to analytics.

use crate::endpoint::HttpMethod;
use crate::error::ErrorKind;
use http::StatusCode;

/// Structured description of a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub kind: ErrorKind,
    /// Transport calls made. `0` when the request could not be built.
    pub attempts: usize,
    pub method: HttpMethod,
    /// The endpoint path, without base URL or query.
    pub path: String,
    pub status: Option<StatusCode>,
}

/// Receives a [`FailureReport`] for every terminal failure.
///
/// Closures taking `&FailureReport` implement this trait.
///
/// # Examples
///
/// ```
/// use fetchkit::{Client, FailureReport};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), fetchkit::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .observer(Arc::new(|report: &FailureReport| {
///         eprintln!("{} {} failed: {} after {} attempts",
///             report.method, report.path, report.kind, report.attempts);
///     }))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub trait FailureObserver: Send + Sync {
    fn on_failure(&self, report: &FailureReport);
}

impl<F> FailureObserver for F
where
    F: Fn(&FailureReport) + Send + Sync,
{
    fn on_failure(&self, report: &FailureReport) {
        self(report)
    }
}
