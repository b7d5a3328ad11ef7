//! Response wrapper carrying decoded data plus call details.

use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A successful call's result.
///
/// Besides the decoded `data` it records how the value was obtained: over the
/// network (with status, headers and attempt count) or from the TTL cache.
///
/// # Examples
///
/// ```no_run
/// use fetchkit::{Client, Endpoint};
/// use serde::Deserialize;
///
/// #[derive(Clone, Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), fetchkit::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// let response = client.send::<User>(&Endpoint::get("/users/123"), Some("user:123")).await?;
///
/// println!("User: {}", response.name);
/// println!("Request took {:?}", response.latency);
/// if response.from_cache {
///     println!("Served from cache");
/// } else {
///     println!("Status {:?} after {} attempts", response.status, response.attempts);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The decoded response data.
    pub data: T,

    /// The HTTP status code, `None` for cache hits.
    pub status: Option<StatusCode>,

    /// The response headers, empty for cache hits.
    pub headers: HeaderMap,

    /// Time from the start of the call until the value was available,
    /// including retry waits.
    pub latency: Duration,

    /// Transport calls made. `0` for cache hits.
    pub attempts: usize,

    /// Whether `data` came from the TTL cache.
    pub from_cache: bool,
}

impl<T> Response<T> {
    pub(crate) fn fetched(
        data: T,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            data,
            status: Some(status),
            headers,
            latency,
            attempts,
            from_cache: false,
        }
    }

    pub(crate) fn cached(data: T, latency: Duration) -> Self {
        Self {
            data,
            status: None,
            headers: HeaderMap::new(),
            latency,
            attempts: 0,
            from_cache: true,
        }
    }

    /// Maps the response data to a different type, keeping the details.
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
            from_cache: self.from_cache,
        }
    }

    /// Returns `true` if the request required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
