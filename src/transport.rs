//! The network boundary.
//!
//! The client never talks to the network directly; it hands each
//! [`HttpRequest`] to a [`Transport`]. [`ReqwestTransport`] is the default.
//! Tests and embedders can supply their own implementation.

use crate::error::TransportError;
use crate::request::HttpRequest;
use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A response as received from the transport, before classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Executes one request attempt.
///
/// Implementations must not retry on their own; retries belong to the client.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use fetchkit::{HttpRequest, RawResponse, Transport, TransportError};
/// use http::{HeaderMap, StatusCode};
///
/// struct AlwaysEmpty;
///
/// #[async_trait]
/// impl Transport for AlwaysEmpty {
///     async fn send(&self, _request: &HttpRequest) -> Result<RawResponse, TransportError> {
///         Ok(RawResponse {
///             status: StatusCode::OK,
///             headers: HeaderMap::new(),
///             body: b"[]".to_vec(),
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<RawResponse, TransportError>;
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// Creates a transport with its own connection pool.
    ///
    /// `timeout` applies to each attempt separately.
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(http_client, timeout))
    }

    /// Wraps an existing `reqwest::Client`, e.g. one shared with other code.
    pub fn with_client(http_client: reqwest::Client, timeout: Option<Duration>) -> Self {
        Self {
            http_client,
            timeout,
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let mut builder = self
            .http_client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
