//! Endpoint descriptors.
//!
//! An [`Endpoint`] describes one logical request relative to the client's base URL.
//! It is validated as it is built, so a descriptor that reaches the client is
//! always well formed.

use crate::decode::{self, Conventions};
use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::fmt;

/// The HTTP methods an [`Endpoint`] can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Returns `true` for methods that may carry a request body.
    pub fn allows_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    /// Returns `true` for reads, the only calls eligible for caching.
    pub fn is_read(&self) -> bool {
        matches!(self, HttpMethod::Get)
    }

    pub fn as_method(&self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_method().as_str())
    }
}

/// Description of a single request: method, path, headers, query and body.
///
/// Query parameters keep the order they were added in, so the same descriptor
/// always resolves to the same URL.
///
/// # Examples
///
/// ```
/// use fetchkit::{Endpoint, HttpMethod};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct NewTodo { title: String }
///
/// # fn main() -> Result<(), fetchkit::Error> {
/// let list = Endpoint::get("/todos")
///     .with_query_param("page", "2")
///     .with_query_param("per_page", "50");
/// assert_eq!(list.method(), HttpMethod::Get);
///
/// let create = Endpoint::post("/todos")
///     .with_header("Idempotency-Key", "abc-123")?
///     .with_body(&NewTodo { title: "Write docs".into() })?;
/// assert!(create.body().is_some());
///
/// // GET and DELETE cannot carry a body
/// assert!(Endpoint::get("/todos").with_body(&1).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Endpoint {
    method: HttpMethod,
    path: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
}

impl Endpoint {
    /// Creates a descriptor with no headers, query or body.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Sets a header override, replacing any earlier value for the same name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::invalid_request(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::invalid_request(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Appends a query parameter. Repeated keys are kept, in order.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends several query parameters, in iteration order.
    pub fn with_query_params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Attaches a request body. Fields using the [`decode::date`] helpers are
    /// written as RFC 3339.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the method does not permit a body
    /// (GET, DELETE) or the value cannot be serialized.
    pub fn with_body<B: Serialize + ?Sized>(self, body: &B) -> Result<Self> {
        self.attach_body(|| serde_json::to_value(body))
    }

    /// Attaches a request body, writing [`decode::date`] fields in
    /// `conventions.date_format`. The client's verb helpers use this with the
    /// client's own conventions.
    ///
    /// # Errors
    ///
    /// Same as [`Endpoint::with_body`].
    pub fn with_body_using<B: Serialize + ?Sized>(
        self,
        body: &B,
        conventions: &Conventions,
    ) -> Result<Self> {
        self.attach_body(|| {
            decode::with_date_format(&conventions.date_format, || serde_json::to_value(body))
        })
    }

    fn attach_body(
        mut self,
        render: impl FnOnce() -> serde_json::Result<serde_json::Value>,
    ) -> Result<Self> {
        if !self.method.allows_body() {
            return Err(Error::invalid_request(format!(
                "{} {} cannot carry a request body",
                self.method, self.path
            )));
        }
        let value = render()
            .map_err(|e| Error::invalid_request(format!("Failed to serialize body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }
}
