//! HTTP client with retry logic, response caching and classified errors.
//!
//! The [`Client`] type is the main entry point for making HTTP requests.
//! Use [`ClientBuilder`] to configure and create clients.

use crate::{
    auth::AuthProvider,
    cache::TtlCache,
    cancel::{self, CancelToken},
    classify::{classify_status, classify_transport},
    decode::{self, Conventions, DateFormat, KeyCasing},
    endpoint::Endpoint,
    observer::{FailureObserver, FailureReport},
    request::{build_request, HttpRequest},
    retry::{Backoff, RetryDecision, RetryPolicy},
    transport::{ReqwestTransport, Transport},
    Error, Response, Result,
};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{de::DeserializeOwned, Serialize};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Values stored in the client's response cache.
///
/// Each entry holds the decoded value of the call that stored it; a lookup with
/// a different target type is treated as a miss.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Immutable settings shared by every call made through one [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub default_headers: HeaderMap,
    pub retry: RetryPolicy,
    pub conventions: Conventions,
    /// Per-attempt timeout applied by the default transport.
    pub timeout: Option<Duration>,
    pub cache_ttl: Duration,
}

/// An HTTP client for making typed API calls.
///
/// The client is cheap to clone and designed to be shared: clones use the same
/// configuration, transport and response cache.
///
/// # Examples
///
/// ```no_run
/// use fetchkit::{Client, Endpoint};
/// use std::time::Duration;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize)]
/// struct CreateUser {
///     name: String,
///     email: String,
/// }
///
/// #[derive(Clone, Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
///     email: String,
/// }
///
/// # async fn example() -> Result<(), fetchkit::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .max_attempts(4)
///     .base_backoff(Duration::from_millis(200))
///     .cache_ttl(Duration::from_secs(120))
///     .build()?;
///
/// // GET, cached under "user:123"
/// let user: User = client.execute(&Endpoint::get("/users/123"), Some("user:123")).await?;
/// println!("User: {}", user.name);
///
/// // POST, never cached; drop stale reads afterwards
/// let new_user = CreateUser {
///     name: "Alice".to_string(),
///     email: "alice@example.com".to_string(),
/// };
/// let created: User = client
///     .execute(&Endpoint::post("/users").with_body(&new_user)?, None)
///     .await?;
/// client.invalidate("users:list");
/// println!("Created user with ID: {}", created.id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    auth: Option<Arc<dyn AuthProvider>>,
    observer: Option<Arc<dyn FailureObserver>>,
    cache: TtlCache<CachedValue>,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The response cache shared by all clones of this client.
    pub fn cache(&self) -> &TtlCache<CachedValue> {
        &self.inner.cache
    }

    /// Drops the cached value for `key`. Returns `true` if one was live.
    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.cache.invalidate(key)
    }

    /// Drops every cached value.
    pub fn clear(&self) {
        self.inner.cache.clear()
    }

    /// Runs `endpoint` and decodes the response into `T`.
    ///
    /// For GET endpoints with a `cache_key`, a live cached value is returned
    /// without any network call, and a freshly decoded value is stored under
    /// the key. For every other method the key is ignored: mutating calls never
    /// read or write the cache, so callers should [`invalidate`](Self::invalidate)
    /// affected keys themselves.
    ///
    /// # Errors
    ///
    /// Returns the classified [`Error`] of the last attempt. Server errors and
    /// transport failures are retried according to the configured
    /// [`RetryPolicy`]; everything else fails on the first attempt.
    pub async fn execute<T>(&self, endpoint: &Endpoint, cache_key: Option<&str>) -> Result<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.run(endpoint, cache_key, None).await.map(Response::into_data)
    }

    /// Like [`execute`](Self::execute), but stops with [`Error::Cancelled`] as
    /// soon as `cancel` fires, including during a retry wait.
    pub async fn execute_with_cancel<T>(
        &self,
        endpoint: &Endpoint,
        cache_key: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.run(endpoint, cache_key, Some(cancel))
            .await
            .map(Response::into_data)
    }

    /// Like [`execute`](Self::execute), returning the full [`Response`].
    pub async fn send<T>(&self, endpoint: &Endpoint, cache_key: Option<&str>) -> Result<Response<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.run(endpoint, cache_key, None).await
    }

    /// Like [`execute_with_cancel`](Self::execute_with_cancel), returning the
    /// full [`Response`].
    pub async fn send_with_cancel<T>(
        &self,
        endpoint: &Endpoint,
        cache_key: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Response<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.run(endpoint, cache_key, Some(cancel)).await
    }

    async fn run<T>(
        &self,
        endpoint: &Endpoint,
        cache_key: Option<&str>,
        cancel: Option<&CancelToken>,
    ) -> Result<Response<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let start_time = Instant::now();
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(Error::Cancelled);
        }

        let cache_key = match cache_key {
            Some(key) if endpoint.method().is_read() => Some(key),
            Some(key) => {
                tracing::debug!(
                    key = key,
                    method = %endpoint.method(),
                    path = %endpoint.path(),
                    "Ignoring cache key for mutating request"
                );
                None
            }
            None => None,
        };

        if let Some(key) = cache_key {
            if let Some(data) = self.cached::<T>(key) {
                tracing::debug!(key = key, path = %endpoint.path(), "Cache hit");
                return Ok(Response::cached(data, start_time.elapsed()));
            }
        }

        let ambient_headers = match &self.inner.auth {
            Some(auth) => auth.ambient_headers(),
            None => HeaderMap::new(),
        };
        let request = match build_request(
            &self.inner.config.base_url,
            &self.inner.config.default_headers,
            &self.inner.config.conventions,
            endpoint,
            &ambient_headers,
        ) {
            Ok(request) => request,
            Err(e) => return Err(self.fail(endpoint, e, 0)),
        };

        let response = self.call::<T>(endpoint, &request, cancel, start_time).await?;

        if let Some(key) = cache_key {
            let value: CachedValue = Arc::new(response.data.clone());
            self.inner.cache.set(key, value);
            tracing::debug!(key = key, ttl_ms = self.inner.cache.ttl().as_millis(), "Stored response in cache");
        }
        Ok(response)
    }

    /// The attempt loop: send, classify, then decode or consult the retry policy.
    async fn call<T>(
        &self,
        endpoint: &Endpoint,
        request: &HttpRequest,
        cancel: Option<&CancelToken>,
        start_time: Instant,
    ) -> Result<Response<T>>
    where
        T: DeserializeOwned,
    {
        let policy = &self.inner.config.retry;
        let mut attempt = 0;

        loop {
            tracing::debug!(
                method = %request.method,
                url = %request.url,
                attempt = attempt,
                "Executing HTTP request"
            );

            let outcome = tokio::select! {
                biased;
                _ = cancel::cancelled(cancel) => return Err(self.cancelled(endpoint, attempt)),
                outcome = self.inner.transport.send(request) => outcome,
            };

            let error = match outcome {
                Ok(raw) => {
                    tracing::info!(
                        status = raw.status.as_u16(),
                        latency_ms = start_time.elapsed().as_millis(),
                        attempt = attempt,
                        "Received HTTP response"
                    );
                    match classify_status(raw.status, &raw.body) {
                        None => {
                            return match decode::decode::<T>(
                                raw.status,
                                &raw.body,
                                &self.inner.config.conventions,
                            ) {
                                Ok(data) => Ok(Response::fetched(
                                    data,
                                    raw.status,
                                    raw.headers,
                                    start_time.elapsed(),
                                    attempt + 1,
                                )),
                                Err(e) => Err(self.fail(endpoint, e, attempt + 1)),
                            };
                        }
                        Some(error) => error,
                    }
                }
                Err(transport_error) => classify_transport(transport_error),
            };

            if error.is_cancelled() {
                return Err(self.cancelled(endpoint, attempt));
            }

            match policy.should_retry(attempt, &error) {
                RetryDecision::Stop => return Err(self.fail(endpoint, error, attempt + 1)),
                RetryDecision::Retry { delay } => {
                    tracing::warn!(
                        error = %error,
                        kind = %error.kind(),
                        attempt = attempt,
                        delay_ms = delay.as_millis(),
                        method = %endpoint.method(),
                        path = %endpoint.path(),
                        "Request failed, retrying after delay"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel::cancelled(cancel) => {
                            return Err(self.cancelled(endpoint, attempt + 1));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    fn cached<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let value = self.inner.cache.get(key)?;
        match Arc::downcast::<T>(value) {
            Ok(data) => Some(T::clone(&data)),
            Err(_) => {
                tracing::warn!(
                    key = key,
                    expected = std::any::type_name::<T>(),
                    "Cached value has a different type, treating as miss"
                );
                None
            }
        }
    }

    /// Logs and reports a terminal failure, then hands the error back.
    fn fail(&self, endpoint: &Endpoint, error: Error, attempts: usize) -> Error {
        tracing::error!(
            error = %error,
            kind = %error.kind(),
            attempts = attempts,
            method = %endpoint.method(),
            path = %endpoint.path(),
            "Request failed permanently"
        );

        if matches!(error, Error::Unauthorized) {
            if let Some(auth) = &self.inner.auth {
                auth.on_unauthorized();
            }
        }

        if let Some(observer) = &self.inner.observer {
            observer.on_failure(&FailureReport {
                kind: error.kind(),
                attempts,
                method: endpoint.method(),
                path: endpoint.path().to_string(),
                status: error.status(),
            });
        }
        error
    }

    fn cancelled(&self, endpoint: &Endpoint, attempts: usize) -> Error {
        tracing::info!(
            attempts = attempts,
            method = %endpoint.method(),
            path = %endpoint.path(),
            "Request cancelled"
        );
        Error::Cancelled
    }

    /// Makes an uncached GET request to the specified path.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fetchkit::Client;
    /// use serde::Deserialize;
    ///
    /// #[derive(Clone, Deserialize)]
    /// struct User { name: String }
    ///
    /// # async fn example() -> Result<(), fetchkit::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://api.example.com")?
    ///     .build()?;
    ///
    /// let user: fetchkit::Response<User> = client.get("/users/123").await?;
    /// println!("User: {}", user.data.name);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get<Res>(&self, path: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.send(&Endpoint::get(path), None).await
    }

    /// Makes a POST request to the specified path with a JSON body.
    pub async fn post<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let endpoint =
            Endpoint::post(path).with_body_using(body, &self.inner.config.conventions)?;
        self.send(&endpoint, None).await
    }

    /// Makes a PUT request to the specified path with a JSON body.
    pub async fn put<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let endpoint =
            Endpoint::put(path).with_body_using(body, &self.inner.config.conventions)?;
        self.send(&endpoint, None).await
    }

    /// Makes a PATCH request to the specified path with a JSON body.
    pub async fn patch<Req, Res>(
        &self,
        path: impl Into<String>,
        body: &Req,
    ) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let endpoint =
            Endpoint::patch(path).with_body_using(body, &self.inner.config.conventions)?;
        self.send(&endpoint, None).await
    }

    /// Makes a DELETE request to the specified path.
    pub async fn delete<Res>(&self, path: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.send(&Endpoint::delete(path), None).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .field("auth", &self.inner.auth.is_some())
            .field("observer", &self.inner.observer.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use fetchkit::{Backoff, BearerAuth, ClientBuilder, KeyCasing};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), fetchkit::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(30))
///     .max_attempts(5)
///     .base_backoff(Duration::from_millis(100))
///     .backoff(Backoff::Exponential { jitter: true })
///     .key_casing(KeyCasing::CamelCase)
///     .auth(Arc::new(BearerAuth::new("token")))
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    default_headers: HeaderMap,
    retry: RetryPolicy,
    conventions: Conventions,
    timeout: Option<Duration>,
    cache_ttl: Duration,
    transport: Option<Arc<dyn Transport>>,
    auth: Option<Arc<dyn AuthProvider>>,
    observer: Option<Arc<dyn FailureObserver>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings: three attempts,
    /// 250 ms linear backoff, a 60 second cache TTL and no timeout.
    pub fn new() -> Self {
        Self {
            base_url: None,
            default_headers: HeaderMap::new(),
            retry: RetryPolicy::default(),
            conventions: Conventions::default(),
            timeout: None,
            cache_ttl: Duration::from_secs(60),
            transport: None,
            auth: None,
            observer: None,
        }
    }

    /// Sets the base URL all endpoint paths are resolved against.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(url.as_ref())
            .map_err(|e| Error::invalid_request(format!("Invalid base URL: {}", e)))?;
        self.base_url = Some(url);
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::invalid_request(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::invalid_request(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Total attempts per call, including the first. Must be at least 1.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    /// Delay unit for backoff. Must be non-zero unless `max_attempts` is 1.
    pub fn base_backoff(mut self, base_backoff: Duration) -> Self {
        self.retry.base_backoff = base_backoff;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.retry.backoff = backoff;
        self
    }

    /// Replaces attempt budget, base delay and backoff shape at once.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn conventions(mut self, conventions: Conventions) -> Self {
        self.conventions = conventions;
        self
    }

    pub fn key_casing(mut self, key_casing: KeyCasing) -> Self {
        self.conventions.key_casing = key_casing;
        self
    }

    pub fn date_format(mut self, date_format: DateFormat) -> Self {
        self.conventions.date_format = date_format;
        self
    }

    /// Sets the per-attempt timeout of the default transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Replaces the default `reqwest` transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn FailureObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if no base URL was provided, the retry
    /// settings fail [`RetryPolicy::validate`], or the HTTP client cannot be
    /// created.
    pub fn build(self) -> Result<Client> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::invalid_request("Base URL is required"))?;

        self.retry.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::new(self.timeout)
                    .map_err(|e| Error::invalid_request(e.to_string()))?,
            ),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                config: ClientConfig {
                    base_url,
                    default_headers: self.default_headers,
                    retry: self.retry,
                    conventions: self.conventions,
                    timeout: self.timeout,
                    cache_ttl: self.cache_ttl,
                },
                transport,
                auth: self.auth,
                observer: self.observer,
                cache: TtlCache::new(self.cache_ttl),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
