//! # fetchkit - a typed HTTP access layer
//!
//! fetchkit turns endpoint descriptions into typed results. Every call goes
//! through the same pipeline: build the request, send it through a
//! [`Transport`], classify the outcome into a closed [`Error`] set, retry
//! transient failures with backoff, decode the body, and optionally keep the
//! result in a TTL cache.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fetchkit::{Client, Endpoint};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct CreateUser {
//!     name: String,
//!     email: String,
//! }
//!
//! #[derive(Clone, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//!     email: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fetchkit::Error> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com")?
//!         .timeout(Duration::from_secs(30))
//!         .max_attempts(3)
//!         .base_backoff(Duration::from_millis(200))
//!         .build()?;
//!
//!     // Cached GET: a second call within the TTL makes no request
//!     let user: User = client
//!         .execute(&Endpoint::get("/users/123"), Some("user:123"))
//!         .await?;
//!     println!("User: {}", user.name);
//!
//!     // Mutations are never cached; invalidate what they change
//!     let new_user = CreateUser {
//!         name: "Alice".to_string(),
//!         email: "alice@example.com".to_string(),
//!     };
//!     let created: User = client
//!         .execute(&Endpoint::post("/users").with_body(&new_user)?, None)
//!         .await?;
//!     client.invalidate("users:all");
//!     println!("Created user with ID: {}", created.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Failures are classified by kind, which also fixes whether they are retried:
//!
//! | Outcome                      | Variant                     | Retried |
//! |------------------------------|-----------------------------|---------|
//! | 401 / 403 / 404              | `Unauthorized` / `Forbidden` / `NotFound` | no |
//! | 422                          | `ValidationFailed`          | no      |
//! | 5xx                          | `ServerError`               | yes     |
//! | other non-2xx, build errors  | `InvalidRequest`            | no      |
//! | no response                  | `TransportFailure`          | yes     |
//! | 2xx with unexpected body     | `DecodeFailure`             | no      |
//! | caller cancelled             | `Cancelled`                 | no      |
//!
//! ## Features
//!
//! - **Endpoint descriptors** validated at construction, with ordered query parameters
//! - **Closed error taxonomy** with per-kind retryability
//! - **Linear or exponential backoff**, optionally jittered
//! - **TTL response cache** for GET calls, shared across clones of a client
//! - **Wire conventions** for camelCase keys and custom date formats
//! - **Pluggable transport, auth and failure reporting**
//! - **Cancellation** that interrupts requests and retry waits
//! - **Structured logging** with `tracing`

mod client;
mod error;

pub mod auth;
pub mod cache;
pub mod cancel;
pub mod classify;
pub mod decode;
pub mod endpoint;
pub mod observer;
pub mod request;
mod response;
pub mod retry;
pub mod transport;

pub use auth::{AuthProvider, BearerAuth};
pub use cache::TtlCache;
pub use cancel::CancelToken;
pub use client::{CachedValue, Client, ClientBuilder, ClientConfig};
pub use decode::{Conventions, DateFormat, KeyCasing};
pub use endpoint::{Endpoint, HttpMethod};
pub use error::{Error, ErrorKind, FieldError, Result, TransportError};
pub use observer::{FailureObserver, FailureReport};
pub use request::HttpRequest;
pub use response::Response;
pub use retry::{Backoff, RetryDecision, RetryPolicy};
pub use transport::{RawResponse, ReqwestTransport, Transport};
