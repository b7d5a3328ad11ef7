//! Authentication hooks.
//!
//! The client asks an [`AuthProvider`] for ambient headers on every call and
//! tells it when a call ends in `401 Unauthorized`. Refreshing credentials is
//! left to the provider; the client itself never retries a 401.

use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};
use std::sync::RwLock;

/// Supplies credentials for outgoing requests.
pub trait AuthProvider: Send + Sync {
    /// Headers merged into every request, above client defaults and below
    /// endpoint overrides.
    fn ambient_headers(&self) -> HeaderMap;

    /// Called once when a call fails with [`Error::Unauthorized`](crate::Error::Unauthorized).
    fn on_unauthorized(&self) {}
}

type UnauthorizedHook = Box<dyn Fn() + Send + Sync>;

/// Bearer-token [`AuthProvider`] whose token can be swapped at runtime.
///
/// # Examples
///
/// ```
/// use fetchkit::{AuthProvider, BearerAuth};
///
/// let auth = BearerAuth::new("initial-token")
///     .with_unauthorized_hook(|| eprintln!("session expired"));
/// assert_eq!(auth.ambient_headers()["authorization"], "Bearer initial-token");
///
/// auth.clear_token();
/// assert!(auth.ambient_headers().is_empty());
/// ```
pub struct BearerAuth {
    token: RwLock<Option<String>>,
    unauthorized_hook: Option<UnauthorizedHook>,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
            unauthorized_hook: None,
        }
    }

    /// A provider that sends no credentials until [`set_token`](Self::set_token).
    pub fn anonymous() -> Self {
        Self {
            token: RwLock::new(None),
            unauthorized_hook: None,
        }
    }

    /// Registers a callback run when the server rejects the token.
    pub fn with_unauthorized_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.unauthorized_hook = Some(Box::new(hook));
        self
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(|p| p.into_inner()) = Some(token.into());
    }

    pub fn clear_token(&self) {
        *self.token.write().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

impl AuthProvider for BearerAuth {
    fn ambient_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let token = self.token.read().unwrap_or_else(|p| p.into_inner());
        if let Some(token) = token.as_deref() {
            match HeaderValue::try_from(format!("Bearer {}", token)) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(e) => tracing::warn!(error = %e, "Bearer token is not a valid header value"),
            }
        }
        headers
    }

    fn on_unauthorized(&self) {
        if let Some(hook) = &self.unauthorized_hook {
            hook();
        }
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth")
            .field("token", &"<redacted>")
            .field("unauthorized_hook", &self.unauthorized_hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn token_can_be_replaced() {
        let auth = BearerAuth::anonymous();
        assert!(auth.ambient_headers().is_empty());

        auth.set_token("abc");
        let headers = auth.ambient_headers();
        assert_eq!(headers[AUTHORIZATION], "Bearer abc");
        assert!(headers[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn invalid_token_is_skipped() {
        let auth = BearerAuth::new("line\nbreak");
        assert!(auth.ambient_headers().is_empty());
    }

    #[test]
    fn hook_runs_on_unauthorized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let auth = BearerAuth::new("secret-token").with_unauthorized_hook({
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        auth.on_unauthorized();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!format!("{:?}", auth).contains("secret"));
    }
}
