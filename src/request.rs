//! Turning an [`Endpoint`] into a concrete [`HttpRequest`].

use crate::decode::{encode_body, Conventions};
use crate::endpoint::Endpoint;
use crate::{Error, Result};
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method};
use url::Url;

/// A fully resolved request, ready to hand to a [`Transport`](crate::Transport).
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// Builds the request for `endpoint`.
///
/// Header precedence, lowest to highest: `default_headers`, `ambient_headers`
/// (e.g. authorization), then the endpoint's own headers. A header set at a
/// higher level replaces every value of that name from lower levels.
///
/// No I/O happens here.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] if the URL cannot be formed or the body
/// cannot be serialized.
///
/// # Examples
///
/// ```
/// use fetchkit::{request::build_request, decode::Conventions, Endpoint};
/// use http::HeaderMap;
/// use url::Url;
///
/// let base = Url::parse("https://api.example.com/v2").unwrap();
/// let endpoint = Endpoint::get("/users").with_query_param("page", "3");
///
/// let request = build_request(
///     &base,
///     &HeaderMap::new(),
///     &Conventions::default(),
///     &endpoint,
///     &HeaderMap::new(),
/// ).unwrap();
/// assert_eq!(request.url.as_str(), "https://api.example.com/v2/users?page=3");
/// ```
pub fn build_request(
    base_url: &Url,
    default_headers: &HeaderMap,
    conventions: &Conventions,
    endpoint: &Endpoint,
    ambient_headers: &HeaderMap,
) -> Result<HttpRequest> {
    let url = resolve_url(base_url, endpoint)?;

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    let body = match endpoint.body() {
        Some(body) => {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Some(encode_body(body, conventions)?)
        }
        None => None,
    };
    for layer in [default_headers, ambient_headers, endpoint.headers()] {
        merge_headers(&mut headers, layer);
    }

    Ok(HttpRequest {
        method: endpoint.method().as_method(),
        url,
        headers,
        body,
    })
}

/// Joins the endpoint path onto the base URL's path and appends the query
/// parameters in order, after any query the base URL already carries.
fn resolve_url(base_url: &Url, endpoint: &Endpoint) -> Result<Url> {
    if base_url.cannot_be_a_base() {
        return Err(Error::invalid_request(format!(
            "Base URL {} cannot be a base",
            base_url
        )));
    }
    let relative = endpoint.path().trim_start_matches('/');
    if relative.contains('?') || relative.contains('#') {
        return Err(Error::invalid_request(format!(
            "Endpoint path {:?} must not contain a query or fragment",
            endpoint.path()
        )));
    }

    let mut url = base_url.clone();
    let path = format!("{}/{}", base_url.path().trim_end_matches('/'), relative);
    url.set_path(&path);
    url.set_fragment(None);

    if !endpoint.query().is_empty() {
        url.query_pairs_mut()
            .extend_pairs(endpoint.query().iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    Ok(url)
}

fn merge_headers(target: &mut HeaderMap, layer: &HeaderMap) {
    for name in layer.keys() {
        target.remove(name);
        for value in layer.get_all(name) {
            target.append(name.clone(), value.clone());
        }
    }
}
