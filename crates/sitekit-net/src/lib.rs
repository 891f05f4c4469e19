//! # SiteKit Net
//!
//! Request and response types shared by the offline worker, plus the
//! [`Network`] seam the worker fetches through.
//!
//! ## Design Goals
//!
//! 1. **One response type**: network, cache, and synthesized responses look alike
//! 2. **Pluggable network**: `reqwest` in production, [`MockNetwork`] in tests
//! 3. **Cheap clones**: bodies are [`Bytes`], so caching a copy costs a refcount

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use mime::Mime;
use thiserror::Error;
use url::Url;

pub mod http_network;
pub mod mock;

pub use http_network::{HttpNetwork, LoaderConfig};
pub use mock::MockNetwork;

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl Request {
    /// Create a request with an arbitrary method.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        let mut request = Self::new(Method::POST, url);
        request.body = Some(body);
        request
    }

    /// Create a GET request the way a browser issues a document navigation.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).header(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,*/*;q=0.8"),
        )
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Whether the URL scheme is http or https.
    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    /// Whether the request URL shares scheme, host, and port with `origin`.
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }

    /// Whether the `Accept` header asks for an HTML document.
    pub fn accepts_html(&self) -> bool {
        self.headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains(mime::TEXT_HTML.essence_str()))
    }
}

/// HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Create a response.
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            headers,
            body: body.into(),
        }
    }

    /// Create a response with a single `Content-Type` header.
    pub fn with_content_type(
        url: Url,
        status: StatusCode,
        content_type: &Mime,
        body: impl Into<Bytes>,
    ) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(content_type.as_ref()) {
            headers.insert(CONTENT_TYPE, value);
        }
        Self::new(url, status, headers, body)
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Borrow the body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Take the body.
    /// Parsed `Content-Type` header, if any.
    pub fn content_type(&self) -> Option<Mime> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<Mime>().ok())
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }

    /// Get the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        serde_json::from_slice(&self.body).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}

/// Something that can perform a fetch.
///
/// A rejected future means the network itself failed (offline, DNS, reset).
/// HTTP error statuses resolve to `Ok`.
pub trait Network: Send + Sync + 'static {
    fn fetch(&self, request: Request) -> impl Future<Output = Result<Response, NetError>> + Send;
}

impl<N: Network> Network for Arc<N> {
    fn fetch(&self, request: Request) -> impl Future<Output = Result<Response, NetError>> + Send {
        (**self).fetch(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_request_builder() {
        let request = Request::get(url("https://example.com"))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .timeout(Duration::from_secs(10));

        assert_eq!(request.method, Method::GET);
        assert!(request.headers.contains_key("accept"));
        assert_eq!(request.timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_request_id_uniqueness() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_is_http() {
        assert!(Request::get(url("http://example.com/")).is_http());
        assert!(Request::get(url("https://example.com/")).is_http());
        assert!(!Request::get(url("chrome-extension://abc/page.js")).is_http());
        assert!(!Request::get(url("data:text/plain,hi")).is_http());
    }

    #[test]
    fn test_same_origin() {
        let origin = url("https://consultant.dev/");
        assert!(Request::get(url("https://consultant.dev/blog")).is_same_origin(&origin));
        assert!(!Request::get(url("https://external.example.com/x")).is_same_origin(&origin));
        assert!(!Request::get(url("http://consultant.dev/blog")).is_same_origin(&origin));
        assert!(!Request::get(url("https://consultant.dev:8443/")).is_same_origin(&origin));
    }

    #[test]
    fn test_accepts_html() {
        assert!(Request::navigate(url("https://consultant.dev/")).accepts_html());
        assert!(!Request::get(url("https://consultant.dev/app.js")).accepts_html());

        let json = Request::get(url("https://consultant.dev/api"))
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        assert!(!json.accepts_html());
    }

    #[test]
    fn test_response_helpers() {
        let response = Response::with_content_type(
            url("https://consultant.dev/data.json"),
            StatusCode::OK,
            &mime::APPLICATION_JSON,
            r#"{"talks": 3}"#,
        );

        assert!(response.ok());
        assert_eq!(response.content_type(), Some(mime::APPLICATION_JSON));

        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["talks"], 3);
    }

    #[test]
    fn test_response_not_ok() {
        let response = Response::new(
            url("https://consultant.dev/gone"),
            StatusCode::NOT_FOUND,
            HeaderMap::new(),
            Bytes::new(),
        );
        assert!(!response.ok());
        assert_eq!(response.text().unwrap(), "");
    }
}
