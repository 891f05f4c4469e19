//! Fetch interception building blocks: eligibility, cache policy, and the
//! synthetic responses served when both network and cache come up empty.

use bytes::Bytes;
use http::{Method, StatusCode};
use sitekit_net::{Request, Response};
use url::Url;

/// Built-in offline document. Self-contained so it renders without network.
pub const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline</title>
<style>
body{margin:0;min-height:100vh;display:flex;align-items:center;justify-content:center;font-family:system-ui,-apple-system,sans-serif;background:#0f172a;color:#e2e8f0;text-align:center}
main{padding:2rem;max-width:28rem}
button{margin-top:1.5rem;padding:.75rem 1.5rem;border:0;border-radius:.5rem;background:#3b82f6;color:#fff;font-size:1rem;cursor:pointer}
</style>
</head>
<body>
<main>
<h1>You're Offline</h1>
<p>It looks like you've lost your internet connection. Check your connection and try again.</p>
<button onclick="window.location.reload()">Try Again</button>
</main>
</body>
</html>
"#;

/// Body of the 503 served for non-document requests.
pub const UNAVAILABLE_BODY: &str = "Offline";

/// How a fetch event was resolved.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Not intercepted; the host must perform the request unmodified.
    Passthrough(Request),
    /// Live network response.
    Network(Response),
    /// Network failed; served from the cache store.
    Cache(Response),
    /// Network failed, nothing cached, document request.
    OfflinePage(Response),
    /// Network failed, nothing cached, any other request.
    Unavailable(Response),
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Passthrough(_) => None,
            FetchOutcome::Network(r)
            | FetchOutcome::Cache(r)
            | FetchOutcome::OfflinePage(r)
            | FetchOutcome::Unavailable(r) => Some(r),
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Passthrough(_) => None,
            FetchOutcome::Network(r)
            | FetchOutcome::Cache(r)
            | FetchOutcome::OfflinePage(r)
            | FetchOutcome::Unavailable(r) => Some(r),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, FetchOutcome::Passthrough(_))
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Passthrough(_) => "passthrough",
            FetchOutcome::Network(_) => "network",
            FetchOutcome::Cache(_) => "cache",
            FetchOutcome::OfflinePage(_) => "offline-page",
            FetchOutcome::Unavailable(_) => "unavailable",
        }
    }
}

/// Only GETs over http(s) are intercepted.
pub fn is_interceptable(request: &Request) -> bool {
    request.method == Method::GET && request.is_http()
}

/// Only exact 200s for same-origin URLs are written to the cache.
pub fn should_cache(request: &Request, response: &Response, origin: &Url) -> bool {
    response.status == StatusCode::OK && request.is_same_origin(origin)
}

/// The offline document, status 200.
pub fn offline_page_response(url: Url, html: Bytes) -> Response {
    Response::with_content_type(url, StatusCode::OK, &mime::TEXT_HTML, html)
}

/// Plain-text 503 `Offline`.
pub fn unavailable_response(url: Url) -> Response {
    Response::with_content_type(
        url,
        StatusCode::SERVICE_UNAVAILABLE,
        &mime::TEXT_PLAIN,
        Bytes::from_static(UNAVAILABLE_BODY.as_bytes()),
    )
}
