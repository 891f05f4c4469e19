//! Scripted in-memory network for tests and demos.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use mime::Mime;
use tracing::trace;
use url::Url;

use crate::{NetError, Network, Request, Response};

/// What the mock does for a given URL.
#[derive(Debug, Clone)]
enum Route {
    Respond {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    Fail(String),
    Hang,
}

/// A network whose answers are scripted per URL.
///
/// Unscripted URLs answer 404 while online. When taken offline every
/// request fails, mirroring a browser with no connectivity.
#[derive(Debug)]
pub struct MockNetwork {
    routes: Mutex<HashMap<String, Route>>,
    online: AtomicBool,
    log: Mutex<Vec<(Method, Url)>>,
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockNetwork {
    /// Create an online mock with no routes.
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Answer `url` with the given status, content type, and body.
    pub fn respond(&self, url: &str, status: u16, content_type: &Mime, body: impl Into<Bytes>) {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(content_type.as_ref()) {
            headers.insert(CONTENT_TYPE, value);
        }
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        lock(&self.routes).insert(
            url.to_string(),
            Route::Respond {
                status,
                headers,
                body: body.into(),
            },
        );
    }

    /// Make requests to `url` fail as a network error.
    pub fn fail(&self, url: &str, reason: &str) {
        lock(&self.routes).insert(url.to_string(), Route::Fail(reason.to_string()));
    }

    /// Make requests to `url` never complete.
    pub fn hang(&self, url: &str) {
        lock(&self.routes).insert(url.to_string(), Route::Hang);
    }

    /// Toggle connectivity for every URL.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<(Method, Url)> {
        lock(&self.log).clone()
    }

    /// Number of requests seen for `url`.
    pub fn request_count(&self, url: &str) -> usize {
        lock(&self.log)
            .iter()
            .filter(|(_, u)| u.as_str() == url)
            .count()
    }

    async fn answer(&self, request: Request) -> Result<Response, NetError> {
        lock(&self.log).push((request.method.clone(), request.url.clone()));
        trace!(url = %request.url, method = %request.method, "Mock fetch");

        if !self.online.load(Ordering::SeqCst) {
            return Err(NetError::Unreachable(format!("offline: {}", request.url)));
        }

        let route = lock(&self.routes).get(request.url.as_str()).cloned();
        match route {
            Some(Route::Respond {
                status,
                headers,
                body,
            }) => Ok(Response::new(request.url, status, headers, body)),
            Some(Route::Fail(reason)) => Err(NetError::Unreachable(reason)),
            Some(Route::Hang) => std::future::pending().await,
            None => Ok(Response::new(
                request.url,
                StatusCode::NOT_FOUND,
                HeaderMap::new(),
                Bytes::new(),
            )),
        }
    }
}

impl Network for MockNetwork {
    fn fetch(&self, request: Request) -> impl Future<Output = Result<Response, NetError>> + Send {
        self.answer(request)
    }
}
