//! The offline cache worker.
//!
//! All shared state arrives through [`WorkerContext`]; the worker itself
//! holds only its configuration, its network, and its dispatch table.

use bytes::Bytes;
use futures::future::join_all;
use sitekit_common::timeout::with_optional_timeout;
use sitekit_net::{NetError, Network, Request, Response};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::background::BackgroundTasks;
use crate::cache::{CacheHandle, CacheStorage};
use crate::clients::{ClientId, Clients, ClientsHandle};
use crate::config::WorkerConfig;
use crate::dispatch::{DispatchTable, EventOutcome, WorkerEvent};
use crate::fetch::{
    is_interceptable, offline_page_response, should_cache, unavailable_response, FetchOutcome,
    OFFLINE_PAGE,
};
use crate::lifecycle::ServiceWorkerId;
use crate::notifications::{NotificationCenter, NotificationId, NotificationsHandle, PushMessage};
use crate::{Result, SwError};

/// Sync tag reserved for replaying queued form submissions.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

/// Host-owned resources handed to each worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerContext {
    pub caches: CacheHandle,
    pub clients: ClientsHandle,
    pub notifications: NotificationsHandle,
    pub background: BackgroundTasks,
}

impl WorkerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context over an existing cache storage.
    pub fn with_caches(caches: CacheStorage) -> Self {
        Self {
            caches: caches.into_handle(),
            clients: Clients::new().into_handle(),
            notifications: NotificationCenter::new().into_handle(),
            background: BackgroundTasks::new(),
        }
    }
}

/// A static asset that could not be precached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFailure {
    pub asset: String,
    pub reason: String,
}

/// Result of the install phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub version: String,
    /// Assets now in the cache store.
    pub cached: Vec<String>,
    /// Assets that failed; install proceeds regardless.
    pub failed: Vec<AssetFailure>,
    /// Whether the worker asked to activate without waiting.
    pub skip_waiting: bool,
}

/// Result of the activate phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    pub version: String,
    /// Stale cache stores deleted.
    pub purged: Vec<String>,
    /// Clients that switched to this worker.
    pub claimed: usize,
}

/// Offline cache worker for one version.
pub struct OfflineWorker<N: Network> {
    id: ServiceWorkerId,
    config: Arc<WorkerConfig>,
    network: Arc<N>,
    context: WorkerContext,
    dispatch: DispatchTable<N>,
    offline_html: Bytes,
}

impl<N: Network> std::fmt::Debug for OfflineWorker<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineWorker")
            .field("id", &self.id)
            .field("version", &self.config.version)
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

impl<N: Network> OfflineWorker<N> {
    /// Create a worker with the standard dispatch table.
    pub fn new(config: WorkerConfig, network: Arc<N>, context: WorkerContext) -> Result<Self> {
        config.validate()?;
        let offline_html = match config.offline_page {
            Some(ref html) => Bytes::from(html.clone()),
            None => Bytes::from_static(OFFLINE_PAGE.as_bytes()),
        };

        Ok(Self {
            id: ServiceWorkerId::new(),
            config: Arc::new(config),
            network,
            context,
            dispatch: DispatchTable::standard(),
            offline_html,
        })
    }

    /// Replace the dispatch table.
    pub fn with_dispatch(mut self, dispatch: DispatchTable<N>) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn context(&self) -> &WorkerContext {
        &self.context
    }

    /// Route `event` through the dispatch table and await its work.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
        let kind = event.kind();
        let handler = self.dispatch.get(kind).ok_or(SwError::NoHandler(kind))?;
        debug!(worker = self.id.raw(), ?kind, "Dispatching event");
        handler(self, event).await
    }

    async fn fetch_network(&self, request: Request) -> std::result::Result<Response, NetError> {
        match with_optional_timeout(self.config.network_timeout(), || {
            self.network.fetch(request)
        })
        .await
        {
            Ok(result) => result,
            Err(_) => Err(NetError::Timeout(
                self.config.network_timeout().unwrap_or_default(),
            )),
        }
    }

    // ==================== Install ====================

    /// Precache the static asset list into the current store.
    ///
    /// Individual asset failures are logged and recorded; they never fail
    /// the install.
    pub async fn install(&self) -> Result<InstallReport> {
        let version = self.config.version.clone();
        info!(version = %version, assets = self.config.static_assets.len(), "Installing");

        self.context.caches.write().await.open(&version);

        let attempts = self
            .config
            .static_assets
            .iter()
            .map(|asset| self.precache(&version, asset));
        let results = join_all(attempts).await;

        let mut report = InstallReport {
            version,
            skip_waiting: self.config.skip_waiting,
            ..Default::default()
        };
        for (asset, result) in self.config.static_assets.iter().zip(results) {
            match result {
                Ok(()) => report.cached.push(asset.clone()),
                Err(e) => {
                    warn!(asset = %asset, error = %e, "Failed to precache asset");
                    report.failed.push(AssetFailure {
                        asset: asset.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            version = %report.version,
            cached = report.cached.len(),
            failed = report.failed.len(),
            "Install complete"
        );
        Ok(report)
    }

    async fn precache(&self, version: &str, asset: &str) -> Result<()> {
        let url = self.config.resolve(asset)?;
        let request = Request::get(url);
        let response = self.fetch_network(request.clone()).await?;
        if !response.ok() {
            return Err(SwError::CacheError(format!(
                "{} answered {}",
                request.url, response.status
            )));
        }
        self.context
            .caches
            .write()
            .await
            .open(version)
            .put(&request, response)?;
        Ok(())
    }

    // ==================== Activate ====================

    /// Delete every cache store but the current one and claim all clients.
    pub async fn activate(&self) -> Result<ActivateReport> {
        let version = self.config.version.clone();

        let purged = {
            let mut caches = self.context.caches.write().await;
            caches.open(&version);
            caches.retain_only(&version)
        };
        for name in &purged {
            info!(cache = %name, "Purged stale cache");
        }

        let claimed = self.context.clients.write().await.claim(self.id);

        info!(version = %version, purged = purged.len(), claimed, "Activated");
        Ok(ActivateReport {
            version,
            purged,
            claimed,
        })
    }

    // ==================== Fetch ====================

    /// Network-first with cache fallback. Never fails for intercepted
    /// requests: the worst case is a synthetic offline response.
    pub async fn handle_fetch(&self, request: Request) -> FetchOutcome {
        if !is_interceptable(&request) {
            debug!(url = %request.url, method = %request.method, "Not intercepting");
            return FetchOutcome::Passthrough(request);
        }

        let outcome = match self.fetch_network(request.clone()).await {
            Ok(response) => {
                if should_cache(&request, &response, &self.config.origin) {
                    self.cache_in_background(request, response.clone());
                }
                FetchOutcome::Network(response)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed, trying cache");
                self.fallback(&request).await
            }
        };

        debug!(source = outcome.label(), "Fetch resolved");
        outcome
    }

    fn cache_in_background(&self, request: Request, response: Response) {
        let caches = self.context.caches.clone();
        let version = self.config.version.clone();
        self.context
            .background
            .spawn_best_effort("cache-write", async move {
                caches.write().await.open(&version).put(&request, response)?;
                Ok::<(), SwError>(())
            });
    }

    async fn fallback(&self, request: &Request) -> FetchOutcome {
        let cached = self
            .context
            .caches
            .read()
            .await
            .get(&self.config.version)
            .and_then(|cache| cache.match_request(request))
            .map(|entry| entry.response.clone());

        if let Some(response) = cached {
            return FetchOutcome::Cache(response);
        }

        if request.accepts_html() {
            FetchOutcome::OfflinePage(offline_page_response(
                request.url.clone(),
                self.offline_html.clone(),
            ))
        } else {
            FetchOutcome::Unavailable(unavailable_response(request.url.clone()))
        }
    }

    // ==================== Sync ====================

    /// Returns whether the tag had a handler.
    pub async fn handle_sync(&self, tag: &str) -> bool {
        if tag != BACKGROUND_SYNC_TAG {
            debug!(tag, "Ignoring unknown sync tag");
            return false;
        }
        let replayed = self.replay_queued_submissions().await;
        info!(tag, replayed, "Background sync finished");
        true
    }

    // TODO: replay contact-form submissions once they are queued while offline.
    async fn replay_queued_submissions(&self) -> usize {
        0
    }

    // ==================== Push ====================

    /// Show a notification for `message`. Missing or malformed payloads are
    /// dropped with a warning.
    pub async fn handle_push(&self, message: &PushMessage) -> Option<NotificationId> {
        let payload = match message.payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Dropping push message");
                return None;
            }
        };

        let notification = &self.config.notification;
        let id = self.context.notifications.write().await.show(
            payload,
            &notification.icon,
            &notification.badge,
        );
        Some(id)
    }

    /// Close the notification and open its URL, reusing a window already
    /// showing it.
    pub async fn handle_notification_click(&self, id: NotificationId) -> Option<ClientId> {
        let notification = match self.context.notifications.write().await.close(id) {
            Some(n) => n,
            None => {
                debug!(id = id.raw(), "Click on unknown notification");
                return None;
            }
        };

        let target = notification.url.as_deref()?;
        let url = match self.config.resolve(target) {
            Ok(url) => url,
            Err(e) => {
                warn!(url = target, error = %e, "Notification URL is invalid");
                return None;
            }
        };

        let mut clients = self.context.clients.write().await;
        let existing = clients.find_window(&url).map(|c| c.id.clone());
        match existing {
            Some(client) => match clients.focus(&client) {
                Ok(()) => Some(client),
                Err(e) => {
                    warn!(client = %client, error = %e, "Could not focus client");
                    None
                }
            },
            None => Some(clients.open_window(url)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::EventKind;
    use crate::notifications::PushPayload;
    use http::StatusCode;
    use sitekit_net::MockNetwork;
    use std::time::Duration;
    use url::Url;

    const ORIGIN: &str = "https://consultant.dev/";

    fn url(path: &str) -> Url {
        Url::parse(ORIGIN).unwrap().join(path).unwrap()
    }

    fn worker_with(config: WorkerConfig) -> (OfflineWorker<MockNetwork>, Arc<MockNetwork>) {
        let network = Arc::new(MockNetwork::new());
        let worker = OfflineWorker::new(config, network.clone(), WorkerContext::new()).unwrap();
        (worker, network)
    }

    fn worker() -> (OfflineWorker<MockNetwork>, Arc<MockNetwork>) {
        worker_with(WorkerConfig::new(url("/")).with_static_assets(["/", "/favicon.ico"]))
    }

    #[tokio::test]
    async fn test_install_partial_success() {
        let (worker, network) = worker();
        network.respond(url("/").as_str(), 200, &mime::TEXT_HTML, "<h1>Home</h1>");
        network.fail(url("/favicon.ico").as_str(), "connection reset");

        let report = worker.install().await.unwrap();

        assert_eq!(report.cached, vec!["/"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].asset, "/favicon.ico");

        let caches = worker.context().caches.read().await;
        let cache = caches.get("site-v1").unwrap();
        assert!(cache.match_url(&url("/")).is_some());
        assert!(cache.match_url(&url("/favicon.ico")).is_none());
    }

    #[tokio::test]
    async fn test_install_treats_error_status_as_failure() {
        let (worker, _network) = worker();
        // Unscripted URLs answer 404.
        let report = worker.install().await.unwrap();
        assert!(report.cached.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert!(worker.context().caches.read().await.has("site-v1"));
    }

    #[tokio::test]
    async fn test_activate_purges_and_claims() {
        let (worker, _network) = worker();
        {
            let mut caches = worker.context().caches.write().await;
            caches.open("site-v0");
            caches.open("unrelated");
        }
        worker
            .context()
            .clients
            .write()
            .await
            .add(url("/"), crate::clients::ClientType::Window);

        let report = worker.activate().await.unwrap();
        assert_eq!(report.purged, vec!["site-v0", "unrelated"]);
        assert_eq!(report.claimed, 1);
        assert_eq!(worker.context().caches.read().await.keys(), vec!["site-v1"]);

        let again = worker.activate().await.unwrap();
        assert!(again.purged.is_empty());
        assert_eq!(again.claimed, 0);
    }

    #[tokio::test]
    async fn test_fetch_caches_same_origin_200() {
        let (worker, network) = worker();
        network.respond(url("/blog").as_str(), 200, &mime::TEXT_HTML, "posts");

        let outcome = worker.handle_fetch(Request::get(url("/blog"))).await;
        assert!(matches!(outcome, FetchOutcome::Network(_)));

        worker.context().background.settle().await;
        let caches = worker.context().caches.read().await;
        assert!(caches.get("site-v1").unwrap().match_url(&url("/blog")).is_some());
    }

    #[tokio::test]
    async fn test_fetch_does_not_cache_non_200() {
        let (worker, network) = worker();
        network.respond(url("/draft").as_str(), 206, &mime::TEXT_HTML, "part");

        let outcome = worker.handle_fetch(Request::get(url("/draft"))).await;
        assert_eq!(outcome.response().unwrap().status, StatusCode::PARTIAL_CONTENT);

        worker.context().background.settle().await;
        assert!(worker.context().caches.read().await.get("site-v1").is_none());
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_cache() {
        let (worker, network) = worker();
        network.respond(url("/speaking").as_str(), 200, &mime::TEXT_HTML, "talks");
        worker.handle_fetch(Request::get(url("/speaking"))).await;
        worker.context().background.settle().await;

        network.set_online(false);
        let outcome = worker.handle_fetch(Request::get(url("/speaking"))).await;

        match outcome {
            FetchOutcome::Cache(response) => assert_eq!(response.body().as_ref(), b"talks"),
            other => panic!("expected cache hit, got {}", other.label()),
        }
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_invisible() {
        let network = Arc::new(MockNetwork::new());
        let context = WorkerContext::with_caches(CacheStorage::with_quota(4));
        let worker = OfflineWorker::new(
            WorkerConfig::new(url("/")).with_static_assets(Vec::<String>::new()),
            network.clone(),
            context,
        )
        .unwrap();
        network.respond(url("/big").as_str(), 200, &mime::TEXT_HTML, "far too large");

        let outcome = worker.handle_fetch(Request::get(url("/big"))).await;
        assert_eq!(outcome.response().unwrap().body().as_ref(), b"far too large");

        worker.context().background.settle().await;
        let caches = worker.context().caches.read().await;
        assert!(caches.get("site-v1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_network_timeout_triggers_fallback() {
        let (worker, network) =
            worker_with(WorkerConfig::new(url("/")).with_network_timeout(Duration::from_millis(20)));
        network.hang(url("/slow").as_str());

        let outcome = worker.handle_fetch(Request::navigate(url("/slow"))).await;
        assert!(matches!(outcome, FetchOutcome::OfflinePage(_)));
    }

    #[tokio::test]
    async fn test_custom_offline_page() {
        let mut config = WorkerConfig::new(url("/"));
        config.offline_page = Some("<p>offline, brb</p>".to_string());
        let (worker, network) = worker_with(config);
        network.set_online(false);

        let outcome = worker.handle_fetch(Request::navigate(url("/"))).await;
        assert_eq!(outcome.response().unwrap().text().unwrap(), "<p>offline, brb</p>");
    }

    #[tokio::test]
    async fn test_sync_tags() {
        let (worker, _network) = worker();
        assert!(worker.handle_sync(BACKGROUND_SYNC_TAG).await);
        assert!(!worker.handle_sync("something-else").await);
    }

    #[tokio::test]
    async fn test_push_shows_notification_with_fixed_assets() {
        let (worker, _network) = worker();
        let message = PushMessage::from_payload(&PushPayload {
            title: "New course".into(),
            body: "Async Rust, live".into(),
            url: Some("/courses".into()),
        })
        .unwrap();

        let id = worker.handle_push(&message).await.unwrap();
        let center = worker.context().notifications.read().await;
        let shown = center.get(id).unwrap();
        assert_eq!(shown.icon, "/android-chrome-192x192.png");
        assert_eq!(shown.badge, "/favicon-32x32.png");
    }

    #[tokio::test]
    async fn test_malformed_push_is_dropped() {
        let (worker, _network) = worker();
        assert!(worker.handle_push(&PushMessage::new("{oops")).await.is_none());
        assert!(worker.handle_push(&PushMessage::empty()).await.is_none());
        assert!(worker.context().notifications.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_notification_click_opens_then_focuses() {
        let (worker, _network) = worker();
        let push = |path: &str| {
            PushMessage::from_payload(&PushPayload {
                title: "t".into(),
                body: "b".into(),
                url: Some(path.into()),
            })
            .unwrap()
        };

        let first = worker.handle_push(&push("/blog")).await.unwrap();
        let opened = worker.handle_notification_click(first).await.unwrap();
        assert!(worker.context().notifications.read().await.get(first).is_none());

        let second = worker.handle_push(&push("/blog")).await.unwrap();
        let focused = worker.handle_notification_click(second).await.unwrap();

        assert_eq!(opened, focused);
        assert_eq!(worker.context().clients.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_notification_click_without_url() {
        let (worker, _network) = worker();
        let message = PushMessage::new(r#"{"title":"t","body":"b"}"#);
        let id = worker.handle_push(&message).await.unwrap();

        assert!(worker.handle_notification_click(id).await.is_none());
        assert!(worker.context().notifications.read().await.is_empty());
        assert!(worker.context().clients.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_missing_handler() {
        let (worker, _network) = worker();
        let mut table = DispatchTable::standard();
        table.unregister(EventKind::Push);
        let worker = worker.with_dispatch(table);

        let err = worker
            .dispatch(WorkerEvent::Push(PushMessage::empty()))
            .await
            .unwrap_err();
        assert!(matches!(err, SwError::NoHandler(EventKind::Push)));
    }

    #[tokio::test]
    async fn test_dispatch_routes_fetch() {
        let (worker, network) = worker();
        network.set_online(false);

        let outcome = worker
            .dispatch(WorkerEvent::Fetch(Request::get(url("/app.js"))))
            .await
            .unwrap();
        match outcome {
            EventOutcome::Fetched(FetchOutcome::Unavailable(r)) => {
                assert_eq!(r.status, StatusCode::SERVICE_UNAVAILABLE)
            }
            other => panic!("unexpected outcome {:?}", other.kind()),
        }
    }
}
