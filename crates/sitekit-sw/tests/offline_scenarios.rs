//! End-to-end behavior of the offline worker through its host container.

use bytes::Bytes;
use http::{Method, StatusCode};
use sitekit_net::{MockNetwork, Request};
use sitekit_sw::{
    ContainerEvent, FetchOutcome, PushMessage, PushPayload, ServiceWorkerContainer, WorkerConfig,
};
use std::sync::Arc;
use url::Url;

const ORIGIN: &str = "https://consultant.dev/";

fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

fn setup() -> (ServiceWorkerContainer<MockNetwork>, Arc<MockNetwork>) {
    let network = Arc::new(MockNetwork::new());
    let (container, _rx) = ServiceWorkerContainer::new(network.clone(), url("/"));
    (container, network)
}

fn config(version: &str) -> WorkerConfig {
    WorkerConfig::new(url("/"))
        .with_version(version)
        .with_static_assets(["/", "/favicon.ico"])
}

#[tokio::test]
async fn install_survives_a_failing_asset() {
    let (container, network) = setup();
    network.respond(url("/").as_str(), 200, &mime::TEXT_HTML, "<h1>Home</h1>");
    network.fail(url("/favicon.ico").as_str(), "connection reset");

    let report = container.register(config("site-v1")).await.unwrap();
    assert_eq!(report.cached, vec!["/"]);
    assert_eq!(report.failed[0].asset, "/favicon.ico");

    let caches = container.context().caches.read().await;
    let store = caches.get("site-v1").unwrap();
    assert_eq!(store.len(), 1);
    assert!(store.match_url(&url("/")).is_some());
}

#[tokio::test]
async fn second_version_purges_the_first() {
    let (container, network) = setup();
    network.respond(url("/").as_str(), 200, &mime::TEXT_HTML, "v1");

    container.register(config("site-v1")).await.unwrap();
    assert_eq!(container.context().caches.read().await.keys(), vec!["site-v1"]);

    let v2 = container.register(config("site-v2")).await.unwrap();
    assert_eq!(v2.version, "site-v2");
    assert_eq!(container.context().caches.read().await.keys(), vec!["site-v2"]);

    let active = container.active_worker().await.unwrap();
    assert_eq!(active.version(), "site-v2");
}

#[tokio::test]
async fn cached_page_is_served_byte_for_byte_when_offline() {
    let (container, network) = setup();
    container.register(config("site-v1")).await.unwrap();
    network.respond(url("/blog").as_str(), 200, &mime::TEXT_HTML, "<ul><li>post</li></ul>");

    let live = container.fetch(Request::get(url("/blog"))).await.unwrap();
    container.context().background.settle().await;

    network.fail(url("/blog").as_str(), "dns failure");
    let outcome = container
        .fetch_outcome(Request::get(url("/blog")))
        .await
        .unwrap();

    let cached = match outcome {
        FetchOutcome::Cache(response) => response,
        other => panic!("expected a cache hit, got {}", other.label()),
    };
    assert_eq!(cached.status, live.status);
    assert_eq!(cached.headers, live.headers);
    assert_eq!(cached.body(), live.body());
}

#[tokio::test]
async fn cross_origin_responses_are_not_cached() {
    let (container, network) = setup();
    container.register(config("site-v1")).await.unwrap();
    let external = "https://external.example.com/x";
    network.respond(external, 200, &mime::APPLICATION_JSON, "{}");

    let response = container
        .fetch(Request::get(Url::parse(external).unwrap()))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    container.context().background.settle().await;

    let caches = container.context().caches.read().await;
    assert!(caches
        .get("site-v1")
        .unwrap()
        .match_url(&Url::parse(external).unwrap())
        .is_none());
}

#[tokio::test]
async fn offline_navigation_gets_the_offline_page() {
    let (container, network) = setup();
    container.register(config("site-v1")).await.unwrap();
    network.set_online(false);

    let response = container
        .fetch(Request::navigate(url("/missing-page")))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type(), Some(mime::TEXT_HTML));
    let body = response.text().unwrap();
    assert!(body.contains("You're Offline"));
    assert!(body.contains("<button"));
}

#[tokio::test]
async fn offline_subresource_gets_503() {
    let (container, network) = setup();
    container.register(config("site-v1")).await.unwrap();
    network.set_online(false);

    let response = container
        .fetch(Request::get(url("/static/app.js")))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.text().unwrap(), "Offline");
}

#[tokio::test]
async fn post_is_passed_through_untouched() {
    let (container, network) = setup();
    container.register(config("site-v1")).await.unwrap();
    network.set_online(false);

    let request = Request::post(url("/api/contact"), Bytes::from_static(b"name=Ada"));
    let outcome = container.fetch_outcome(request.clone()).await.unwrap();
    assert!(outcome.is_passthrough());

    // The network's own failure reaches the caller.
    assert!(container.fetch(request).await.is_err());
    let posts = network
        .requests()
        .into_iter()
        .filter(|(method, _)| *method == Method::POST)
        .count();
    assert_eq!(posts, 1);
}

#[tokio::test]
async fn non_http_schemes_are_passed_through() {
    let (container, _network) = setup();
    container.register(config("site-v1")).await.unwrap();

    let request = Request::get(Url::parse("chrome-extension://abcdef/inject.js").unwrap());
    let outcome = container.fetch_outcome(request).await.unwrap();
    assert!(outcome.is_passthrough());
}

#[tokio::test]
async fn push_then_click_opens_the_url() {
    let network = Arc::new(MockNetwork::new());
    let (container, mut rx) = ServiceWorkerContainer::new(network, url("/"));
    container.register(config("site-v1")).await.unwrap();

    let message = PushMessage::from_payload(&PushPayload {
        title: "New workshop".into(),
        body: "Registration is open".into(),
        url: Some("/courses".into()),
    })
    .unwrap();
    let id = container.push(message).await.unwrap().unwrap();

    let shown = std::iter::from_fn(|| rx.try_recv().ok())
        .any(|event| event == ContainerEvent::NotificationShown { id });
    assert!(shown);

    let client = container.notification_click(id).await.unwrap().unwrap();
    let clients = container.context().clients.read().await;
    assert_eq!(clients.get(&client).unwrap().url, url("/courses"));
}

#[tokio::test]
async fn malformed_push_does_not_crash_the_worker() {
    let (container, _network) = setup();
    container.register(config("site-v1")).await.unwrap();

    assert_eq!(container.push(PushMessage::new("<<garbage>>")).await.unwrap(), None);
    assert!(container.sync("background-sync").await.unwrap());
}
