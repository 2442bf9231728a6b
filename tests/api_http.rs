// tests/api_http.rs
//
// HTTP-level tests for the status Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /sources
// - GET /sources/{name}/latest
// - POST /sources/{name}/poll

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

mod common;

use common::{harness, harness_with, Scripted};
use feedwatch::api;
use feedwatch::scheduler::{PollScheduler, PollSettings, ReadySignal};
use feedwatch::FetchError;

const BODY_LIMIT: usize = 1024 * 1024;

fn router_with(fetchers: Vec<Scripted>) -> Router {
    let h = harness();
    let schedulers = fetchers
        .into_iter()
        .map(|f| PollScheduler::new(Arc::new(f), h.ctx.clone(), PollSettings::default()))
        .collect();
    api::create_router(schedulers)
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("router response");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    (status, String::from_utf8(bytes.to_vec()).expect("utf8 body"))
}

#[tokio::test]
async fn health_returns_ok() {
    let app = router_with(Vec::new());
    let (status, body) = call(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn sources_lists_status_per_scheduler() {
    let app = router_with(vec![Scripted::new("alpha"), Scripted::new("beta")]);
    let (status, body) = call(&app, "GET", "/sources").await;
    assert_eq!(status, StatusCode::OK);

    let v: Json = serde_json::from_str(&body).unwrap();
    let names: Vec<&str> = v
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["alpha", "beta"]);
    assert_eq!(v[0]["cycles"], 0);
    assert_eq!(v[0]["running"], false);
}

#[tokio::test]
async fn poll_then_latest_round_trip() {
    let app = router_with(vec![Scripted::new("alpha").then(&["b", "a"])]);

    let (status, _) = call(&app, "GET", "/sources/alpha/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND, "no snapshot before first poll");

    let (status, body) = call(&app, "POST", "/sources/alpha/poll").await;
    assert_eq!(status, StatusCode::OK);
    let report: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(report["fetched"], 2);
    assert_eq!(report["new_ids"], serde_json::json!([]));
    assert_eq!(report["cache_hit"], false);

    let (status, body) = call(&app, "GET", "/sources/alpha/latest").await;
    assert_eq!(status, StatusCode::OK);
    let latest: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(latest[0]["id"], "b");
    assert_eq!(latest[1]["id"], "a");
}

#[tokio::test]
async fn unknown_source_is_404() {
    let app = router_with(vec![Scripted::new("alpha")]);
    let (status, _) = call(&app, "GET", "/sources/nope/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, "POST", "/sources/nope/poll").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_poll_is_502_with_reason() {
    let app = router_with(vec![
        Scripted::new("alpha").then_fail(FetchError::Remote { status: 503 })
    ]);
    let (status, body) = call(&app, "POST", "/sources/alpha/poll").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("HTTP 503"), "body: {body}");
}

#[tokio::test]
async fn poll_before_ready_is_503_and_fetches_nothing() {
    let ready = ReadySignal::new();
    let h = harness_with(ready.clone(), Vec::new());
    let fetcher = Arc::new(Scripted::new("alpha").then(&["a"]));
    let app = api::create_router(vec![PollScheduler::new(
        fetcher.clone(),
        h.ctx.clone(),
        PollSettings::default(),
    )]);

    let (status, body) = call(&app, "POST", "/sources/alpha/poll").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("not ready"), "body: {body}");
    assert_eq!(fetcher.calls(), 0);

    ready.mark_ready();
    let (status, _) = call(&app, "POST", "/sources/alpha/poll").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetcher.calls(), 1);
}
