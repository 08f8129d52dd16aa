//! HTTP surface tests over a real socket.

#![cfg(unix)]

mod common;

use common::{process_alive, FakeTranscoder, TestHarness};
use serde_json::{json, Value};

async fn start(addr: std::net::SocketAddr, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{}/stream_start", addr))
        .json(&body)
        .send()
        .await
        .expect("request failed")
}

async fn stop(addr: std::net::SocketAddr) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{}/stream_stop", addr))
        .send()
        .await
        .expect("request failed")
}

// ----------------------------------------------------------------------------
// POST /stream_start
// ----------------------------------------------------------------------------

#[tokio::test]
async fn start_returns_absolute_stream_url() {
    let (h, addr) = TestHarness::with_server().await;

    let resp = start(addr, json!({ "rtsp_url": "rtsp://cam/1" })).await;
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Stream started");
    let url = body["stream_url"].as_str().unwrap();
    assert!(
        url.starts_with(&format!("http://{}/hls/stream.m3u8?t=", addr)),
        "unexpected stream_url {url}"
    );

    // The URL is directly playable
    let playlist = reqwest::get(url).await.unwrap();
    assert_eq!(playlist.status(), 200);
    assert_eq!(
        playlist.headers()["content-type"],
        "application/vnd.apple.mpegurl"
    );
    assert!(playlist.text().await.unwrap().starts_with("#EXTM3U"));

    h.supervisor().stop_stream().await.unwrap();
}

#[tokio::test]
async fn consecutive_starts_return_fresh_tokens() {
    let (h, addr) = TestHarness::with_server().await;

    let first: Value = start(addr, json!({ "rtsp_url": "rtsp://cam/1" }))
        .await
        .json()
        .await
        .unwrap();
    let second: Value = start(addr, json!({ "rtsp_url": "rtsp://cam/2" }))
        .await
        .json()
        .await
        .unwrap();

    assert_ne!(first["stream_url"], second["stream_url"]);
    let old_pid = h.launches()[0].0;
    assert!(!process_alive(old_pid));

    h.supervisor().stop_stream().await.unwrap();
}

#[tokio::test]
async fn start_without_address_is_400() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/stream_start", addr);

    let cases = vec![
        client.post(&url).json(&json!({})),
        client.post(&url).json(&json!({ "rtsp_url": "" })),
        client.post(&url).json(&json!({ "rtsp_url": null })),
        client
            .post(&url)
            .header("content-type", "application/json")
            .body("{not json"),
        client.post(&url),
    ];

    for request in cases {
        let resp = request.send().await.unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "RTSP url is required");
        assert_eq!(body["code"], "validation_error");
    }

    assert!(h.launches().is_empty());
}

#[tokio::test]
async fn startup_failure_is_500() {
    let (_h, addr) = TestHarness::with_server_transcoder(FakeTranscoder::Crashing).await;

    let resp = start(addr, json!({ "rtsp_url": "rtsp://cam/1" })).await;
    assert_eq!(resp.status(), 500);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "transcoder_exited");
    assert!(body["error"].as_str().unwrap().contains("Connection refused"));
}

// ----------------------------------------------------------------------------
// POST /stream_stop
// ----------------------------------------------------------------------------

#[tokio::test]
async fn stop_then_stop_again() {
    let (h, addr) = TestHarness::with_server().await;
    start(addr, json!({ "rtsp_url": "rtsp://cam/1" })).await;

    let resp = stop(addr).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Stream stopped");
    assert!(h.managed_files().is_empty());

    let resp = stop(addr).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "no stream running");
    assert_eq!(body["code"], "no_active_stream");
}

// ----------------------------------------------------------------------------
// GET /hls/*
// ----------------------------------------------------------------------------

#[tokio::test]
async fn segments_are_served_uncached() {
    let (h, addr) = TestHarness::with_server().await;
    start(addr, json!({ "rtsp_url": "rtsp://cam/1" })).await;
    let segment = h.wait_for_segment().await;

    let resp = reqwest::get(format!("http://{}/hls/{}", addr, segment))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let headers = resp.headers();
    assert_eq!(headers["content-type"], "video/mp2t");
    assert_eq!(headers["cache-control"], "no-cache, no-store, must-revalidate");
    assert_eq!(headers["pragma"], "no-cache");
    assert_eq!(headers["expires"], "0");
    assert!(resp.text().await.unwrap().starts_with("segment"));

    h.supervisor().stop_stream().await.unwrap();
}

#[tokio::test]
async fn missing_and_escaping_paths_are_404() {
    let (h, addr) = TestHarness::with_server().await;
    std::fs::write(h.root.path().join("secret.ts"), b"outside the store").unwrap();

    for path in ["stream.m3u8", "stream_00000000_0.ts", "..%2Fsecret.ts", "nested/x.ts"] {
        let resp = reqwest::get(format!("http://{}/hls/{}", addr, path))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404, "path {path}");
    }
}

#[tokio::test]
async fn old_session_segments_are_gone_after_replace() {
    let (h, addr) = TestHarness::with_server().await;
    start(addr, json!({ "rtsp_url": "rtsp://cam/1" })).await;
    let old_segment = h.wait_for_segment().await;

    start(addr, json!({ "rtsp_url": "rtsp://cam/2" })).await;

    let resp = reqwest::get(format!("http://{}/hls/{}", addr, old_segment))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    h.supervisor().stop_stream().await.unwrap();
}

// ----------------------------------------------------------------------------
// Status, health, CORS
// ----------------------------------------------------------------------------

#[tokio::test]
async fn status_tracks_lifecycle() {
    let (h, addr) = TestHarness::with_server().await;
    let url = format!("http://{}/stream_status", addr);

    let status: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(status["state"], "idle");

    start(addr, json!({ "rtsp_url": "rtsp://cam/1" })).await;
    let status: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(status["state"], "running");
    assert_eq!(status["source_uri"], "rtsp://cam/1");
    assert_eq!(status["transcoder_running"], true);
    assert_eq!(status["playback"]["path"], "/hls/stream.m3u8");

    h.supervisor().stop_stream().await.unwrap();
    let status: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(status["state"], "idle");
}

#[tokio::test]
async fn health_check() {
    let (_h, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let (_h, addr) = TestHarness::with_server().await;

    let resp = reqwest::Client::new()
        .request(
            reqwest::Method::OPTIONS,
            format!("http://{}/stream_start", addr),
        )
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
}
