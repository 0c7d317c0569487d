// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP API tests over a real listener on an ephemeral port.

use assert_json_diff::assert_json_eq;
use reelgrab_runtime::acquisition::MediaDownloader;
use reelgrab_runtime::config::DiscoveryConfig;
use reelgrab_runtime::discovery::Orchestrator;
use reelgrab_runtime::renderer::scripted::{ScriptedPage, ScriptedRenderer};
use reelgrab_runtime::rest::{self, AppState};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED_URL: &str = "https://www.shopltk.com/explore/someone";

async fn serve(renderer: ScriptedRenderer, work_root: &Path) -> String {
    let config = DiscoveryConfig {
        element_wait_ms: 50,
        feed_settle_ms: 0,
        playback_settle_ms: 0,
        ..DiscoveryConfig::default()
    };
    let downloader = MediaDownloader::new(5_000).with_backoff(Duration::from_millis(5));
    let orchestrator =
        Arc::new(Orchestrator::new(Arc::new(renderer), config).with_downloader(downloader));
    let state = Arc::new(AppState::new(orchestrator, work_root.to_path_buf()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, rest::router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

fn feed_with_image(src: &str) -> String {
    format!(
        r#"<html><body>
          <div data-test-id="post-feed-item/card"><span>promo</span></div>
          <div data-test-id="post-feed-item/card"><span>promo</span></div>
          <div data-test-id="post-feed-item/card"><div class="ltk-img"><img src="{src}"></div></div>
        </body></html>"#
    )
}

async fn start_task(client: &reqwest::Client, base: &str, body: Value) -> String {
    let resp: Value = client
        .post(format!("{base}/api/download"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["message"], "Download started");
    resp["task_id"].as_str().unwrap().to_string()
}

async fn wait_for_status(client: &reqwest::Client, base: &str, task_id: &str, want: &str) -> Value {
    for _ in 0..100 {
        let status: Value = client
            .get(format!("{base}/api/download/{task_id}/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if status["status"] == want {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("task {task_id} never reached {want}");
}

#[tokio::test]
async fn test_root_reports_online() {
    let work = tempfile::tempdir().unwrap();
    let base = serve(ScriptedRenderer::new(), work.path()).await;

    let body: Value = reqwest::get(format!("{base}/")).await.unwrap().json().await.unwrap();
    assert_json_eq!(
        body,
        json!({ "status": "online", "message": "Media download API is running" })
    );
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let work = tempfile::tempdir().unwrap();
    let base = serve(ScriptedRenderer::new(), work.path()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/download"))
        .json(&json!({ "url": FEED_URL, "count": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "E_INVALID_PARAMS");

    let resp = client
        .post(format!("{base}/api/download"))
        .json(&json!({ "url": "not a url" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base}/api/download"))
        .json(&json!({ "count": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let work = tempfile::tempdir().unwrap();
    let base = serve(ScriptedRenderer::new(), work.path()).await;

    for url in [
        format!("{base}/api/download/missing/status"),
        format!("{base}/api/download/missing"),
    ] {
        let resp = reqwest::get(url).await.unwrap();
        assert_eq!(resp.status(), 404);
        let body: Value = resp.json().await.unwrap();
        assert_json_eq!(
            body,
            json!({ "error": { "code": "E_NOT_FOUND", "message": "Task not found" } })
        );
    }
}

#[tokio::test]
async fn test_download_flow_serves_zip_once() {
    let media = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/a.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![5u8; 15_000]))
        .mount(&media)
        .await;

    let renderer = ScriptedRenderer::new().page(
        FEED_URL,
        ScriptedPage::new(feed_with_image(&format!("{}/img/a.jpg", media.uri()))),
    );
    let work = tempfile::tempdir().unwrap();
    let base = serve(renderer, work.path()).await;
    let client = reqwest::Client::new();

    let task_id = start_task(&client, &base, json!({ "url": FEED_URL, "count": 5 })).await;
    let status = wait_for_status(&client, &base, &task_id, "completed").await;
    assert_json_eq!(status, json!({ "status": "completed", "files": 1 }));

    let resp = client
        .get(format!("{base}/api/download/{task_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/zip");
    assert_eq!(
        resp.headers()["content-disposition"],
        "attachment; filename=\"downloaded_media.zip\""
    );
    let bytes = resp.bytes().await.unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.by_index(0).unwrap().name(), "image_0_0.jpg");

    // Fetching the archive consumes the task.
    let again = client
        .get(format!("{base}/api/download/{task_id}/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 404);
    assert!(!work.path().join(format!("reelgrab-task-{task_id}")).exists());
    assert!(!work.path().join(format!("reelgrab-task-{task_id}.zip")).exists());
}

#[tokio::test]
async fn test_empty_feed_task_fails() {
    let renderer = ScriptedRenderer::new().page(FEED_URL, ScriptedPage::new("<html><body></body></html>"));
    let work = tempfile::tempdir().unwrap();
    let base = serve(renderer, work.path()).await;
    let client = reqwest::Client::new();

    let task_id = start_task(&client, &base, json!({ "url": FEED_URL })).await;
    let status = wait_for_status(&client, &base, &task_id, "failed").await;
    assert_json_eq!(
        status,
        json!({ "status": "failed", "error": "No files were downloaded" })
    );

    let resp = client
        .get(format!("{base}/api/download/{task_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"]["message"],
        "Download not ready. Current status: failed"
    );
}

#[tokio::test]
async fn test_archive_not_ready_while_processing() {
    let renderer = ScriptedRenderer::new().page(
        FEED_URL,
        ScriptedPage::new("<html></html>").load_delay(Duration::from_secs(5)),
    );
    let work = tempfile::tempdir().unwrap();
    let base = serve(renderer, work.path()).await;
    let client = reqwest::Client::new();

    let task_id = start_task(&client, &base, json!({ "url": FEED_URL, "kind": "profile" })).await;
    let resp = client
        .get(format!("{base}/api/download/{task_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"]["message"],
        "Download not ready. Current status: processing"
    );
}
