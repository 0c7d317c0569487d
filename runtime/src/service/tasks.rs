// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-memory task registry and the task body.

use super::archive::zip_directory;
use crate::discovery::{DiscoveryRequest, Orchestrator};
use crate::remux::Remuxer;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// Lifecycle of a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Discovery is running in the browser.
    Processing,
    /// Manifests are being materialized and the archive is being built.
    Downloading,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Processing => "processing",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// State of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub status: TaskStatus,
    /// Working directory holding the task's media.
    pub dir: PathBuf,
    /// Archive of `dir`, set once the task completes.
    pub zip_path: Option<PathBuf>,
    pub error: Option<String>,
    /// Number of files in the archive.
    pub files: usize,
    pub created_at: DateTime<Utc>,
}

/// Shared handle to all known tasks.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<DashMap<String, TaskRecord>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task working in `dir` and return its id.
    pub fn create(&self, dir: PathBuf) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.insert(&id, dir);
        id
    }

    /// Register a task under a caller-chosen id.
    pub fn insert(&self, id: &str, dir: PathBuf) {
        self.tasks.insert(
            id.to_string(),
            TaskRecord {
                status: TaskStatus::Processing,
                dir,
                zip_path: None,
                error: None,
                files: 0,
                created_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<TaskRecord> {
        self.tasks.get(id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn set_status(&self, id: &str, status: TaskStatus) {
        if let Some(mut record) = self.tasks.get_mut(id) {
            record.status = status;
        }
    }

    pub fn complete(&self, id: &str, zip_path: PathBuf, files: usize) {
        if let Some(mut record) = self.tasks.get_mut(id) {
            record.status = TaskStatus::Completed;
            record.zip_path = Some(zip_path);
            record.files = files;
        }
    }

    pub fn fail(&self, id: &str, error: impl std::fmt::Display) {
        if let Some(mut record) = self.tasks.get_mut(id) {
            record.status = TaskStatus::Failed;
            record.error = Some(error.to_string());
        }
    }

    /// Forget a task and remove its archive and working directory.
    ///
    /// Filesystem errors are ignored; the entry is always removed.
    pub async fn cleanup(&self, id: &str) {
        let Some((_, record)) = self.tasks.remove(id) else {
            return;
        };
        if let Some(zip) = &record.zip_path {
            let _ = tokio::fs::remove_file(zip).await;
        }
        let _ = tokio::fs::remove_dir_all(&record.dir).await;
        info!("cleaned up task {id}");
    }
}

/// Run one task to completion, recording the outcome in `registry`.
pub async fn run_task(
    registry: TaskRegistry,
    id: String,
    request: DiscoveryRequest,
    orchestrator: Arc<Orchestrator>,
) {
    let span = info_span!("task", task_id = %id);
    async {
        info!("task started for {}", request.url);
        match execute(&registry, &id, request, &orchestrator).await {
            Ok((zip_path, files)) => {
                info!("task completed with {files} files");
                registry.complete(&id, zip_path, files);
            }
            Err(e) => {
                warn!("task failed: {e:#}");
                registry.fail(&id, format!("{e:#}"));
            }
        }
    }
    .instrument(span)
    .await
}

async fn execute(
    registry: &TaskRegistry,
    id: &str,
    request: DiscoveryRequest,
    orchestrator: &Orchestrator,
) -> Result<(PathBuf, usize)> {
    let dir = request.output_dir.clone();
    let result = orchestrator.discover(request).await?;
    if let Some(e) = &result.error {
        warn!("discovery reported: {e}");
    }

    registry.set_status(id, TaskStatus::Downloading);

    let mut files = result.files().len();
    let manifests = result.manifest_urls().len();
    if manifests > 0 {
        let remuxer = Remuxer::from_config(orchestrator.config())?;
        files += remuxer.materialize_all(&result, &dir).await?.len();
    }

    if files == 0 {
        bail!("No files were downloaded");
    }

    let zip_path = archive_path(&dir);
    let entries = zip_directory(&dir, &zip_path)
        .await
        .context("failed to build archive")?;
    Ok((zip_path, entries))
}

/// `<dir>.zip` next to the working directory.
pub fn archive_path(dir: &Path) -> PathBuf {
    dir.with_extension("zip")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::MediaDownloader;
    use crate::config::DiscoveryConfig;
    use crate::renderer::scripted::{ScriptedPage, ScriptedRenderer};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED_URL: &str = "https://www.shopltk.com/explore/someone";

    fn config() -> DiscoveryConfig {
        DiscoveryConfig {
            element_wait_ms: 50,
            feed_settle_ms: 0,
            playback_settle_ms: 0,
            run_timeout_ms: 10_000,
            ..DiscoveryConfig::default()
        }
    }

    fn orchestrator(renderer: ScriptedRenderer) -> Arc<Orchestrator> {
        let downloader = MediaDownloader::new(5_000).with_backoff(Duration::from_millis(5));
        Arc::new(Orchestrator::new(Arc::new(renderer), config()).with_downloader(downloader))
    }

    fn feed(image_url: &str) -> String {
        format!(
            r#"<html><body>
              <div data-test-id="post-feed-item/card"><span>promo</span></div>
              <div data-test-id="post-feed-item/card"><span>promo</span></div>
              <div data-test-id="post-feed-item/card"><div class="ltk-img"><img src="{image_url}"></div></div>
            </body></html>"#
        )
    }

    #[test]
    fn test_registry_lifecycle() {
        let registry = TaskRegistry::new();
        let id = registry.create(PathBuf::from("/tmp/reelgrab-task-x"));
        assert_eq!(registry.get(&id).unwrap().status, TaskStatus::Processing);

        registry.set_status(&id, TaskStatus::Downloading);
        assert_eq!(registry.get(&id).unwrap().status, TaskStatus::Downloading);

        registry.fail(&id, "No files were downloaded");
        let record = registry.get(&id).unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("No files were downloaded"));
        assert!(registry.get("unknown").is_none());
        assert_eq!(TaskStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn test_archive_path_sits_next_to_dir() {
        assert_eq!(
            archive_path(Path::new("/tmp/reelgrab-task-1")),
            PathBuf::from("/tmp/reelgrab-task-1.zip")
        );
    }

    #[tokio::test]
    async fn test_task_completes_with_archive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img/p1.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 20_000]))
            .mount(&server)
            .await;

        let renderer = ScriptedRenderer::new().page(
            FEED_URL,
            ScriptedPage::new(feed(&format!("{}/img/p1.jpg", server.uri()))),
        );
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("reelgrab-task-a");
        let registry = TaskRegistry::new();
        let id = registry.create(dir.clone());

        let request = DiscoveryRequest::new(FEED_URL, &dir).with_max_items(5);
        run_task(registry.clone(), id.clone(), request, orchestrator(renderer)).await;

        let record = registry.get(&id).unwrap();
        assert_eq!(record.status, TaskStatus::Completed, "{:?}", record.error);
        assert_eq!(record.files, 1);
        let zip = record.zip_path.unwrap();
        assert!(zip.exists());

        registry.cleanup(&id).await;
        assert!(registry.get(&id).is_none());
        assert!(!zip.exists());
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_task_without_files_fails() {
        let renderer = ScriptedRenderer::new().page(
            FEED_URL,
            ScriptedPage::new("<html><body><p>nothing here</p></body></html>"),
        );
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("reelgrab-task-b");
        let registry = TaskRegistry::new();
        let id = registry.create(dir.clone());

        run_task(
            registry.clone(),
            id.clone(),
            DiscoveryRequest::new(FEED_URL, &dir),
            orchestrator(renderer),
        )
        .await;

        let record = registry.get(&id).unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("No files were downloaded"));
        assert!(record.zip_path.is_none());
    }

    #[tokio::test]
    async fn test_launch_failure_fails_task() {
        let renderer = ScriptedRenderer::new().failing_launch();
        let tmp = tempfile::tempdir().unwrap();
        let registry = TaskRegistry::new();
        let id = registry.create(tmp.path().join("t"));

        run_task(
            registry.clone(),
            id.clone(),
            DiscoveryRequest::new(FEED_URL, tmp.path().join("t")),
            orchestrator(renderer),
        )
        .await;

        let record = registry.get(&id).unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.error.unwrap().contains("browser launch failed"));
    }
}
