// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-based renderer using chromiumoxide.
//!
//! Every session gets a private profile directory and its own debugging
//! port; tabs record `Network.requestWillBeSent` events into an in-memory
//! log that the manifest miner reads.

use super::{CapturedRequest, NavigationResult, RenderContext, RenderSession, Renderer};
use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, EventRequestWillBeSent};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// First port handed out for remote debugging.
const DEBUG_PORT_BASE: u16 = 9300;

/// Width of the debugging port range.
const DEBUG_PORT_SPAN: u32 = 20_000;

/// How long `Browser.close` and the process exit may take before we kill.
const GRACEFUL_CLOSE: Duration = Duration::from_secs(5);

static LAUNCH_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. REELGRAB_CHROME_PATH env
    if let Ok(p) = std::env::var("REELGRAB_CHROME_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.reelgrab/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".reelgrab/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".reelgrab/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".reelgrab/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".reelgrab/chromium/chrome-linux64/chrome"),
                home.join(".reelgrab/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS locations
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Debugging port for the next launch in this process.
///
/// Mixes the process id with a per-process launch counter so that
/// concurrent runs, in this process or another, pick different ports.
pub(crate) fn next_debug_port() -> u16 {
    port_for(
        std::process::id(),
        LAUNCH_COUNTER.fetch_add(1, Ordering::Relaxed),
    )
}

fn port_for(pid: u32, launch: u32) -> u16 {
    let offset = (u64::from(pid) * 31 + u64::from(launch)) % u64::from(DEBUG_PORT_SPAN);
    DEBUG_PORT_BASE + offset as u16
}

/// Keep profile directory names short and filesystem-safe.
fn sanitize_seed(seed: &str) -> String {
    let cleaned: String = seed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .take(32)
        .collect();
    if cleaned.is_empty() {
        "run".to_string()
    } else {
        cleaned
    }
}

/// Create a uniquely named, owner-only profile directory.
fn create_profile_dir(seed: &str) -> std::io::Result<TempDir> {
    let dir = tempfile::Builder::new()
        .prefix(&format!("reelgrab-{}-", sanitize_seed(seed)))
        .tempdir()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(dir)
}

fn build_browser_config(
    executable: Option<&Path>,
    profile: &Path,
    port: u16,
    launch_timeout: Duration,
) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .user_data_dir(profile)
        .port(port)
        .launch_timeout(launch_timeout)
        .window_size(1920, 1080)
        .arg("--headless=new")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-gpu")
        .arg("--autoplay-policy=no-user-gesture-required")
        .arg("--no-first-run")
        .arg("--disable-extensions");

    if let Some(path) = executable {
        builder = builder.chrome_executable(path);
    }

    builder
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))
}

/// Chromium-based renderer. Launches one isolated browser per session.
pub struct ChromiumRenderer {
    chrome_path: Option<PathBuf>,
    launch_timeout: Duration,
}

impl ChromiumRenderer {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            chrome_path: config.chrome_path.clone(),
            launch_timeout: Duration::from_millis(config.launch_timeout_ms),
        }
    }

    async fn launch_once(
        &self,
        seed: &str,
        executable: Option<&Path>,
        launch_timeout: Duration,
    ) -> Result<ChromiumSession> {
        let profile =
            create_profile_dir(seed).context("failed to create browser profile directory")?;
        let port = next_debug_port();
        let config = build_browser_config(executable, profile.path(), port, launch_timeout)?;

        info!(
            "launching Chromium (port={port}, profile={})",
            profile.path().display()
        );

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(ChromiumSession {
            browser,
            handler_task,
            profile: Some(profile),
            port,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn launch(&self, profile_seed: &str) -> Result<Box<dyn RenderSession>, DiscoveryError> {
        let first = match self
            .launch_once(profile_seed, self.chrome_path.as_deref(), self.launch_timeout)
            .await
        {
            Ok(session) => return Ok(Box::new(session)),
            Err(e) => e,
        };

        warn!("browser launch failed ({first:#}); retrying with explicit configuration");

        // Second attempt: explicit executable, fresh profile and port, longer timeout.
        let executable = self
            .chrome_path
            .clone()
            .or_else(find_chromium)
            .ok_or_else(|| {
                DiscoveryError::BrowserLaunch(format!(
                    "{first:#}; no Chromium executable found (set REELGRAB_CHROME_PATH)"
                ))
            })?;

        match self
            .launch_once(profile_seed, Some(&executable), self.launch_timeout * 2)
            .await
        {
            Ok(session) => Ok(Box::new(session)),
            Err(second) => Err(DiscoveryError::BrowserLaunch(format!(
                "{second:#} (first attempt: {first:#})"
            ))),
        }
    }
}

/// One running Chromium process with a private profile.
pub struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    profile: Option<TempDir>,
    port: u16,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumSession {
    async fn terminate(&mut self) {
        let mut exited = false;
        match tokio::time::timeout(GRACEFUL_CLOSE, self.browser.close()).await {
            Ok(Ok(_)) => {
                exited = matches!(
                    tokio::time::timeout(GRACEFUL_CLOSE, self.browser.wait()).await,
                    Ok(Ok(_))
                );
            }
            Ok(Err(e)) => debug!("Browser.close failed: {e}"),
            Err(_) => debug!("Browser.close timed out after {GRACEFUL_CLOSE:?}"),
        }

        if !exited {
            warn!("browser on port {} did not exit gracefully, killing", self.port);
            if let Some(Err(e)) = self.browser.kill().await {
                warn!("failed to kill browser process: {e}");
            }
        }

        self.handler_task.abort();

        if let Some(profile) = self.profile.take() {
            let path = profile.path().to_path_buf();
            if let Err(e) = profile.close() {
                debug!("ignoring profile cleanup error for {}: {e}", path.display());
            }
        }
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        // Process teardown is chromiumoxide's Drop; the TempDir removes the profile.
        self.handler_task.abort();
    }
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn new_context(&mut self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        page.execute(EnableParams::default())
            .await
            .context("failed to enable network capture")?;

        let mut events = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("failed to subscribe to network events")?;

        let log: Arc<Mutex<Vec<CapturedRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let capture_task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let entry = CapturedRequest {
                    url: event.request.url.clone(),
                    method: event.request.method.clone(),
                };
                if let Ok(mut log) = sink.lock() {
                    log.push(entry);
                }
            }
        });

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            log,
            capture_task,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        let mut session = *self;
        session.terminate().await;
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    log: Arc<Mutex<Vec<CapturedRequest>>>,
    capture_task: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl Drop for ChromiumContext {
    fn drop(&mut self) {
        self.capture_task.abort();
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn get_html(&self) -> Result<String> {
        self.page.content().await.context("failed to get HTML")
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    fn captured_requests(&self) -> Vec<CapturedRequest> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        self.capture_task.abort();
        let _ = self.page.clone().close().await;
        Ok(())
    }
}
