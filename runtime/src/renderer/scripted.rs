// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-memory renderer that serves canned pages.
//!
//! Each page carries its rendered HTML, the requests a real tab would have
//! captured while loading it, and canned results for scripts, matched by a
//! marker substring of the script text. Unknown scripts evaluate to `null`.
//! Counters record launches, shutdowns and open tabs so callers can check
//! resource handling without a browser.

use super::{CapturedRequest, NavigationResult, RenderContext, RenderSession, Renderer};
use crate::error::DiscoveryError;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const BLANK_HTML: &str = "<html><head></head><body></body></html>";

/// One canned page.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    html: String,
    requests: Vec<CapturedRequest>,
    scripts: Vec<(String, serde_json::Value)>,
    load_delay: Duration,
    fail_navigation: bool,
    hang_scripts: bool,
}

impl ScriptedPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Self::default()
        }
    }

    /// Add a GET request to the page's network capture.
    pub fn request(mut self, url: impl Into<String>) -> Self {
        self.requests.push(CapturedRequest::get(url));
        self
    }

    /// Answer any script containing `marker` with `value`.
    pub fn script(mut self, marker: impl Into<String>, value: serde_json::Value) -> Self {
        self.scripts.push((marker.into(), value));
        self
    }

    /// Delay navigation by `delay`.
    pub fn load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Make navigation to this page fail.
    pub fn failing(mut self) -> Self {
        self.fail_navigation = true;
        self
    }

    /// Never return from scripts run on this page, like a wedged tab.
    pub fn hanging_scripts(mut self) -> Self {
        self.hang_scripts = true;
        self
    }
}

/// Resource counters shared by a renderer and everything it launched.
#[derive(Debug, Default)]
pub struct ScriptedStats {
    launches: AtomicUsize,
    shutdowns: AtomicUsize,
    open_contexts: AtomicUsize,
    peak_contexts: AtomicUsize,
    navigations: Mutex<Vec<String>>,
}

impl ScriptedStats {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Tabs currently open across all sessions.
    pub fn open_contexts(&self) -> usize {
        self.open_contexts.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open tabs seen.
    pub fn peak_contexts(&self) -> usize {
        self.peak_contexts.load(Ordering::SeqCst)
    }

    /// Every URL navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.navigations
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }

    fn context_opened(&self) {
        let now = self.open_contexts.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_contexts.fetch_max(now, Ordering::SeqCst);
    }

    fn context_closed(&self) {
        let _ = self
            .open_contexts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn record_navigation(&self, url: &str) {
        if let Ok(mut n) = self.navigations.lock() {
            n.push(url.to_string());
        }
    }
}

/// A `Renderer` backed by canned pages.
#[derive(Clone, Default)]
pub struct ScriptedRenderer {
    pages: Arc<HashMap<String, ScriptedPage>>,
    stats: Arc<ScriptedStats>,
    fail_launch: bool,
    launch_delay: Duration,
    shutdown_delay: Duration,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `page` for navigations to `url`.
    pub fn page(mut self, url: impl Into<String>, page: ScriptedPage) -> Self {
        Arc::make_mut(&mut self.pages).insert(url.into(), page);
        self
    }

    /// Make every launch fail.
    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    /// Take `delay` to start the browser.
    pub fn launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    /// Take `delay` to shut the browser down.
    pub fn shutdown_delay(mut self, delay: Duration) -> Self {
        self.shutdown_delay = delay;
        self
    }

    pub fn stats(&self) -> Arc<ScriptedStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn launch(&self, _profile_seed: &str) -> Result<Box<dyn RenderSession>, DiscoveryError> {
        tokio::time::sleep(self.launch_delay).await;
        if self.fail_launch {
            return Err(DiscoveryError::BrowserLaunch(
                "scripted renderer configured to fail".into(),
            ));
        }
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            pages: Arc::clone(&self.pages),
            stats: Arc::clone(&self.stats),
            open: Arc::new(AtomicUsize::new(0)),
            shutdown_delay: self.shutdown_delay,
        }))
    }
}

struct ScriptedSession {
    pages: Arc<HashMap<String, ScriptedPage>>,
    stats: Arc<ScriptedStats>,
    open: Arc<AtomicUsize>,
    shutdown_delay: Duration,
}

#[async_trait]
impl RenderSession for ScriptedSession {
    async fn new_context(&mut self) -> Result<Box<dyn RenderContext>> {
        self.open.fetch_add(1, Ordering::SeqCst);
        self.stats.context_opened();
        Ok(Box::new(ScriptedContext {
            pages: Arc::clone(&self.pages),
            stats: Arc::clone(&self.stats),
            session_open: Arc::clone(&self.open),
            current: None,
            log: Vec::new(),
        }))
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        tokio::time::sleep(self.shutdown_delay).await;
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
        // Tabs still open die with the browser.
        let leftover = self.open.swap(0, Ordering::SeqCst);
        for _ in 0..leftover {
            self.stats.context_closed();
        }
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

struct ScriptedContext {
    pages: Arc<HashMap<String, ScriptedPage>>,
    stats: Arc<ScriptedStats>,
    session_open: Arc<AtomicUsize>,
    current: Option<String>,
    log: Vec<CapturedRequest>,
}

impl ScriptedContext {
    fn current_page(&self) -> Option<&ScriptedPage> {
        self.current.as_ref().and_then(|url| self.pages.get(url))
    }
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();
        self.stats.record_navigation(url);

        let Some(page) = self.pages.get(url) else {
            bail!("net::ERR_NAME_NOT_RESOLVED at {url}");
        };
        if page.fail_navigation {
            bail!("net::ERR_CONNECTION_REFUSED at {url}");
        }

        let timeout = Duration::from_millis(timeout_ms);
        if page.load_delay > timeout {
            tokio::time::sleep(timeout).await;
            bail!("navigation to {url} timed out after {timeout_ms}ms");
        }
        tokio::time::sleep(page.load_delay).await;

        self.log.extend(page.requests.iter().cloned());
        self.current = Some(url.to_string());

        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        if self.current_page().is_some_and(|page| page.hang_scripts) {
            std::future::pending::<()>().await;
        }
        let answer = self.current_page().and_then(|page| {
            page.scripts
                .iter()
                .find(|(marker, _)| script.contains(marker.as_str()))
                .map(|(_, value)| value.clone())
        });
        Ok(answer.unwrap_or(serde_json::Value::Null))
    }

    async fn get_html(&self) -> Result<String> {
        Ok(self
            .current_page()
            .map(|p| p.html.clone())
            .unwrap_or_else(|| BLANK_HTML.to_string()))
    }

    async fn get_url(&self) -> Result<String> {
        Ok(self
            .current
            .clone()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    fn captured_requests(&self) -> Vec<CapturedRequest> {
        self.log.clone()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let _ = self
            .session_open
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|_| self.stats.context_closed());
        Ok(())
    }
}
