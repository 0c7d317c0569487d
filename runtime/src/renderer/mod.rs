// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer`, `RenderSession` and `RenderContext` traits that
//! abstract over the browser engine: Chromium via chromiumoxide, or the
//! in-memory `scripted::ScriptedRenderer` (tests and the `test-support`
//! feature only).
//! A renderer launches isolated sessions; a session is one browser process
//! with its own profile; a context is one tab inside it.

pub mod chromium;
#[cfg(any(test, feature = "test-support"))]
pub mod scripted;

use crate::error::DiscoveryError;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// One outbound request observed by a tab's network capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub url: String,
    pub method: String,
}

impl CapturedRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
        }
    }
}

/// A browser engine that can launch isolated sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Launch a fresh browser with its own profile directory.
    ///
    /// `profile_seed` only names the profile directory; uniqueness comes
    /// from the launcher.
    async fn launch(&self, profile_seed: &str) -> Result<Box<dyn RenderSession>, DiscoveryError>;
}

/// A running browser instance owned by exactly one discovery run.
#[async_trait]
pub trait RenderSession: Send + Sync {
    /// Open a new tab with network capture already attached.
    async fn new_context(&mut self) -> Result<Box<dyn RenderContext>>;
    /// Terminate the browser and delete its profile directory.
    async fn shutdown(self: Box<Self>) -> Result<()>;
    /// Number of currently open contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for rendering pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute JavaScript in the page context and return the result.
    ///
    /// Promises are awaited.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the full rendered page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Snapshot of every request this tab has sent, in capture order.
    fn captured_requests(&self) -> Vec<CapturedRequest>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}
