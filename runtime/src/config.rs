// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration loading and resolution.
//!
//! Precedence, lowest to highest: built-in defaults, optional JSON file,
//! `REELGRAB_*` environment variables, CLI flags (applied by the caller).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Tunables for one discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Explicit browser binary. `None` lets the launcher detect one.
    pub chrome_path: Option<PathBuf>,
    /// Explicit remuxer binary. `None` searches `PATH` for `ffmpeg`.
    pub ffmpeg_path: Option<PathBuf>,
    /// Wall-clock budget for the whole run, browser launch included.
    pub run_timeout_ms: u64,
    /// Time past the budget that a hung browser call gets before the run
    /// is abandoned.
    pub teardown_grace_ms: u64,
    /// Timeout for a single page navigation.
    pub navigation_timeout_ms: u64,
    /// Bounded wait for a DOM element (feed card, `<video>`).
    pub element_wait_ms: u64,
    /// Pause after the feed appears so lazy cards can render.
    pub feed_settle_ms: u64,
    /// Pause after triggering playback so manifest requests go out.
    pub playback_settle_ms: u64,
    /// Browser launch timeout (doubled on the retry attempt).
    pub launch_timeout_ms: u64,
    /// Leading feed cards skipped before windowing.
    pub skip_leading: usize,
    /// Default maximum number of feed items processed.
    pub max_items: usize,
    /// Substring that marks a URL as a streaming manifest.
    pub manifest_marker: String,
    /// Streaming host whose manifests are preferred.
    pub preferred_host: String,
    /// Timeout for a single direct download.
    pub download_timeout_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            ffmpeg_path: None,
            run_timeout_ms: 120_000,
            teardown_grace_ms: 10_000,
            navigation_timeout_ms: 30_000,
            element_wait_ms: 5_000,
            feed_settle_ms: 5_000,
            playback_settle_ms: 5_000,
            launch_timeout_ms: 20_000,
            skip_leading: 2,
            max_items: 10,
            manifest_marker: ".m3u8".to_string(),
            preferred_host: "stream.mux.com".to_string(),
            download_timeout_ms: 60_000,
        }
    }
}

impl DiscoveryConfig {
    /// Load defaults, then the optional JSON file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read config: {}", p.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("invalid config JSON: {}", p.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `REELGRAB_*` overrides read through `lookup`.
    ///
    /// Unparsable numeric values are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(p) = lookup("REELGRAB_CHROME_PATH").filter(|s| !s.is_empty()) {
            self.chrome_path = Some(PathBuf::from(p));
        }
        if let Some(p) = lookup("REELGRAB_FFMPEG_PATH").filter(|s| !s.is_empty()) {
            self.ffmpeg_path = Some(PathBuf::from(p));
        }
        if let Some(host) = lookup("REELGRAB_PREFERRED_HOST").filter(|s| !s.is_empty()) {
            self.preferred_host = host;
        }
        if let Some(raw) = lookup("REELGRAB_RUN_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.run_timeout_ms = ms,
                _ => warn!("ignoring invalid REELGRAB_RUN_TIMEOUT_MS={raw:?}"),
            }
        }
        if let Some(raw) = lookup("REELGRAB_SKIP_LEADING") {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.skip_leading = n,
                Err(_) => warn!("ignoring invalid REELGRAB_SKIP_LEADING={raw:?}"),
            }
        }
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }

    pub fn element_wait(&self) -> Duration {
        Duration::from_millis(self.element_wait_ms)
    }

    pub fn feed_settle(&self) -> Duration {
        Duration::from_millis(self.feed_settle_ms)
    }

    pub fn playback_settle(&self) -> Duration {
        Duration::from_millis(self.playback_settle_ms)
    }
}

/// Default directory for CLI output when `--output` is not given.
pub fn default_output_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reelgrab")
}
