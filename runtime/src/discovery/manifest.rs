// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Manifest URL mining over a rendered tab.
//!
//! Tiers run in order and the first one that yields anything wins:
//!
//! 1. requests captured by the tab's network listener,
//! 2. absolute manifest URLs in the rendered HTML,
//! 3. the embedded video.js player's active sources.
//!
//! Nothing found is a valid outcome and returns an empty list. Inside every
//! tier, candidates on the preferred streaming host come first and
//! encounter order is kept within each group. Duplicates are dropped by
//! exact string comparison.

use super::types::{ManifestCandidate, ManifestSource};
use crate::config::DiscoveryConfig;
use crate::renderer::{CapturedRequest, RenderContext};
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Marker for the player probe, so test renderers can answer it.
pub const PLAYER_PROBE_MARKER: &str = "reelgrab:player-sources";

/// Queries every video.js player on the page for its current source.
pub const PLAYER_PROBE_JS: &str = r#"/* reelgrab:player-sources */
(() => {
  const out = [];
  if (typeof window.videojs !== 'function') return out;
  document.querySelectorAll('.video-js').forEach((el) => {
    try {
      const player = window.videojs.getPlayer(el);
      const src = player && player.src();
      if (src) out.push(String(src));
    } catch (e) {}
  });
  return out;
})()"#;

/// What counts as a manifest URL and which host is preferred.
#[derive(Debug, Clone)]
pub struct ManifestPattern {
    marker: String,
    preferred_host: String,
    page_source_re: Regex,
}

impl ManifestPattern {
    pub fn new(marker: impl Into<String>, preferred_host: impl Into<String>) -> Self {
        let marker = marker.into();
        let page_source_re = Regex::new(&format!(
            r#"https?://[^"'\s<>]+{}"#,
            regex::escape(&marker)
        ))
        .expect("escaped marker is a valid regex");
        Self {
            marker,
            preferred_host: preferred_host.into().to_ascii_lowercase(),
            page_source_re,
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(&config.manifest_marker, &config.preferred_host)
    }

    /// Whether `url` looks like a streaming manifest.
    pub fn matches(&self, url: &str) -> bool {
        url.contains(&self.marker)
    }

    /// Whether `url` is served by the preferred host or one of its subdomains.
    pub fn is_preferred(&self, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        host == self.preferred_host
            || host
                .strip_suffix(self.preferred_host.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }

    /// Drop duplicates and put preferred-host URLs first, each group in
    /// encounter order.
    fn rank<I>(&self, urls: I, source: ManifestSource) -> Vec<ManifestCandidate>
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let mut preferred = Vec::new();
        let mut other = Vec::new();

        for url in urls {
            if !seen.insert(url.clone()) {
                continue;
            }
            let is_preferred = self.is_preferred(&url);
            let candidate = ManifestCandidate {
                url,
                source,
                preferred: is_preferred,
            };
            if is_preferred {
                preferred.push(candidate);
            } else {
                other.push(candidate);
            }
        }

        preferred.extend(other);
        preferred
    }
}

impl Default for ManifestPattern {
    fn default() -> Self {
        Self::from_config(&DiscoveryConfig::default())
    }
}

// ── Tiers ───────────────────────────────────────────────────────────────────

/// Tier 1: manifest URLs among captured outbound requests.
pub fn mine_network_log(requests: &[CapturedRequest], pattern: &ManifestPattern) -> Vec<ManifestCandidate> {
    pattern.rank(
        requests
            .iter()
            .filter(|r| pattern.matches(&r.url))
            .map(|r| r.url.clone()),
        ManifestSource::NetworkLog,
    )
}

/// Tier 2: absolute manifest URLs in rendered HTML.
pub fn mine_page_source(html: &str, pattern: &ManifestPattern) -> Vec<ManifestCandidate> {
    pattern.rank(
        pattern
            .page_source_re
            .find_iter(html)
            .map(|m| m.as_str().to_string()),
        ManifestSource::PageSource,
    )
}

/// Whether the page embeds the video.js player.
pub fn player_detected(html: &str) -> bool {
    let lower = html.to_ascii_lowercase();
    lower.contains("videojs") || lower.contains("video-js")
}

/// Tier 3: absolute sources reported by the player probe.
pub fn mine_player_state(value: &serde_json::Value, pattern: &ManifestPattern) -> Vec<ManifestCandidate> {
    let urls = value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    pattern.rank(urls, ManifestSource::PlayerState)
}

// ── Public API ──────────────────────────────────────────────────────────────

/// Run the tiers against a tab and return the first non-empty result.
///
/// Tier failures are logged and count as "nothing found".
pub async fn extract_manifest_urls(ctx: &dyn RenderContext, pattern: &ManifestPattern) -> Vec<ManifestCandidate> {
    let from_log = mine_network_log(&ctx.captured_requests(), pattern);
    if !from_log.is_empty() {
        debug!("tier 1 found {} manifest URLs", from_log.len());
        return from_log;
    }

    let html = match ctx.get_html().await {
        Ok(html) => html,
        Err(e) => {
            warn!("could not read page source: {e:#}");
            String::new()
        }
    };

    let from_source = mine_page_source(&html, pattern);
    if !from_source.is_empty() {
        debug!("tier 2 found {} manifest URLs", from_source.len());
        return from_source;
    }

    if player_detected(&html) {
        match ctx.execute_js(PLAYER_PROBE_JS).await {
            Ok(value) => {
                let from_player = mine_player_state(&value, pattern);
                if !from_player.is_empty() {
                    debug!("tier 3 found {} manifest URLs", from_player.len());
                    return from_player;
                }
            }
            Err(e) => warn!("player probe failed: {e:#}"),
        }
    }

    debug!("no manifest URLs found");
    Vec::new()
}
