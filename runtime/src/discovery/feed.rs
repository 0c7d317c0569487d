// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Feed enumeration, card classification and per-item media resolution.
//!
//! Cards are read from the rendered HTML of the primary tab. A card is a
//! video when it contains a play control; this is a layout heuristic and
//! can misclassify. Video items are probed on their own detail page in the
//! transient tab, which is always closed again before returning.

use super::manifest::{extract_manifest_urls, ManifestPattern};
use super::types::{DiscoveredMedia, FeedItem, ImageCandidate, MediaKind};
use crate::acquisition::blob::{blob_fetch_script, is_blob_url, save_data_url};
use crate::acquisition::srcset::best_image_url;
use crate::acquisition::{DownloadOutcome, MediaDownloader};
use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::live::Session;
use crate::renderer::RenderContext;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

pub const FEED_CARD_SELECTOR: &str = "[data-test-id='post-feed-item/card']";
pub const PLAY_CONTROL_SELECTOR: &str =
    "button.play-icon, button.v-btn--fab i.capsule-consumer-play-outline-16";
pub const CONTENT_IMAGE_SELECTOR: &str = ".ltk-img img, img.c-image";

/// Marker for the playback trigger, so test renderers can answer it.
pub const PLAYBACK_MARKER: &str = "reelgrab:playback";

/// Starts every `<video>` two seconds in and clicks the first play-like
/// control. Every failure is swallowed in the page.
pub const PLAYBACK_TRIGGER_JS: &str = r#"/* reelgrab:playback */
(() => {
  document.querySelectorAll('video').forEach((v) => {
    try {
      v.muted = true;
      const p = v.play();
      if (p && p.catch) p.catch(() => {});
      v.currentTime = 2;
    } catch (e) {}
  });
  try {
    const btn = document.querySelector("[class*='play'], [id*='play'], button[class*='video']");
    if (btn) btn.click();
  } catch (e) {}
  return true;
})()"#;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

// ── Parsing ─────────────────────────────────────────────────────────────────

/// Resolve `raw` against `base`, dropping empty, script and fragment links.
fn absolutize(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') || raw.starts_with("javascript:") {
        return None;
    }
    if is_blob_url(raw) {
        return Some(raw.to_string());
    }
    base.join(raw).ok().map(|u| u.to_string())
}

/// Classify a card: a play control makes it a video, any image an image.
pub fn classify_card(card: &ElementRef<'_>) -> MediaKind {
    if card.select(&selector(PLAY_CONTROL_SELECTOR)).next().is_some() {
        MediaKind::Video
    } else if card.select(&selector("img")).next().is_some() {
        MediaKind::Image
    } else {
        MediaKind::Unknown
    }
}

fn card_images(root: &ElementRef<'_>, base: &Url) -> Vec<ImageCandidate> {
    let content = selector(CONTENT_IMAGE_SELECTOR);
    let mut elements: Vec<ElementRef<'_>> = root.select(&content).collect();
    if elements.is_empty() {
        elements = root.select(&selector("img")).collect();
    }

    elements
        .iter()
        .map(|img| {
            let attr = img.value().attr("src").or_else(|| img.value().attr("data-src"));
            ImageCandidate {
                src: attr
                    .filter(|s| !s.starts_with("data:"))
                    .and_then(|s| absolutize(base, s)),
                srcset: img
                    .value()
                    .attr("srcset")
                    .map(str::to_string)
                    .filter(|s| !s.trim().is_empty()),
            }
        })
        .collect()
}

fn video_sources_in(root: &ElementRef<'_>, base: &Url) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for el in root.select(&selector("video[src], video source[src]")) {
        if let Some(url) = el.value().attr("src").and_then(|s| absolutize(base, s)) {
            if !out.contains(&url) {
                out.push(url);
            }
        }
    }
    out
}

fn detail_url(card: &ElementRef<'_>, base: &Url) -> Option<String> {
    card.value()
        .attr("href")
        .or_else(|| {
            card.select(&selector("a[href]"))
                .next()
                .and_then(|a| a.value().attr("href"))
        })
        .and_then(|href| absolutize(base, href))
}

/// Parse every feed card in rendered feed HTML.
pub fn parse_feed(html: &str, base: &Url) -> Vec<FeedItem> {
    let doc = Html::parse_document(html);
    let cards = selector(FEED_CARD_SELECTOR);
    let items = doc
        .select(&cards)
        .enumerate()
        .map(|(ordinal, card)| FeedItem {
            ordinal,
            kind: classify_card(&card),
            detail_url: detail_url(&card, base),
            images: card_images(&card, base),
            inline_videos: video_sources_in(&card, base),
        })
        .collect();
    items
}

/// Read a single post page as one item.
pub fn parse_post(html: &str, page_url: &Url) -> FeedItem {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let has_video = root.select(&selector("video")).next().is_some()
        || root.select(&selector(PLAY_CONTROL_SELECTOR)).next().is_some();

    let mut images: Vec<ImageCandidate> = root
        .select(&selector(CONTENT_IMAGE_SELECTOR))
        .map(|img| ImageCandidate {
            src: img.value().attr("src").and_then(|s| absolutize(page_url, s)),
            srcset: img.value().attr("srcset").map(str::to_string),
        })
        .collect();
    if images.is_empty() {
        images = root
            .select(&selector("meta[property='og:image']"))
            .filter_map(|m| m.value().attr("content"))
            .filter_map(|s| absolutize(page_url, s))
            .map(|src| ImageCandidate {
                src: Some(src),
                srcset: None,
            })
            .collect();
    }

    let kind = if has_video {
        MediaKind::Video
    } else if images.is_empty() {
        MediaKind::Unknown
    } else {
        MediaKind::Image
    };

    FeedItem {
        ordinal: 0,
        kind,
        detail_url: Some(page_url.to_string()),
        images,
        inline_videos: video_sources_in(&root, page_url),
    }
}

/// `<video>`/`<source>` sources of a whole page.
pub fn page_video_sources(html: &str, base: &Url) -> Vec<String> {
    let doc = Html::parse_document(html);
    let sources = video_sources_in(&doc.root_element(), base);
    sources
}

fn is_likely_video_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    [".mp4", ".webm", ".mov", "/video", "media", "/stream", "mux.com"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Absolute video URLs mentioned in page source or player config attributes.
pub fn direct_video_urls_in_source(html: &str) -> Vec<String> {
    let patterns = [
        r#"(https?://[^"'\s<>]+\.mp4)"#,
        r#"videoSrc\s*[:=]\s*["']([^"']+)["']"#,
        r#"videoUrl\s*[:=]\s*["']([^"']+)["']"#,
        r#"data-video-url=["']([^"']+)["']"#,
    ];

    let mut out: Vec<String> = Vec::new();
    for pattern in patterns {
        let re = Regex::new(pattern).expect("video source regex is valid");
        for caps in re.captures_iter(html) {
            let Some(m) = caps.get(1) else { continue };
            let url = m.as_str();
            let absolute = url.starts_with("http://") || url.starts_with("https://");
            if absolute && is_likely_video_url(url) && !out.iter().any(|u| u == url) {
                out.push(url.to_string());
            }
        }
    }
    out
}

fn html_has(html: &str, css: &str) -> bool {
    let Ok(sel) = Selector::parse(css) else {
        return false;
    };
    let doc = Html::parse_document(html);
    let found = doc.select(&sel).next().is_some();
    found
}

// ── Windowing ───────────────────────────────────────────────────────────────

/// Skip the leading promotional cards, then keep at most `max_items`.
pub fn window(items: Vec<FeedItem>, skip_leading: usize, max_items: usize) -> Vec<FeedItem> {
    items.into_iter().skip(skip_leading).take(max_items).collect()
}

// ── Browser-driven steps ────────────────────────────────────────────────────

/// Drives the browser for one discovery run.
pub struct FeedNavigator {
    config: DiscoveryConfig,
    pattern: ManifestPattern,
    downloader: MediaDownloader,
    cancel: CancellationToken,
}

impl FeedNavigator {
    pub fn new(config: DiscoveryConfig, downloader: MediaDownloader, cancel: CancellationToken) -> Self {
        Self {
            pattern: ManifestPattern::from_config(&config),
            config,
            downloader,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sleep for `d` unless the run budget expires first.
    async fn pause(&self, d: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(d) => true,
        }
    }

    /// Poll rendered HTML until `css` matches, the wait expires or the run
    /// is cancelled. Never fails; returns whether the element appeared.
    pub async fn wait_for_selector(&self, ctx: &dyn RenderContext, css: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match ctx.get_html().await {
                Ok(html) if html_has(&html, css) => return true,
                Ok(_) => {}
                Err(e) => debug!("html read failed while waiting for {css}: {e:#}"),
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                debug!("gave up waiting for {css} after {}ms", timeout.as_millis());
                return false;
            }
            if !self.pause(POLL_INTERVAL.min(deadline - now)).await {
                return false;
            }
        }
    }

    /// Navigate `ctx`, giving up early if the run budget expires.
    async fn navigate(&self, ctx: &mut dyn RenderContext, url: &str) -> Result<(), DiscoveryError> {
        let loaded = tokio::select! {
            r = ctx.navigate(url, self.config.navigation_timeout_ms) => r,
            _ = self.cancel.cancelled() => {
                return Err(DiscoveryError::Navigation(format!("{url}: abandoned, time budget exhausted")));
            }
        };
        loaded
            .map(|nav| debug!("loaded {} in {}ms", nav.final_url, nav.load_time_ms))
            .map_err(|e| DiscoveryError::Navigation(format!("{url}: {e:#}")))
    }

    /// Load the feed in the primary tab and parse its cards in feed order.
    pub async fn enumerate_items(&self, session: &mut Session, feed_url: &str) -> Result<Vec<FeedItem>, DiscoveryError> {
        let base = Url::parse(feed_url)
            .map_err(|e| DiscoveryError::InvalidRequest(format!("invalid url {feed_url:?}: {e}")))?;

        let tab = session.primary();
        self.navigate(tab, feed_url).await?;

        if !self
            .wait_for_selector(tab, FEED_CARD_SELECTOR, self.config.element_wait())
            .await
        {
            warn!("no feed cards appeared on {feed_url}");
        }
        self.pause(self.config.feed_settle()).await;

        let html = tab
            .get_html()
            .await
            .map_err(|e| DiscoveryError::Navigation(format!("could not read feed html: {e:#}")))?;
        let items = parse_feed(&html, &base);
        info!("found {} feed cards on {feed_url}", items.len());
        Ok(items)
    }

    /// Load a single post in the primary tab and read it as one item.
    pub async fn enumerate_post(&self, session: &mut Session, post_url: &str) -> Result<FeedItem, DiscoveryError> {
        let base = Url::parse(post_url)
            .map_err(|e| DiscoveryError::InvalidRequest(format!("invalid url {post_url:?}: {e}")))?;

        let tab = session.primary();
        self.navigate(tab, post_url).await?;
        self.wait_for_selector(tab, "video, img", self.config.element_wait())
            .await;

        let html = tab
            .get_html()
            .await
            .map_err(|e| DiscoveryError::Navigation(format!("could not read post html: {e:#}")))?;
        Ok(parse_post(&html, &base))
    }

    /// Resolve a video item, appending media to `out` as it is found.
    ///
    /// With a detail URL the probe runs in the transient tab, which is
    /// closed on every path. Without one, the card's inline sources are used.
    pub async fn resolve_video(
        &self,
        session: &mut Session,
        item: &FeedItem,
        index: usize,
        referer: &str,
        output_dir: &Path,
        out: &mut Vec<DiscoveredMedia>,
    ) -> Result<(), DiscoveryError> {
        let Some(detail) = item.detail_url.as_deref() else {
            debug!("card {} has no detail link, using inline sources", item.ordinal);
            return self
                .fetch_sources(session.primary(), &item.inline_videos, index, referer, output_dir, out)
                .await;
        };

        let result = match session.open_transient().await {
            Ok(tab) => self.probe_video(tab, Some(detail), index, output_dir, out).await,
            Err(e) => Err(e),
        };
        session.close_transient().await;
        result
    }

    /// Resolve the single post already loaded in the primary tab.
    pub async fn resolve_post_video(
        &self,
        session: &mut Session,
        index: usize,
        output_dir: &Path,
        out: &mut Vec<DiscoveredMedia>,
    ) -> Result<(), DiscoveryError> {
        self.probe_video(session.primary(), None, index, output_dir, out)
            .await
    }

    /// Play the page's video and mine it for manifests, falling back to the
    /// element sources and then to video URLs in the page source.
    async fn probe_video(
        &self,
        tab: &mut dyn RenderContext,
        navigate_to: Option<&str>,
        index: usize,
        output_dir: &Path,
        out: &mut Vec<DiscoveredMedia>,
    ) -> Result<(), DiscoveryError> {
        if let Some(url) = navigate_to {
            self.navigate(tab, url).await?;
        }
        let page_url = tab.get_url().await.unwrap_or_default();

        if !self
            .wait_for_selector(tab, "video", self.config.element_wait())
            .await
        {
            debug!("no <video> element on {page_url}");
        }
        if self.is_cancelled() {
            return Ok(());
        }

        if let Err(e) = tab.execute_js(PLAYBACK_TRIGGER_JS).await {
            debug!("playback trigger failed (ignored): {e:#}");
        }
        self.pause(self.config.playback_settle()).await;

        let manifests = extract_manifest_urls(tab, &self.pattern).await;
        if !manifests.is_empty() {
            info!("found {} manifest URLs on {page_url}", manifests.len());
            out.extend(
                manifests
                    .into_iter()
                    .map(|c| DiscoveredMedia::Manifest { url: c.url }),
            );
            return Ok(());
        }
        if self.is_cancelled() {
            return Ok(());
        }

        let html = tab
            .get_html()
            .await
            .map_err(|e| DiscoveryError::Navigation(format!("could not read page html: {e:#}")))?;
        let base = Url::parse(&page_url)
            .or_else(|_| Url::parse(navigate_to.unwrap_or_default()))
            .map_err(|e| DiscoveryError::Navigation(format!("unusable page url {page_url:?}: {e}")))?;

        let mut sources = page_video_sources(&html, &base);
        if sources.is_empty() {
            sources = direct_video_urls_in_source(&html);
        }
        if sources.is_empty() {
            info!("no video found on {page_url}");
            return Ok(());
        }

        self.fetch_sources(tab, &sources, index, &page_url, output_dir, out)
            .await
    }

    /// Save each source as `video_<index>_<n>.mp4`. Blob references are
    /// fetched inside `tab`; failures are logged per source.
    async fn fetch_sources(
        &self,
        tab: &mut dyn RenderContext,
        sources: &[String],
        index: usize,
        referer: &str,
        output_dir: &Path,
        out: &mut Vec<DiscoveredMedia>,
    ) -> Result<(), DiscoveryError> {
        for (n, src) in sources.iter().enumerate() {
            if self.is_cancelled() {
                break;
            }
            let dest = output_dir.join(format!("video_{index}_{n}.mp4"));

            let saved = if is_blob_url(src) {
                self.fetch_blob(tab, src, &dest).await
            } else {
                self.downloader.download(src, &dest, Some(referer)).await
            };

            match saved {
                Ok(file) => out.push(file.into_media()),
                Err(e) => warn!("video source {src} skipped: {e}"),
            }
        }
        Ok(())
    }

    async fn fetch_blob(&self, tab: &dyn RenderContext, blob_url: &str, dest: &Path) -> Result<DownloadOutcome, DiscoveryError> {
        info!("fetching blob {blob_url} in page");
        let value = tab
            .execute_js(&blob_fetch_script(blob_url))
            .await
            .map_err(|e| DiscoveryError::download(blob_url, format!("{e:#}")))?;
        let data = value
            .as_str()
            .ok_or_else(|| DiscoveryError::download(blob_url, "script returned no data"))?;
        let bytes = save_data_url(blob_url, data, dest).await?;
        Ok(DownloadOutcome::new(dest.to_path_buf(), bytes))
    }

    /// Download every image of an item as `image_<index>_<n>.jpg`, choosing
    /// the densest `srcset` entry when there is one.
    pub async fn resolve_image(
        &self,
        item: &FeedItem,
        index: usize,
        referer: &str,
        output_dir: &Path,
        out: &mut Vec<DiscoveredMedia>,
    ) -> Result<(), DiscoveryError> {
        if item.images.is_empty() {
            debug!("card {} has no images", item.ordinal);
            return Ok(());
        }
        let base = Url::parse(referer).ok();

        for (n, image) in item.images.iter().enumerate() {
            if self.is_cancelled() {
                break;
            }
            let Some(raw) = best_image_url(image) else {
                continue;
            };
            let url = match &base {
                Some(b) => absolutize(b, &raw).unwrap_or(raw),
                None => raw,
            };
            if url.starts_with("data:") {
                continue;
            }

            let dest = output_dir.join(format!("image_{index}_{n}.jpg"));
            match self.downloader.download(&url, &dest, Some(referer)).await {
                Ok(file) => out.push(file.into_media()),
                Err(e) => warn!("image {url} skipped: {e}"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"
    <html><body>
      <div data-test-id="post-feed-item/card" class="promo"><a href="/promo/1"><img src="/static/banner.png"></a></div>
      <div data-test-id="post-feed-item/card" class="promo"><a href="/promo/2"><img src="/static/banner2.png"></a></div>
      <a data-test-id="post-feed-item/card" href="/p/video-1">
        <div class="ltk-img"><img src="https://img.example/poster.jpg"></div>
        <button class="play-icon"></button>
      </a>
      <div data-test-id="post-feed-item/card">
        <a href="https://www.shopltk.com/p/photo-1">
          <div class="ltk-img"><img src="https://img.example/p1.jpg" srcset="https://img.example/p1.jpg 1x, https://img.example/p1@2x.jpg 2x"></div>
        </a>
      </div>
      <div data-test-id="post-feed-item/card">
        <button class="v-btn--fab"><i class="capsule-consumer-play-outline-16"></i></button>
        <video src="blob:https://www.shopltk.com/9d1c"></video>
      </div>
      <div data-test-id="post-feed-item/card"><span>sold out</span></div>
    </body></html>"#;

    fn base() -> Url {
        Url::parse("https://www.shopltk.com/explore/someone").unwrap()
    }

    #[test]
    fn test_parse_feed_classifies_cards() {
        let items = parse_feed(FEED, &base());
        assert_eq!(items.len(), 6);
        assert_eq!(
            items.iter().map(|i| i.kind).collect::<Vec<_>>(),
            vec![
                MediaKind::Image,
                MediaKind::Image,
                MediaKind::Video,
                MediaKind::Image,
                MediaKind::Video,
                MediaKind::Unknown
            ]
        );
        assert_eq!(items[2].detail_url.as_deref(), Some("https://www.shopltk.com/p/video-1"));
        assert_eq!(items[3].detail_url.as_deref(), Some("https://www.shopltk.com/p/photo-1"));
        assert_eq!(items[4].detail_url, None);
        assert_eq!(items[4].inline_videos, vec!["blob:https://www.shopltk.com/9d1c"]);
        assert_eq!(items[0].images[0].src.as_deref(), Some("https://www.shopltk.com/static/banner.png"));
        assert!(items[3].images[0].srcset.is_some());
    }

    #[test]
    fn test_window_skips_and_limits() {
        let items = parse_feed(FEED, &base());
        let kept = window(items.clone(), 2, 10);
        assert_eq!(kept.len(), 4);
        assert_eq!(kept[0].ordinal, 2);

        assert_eq!(window(items.clone(), 2, 1).len(), 1);
        assert!(window(items[..2].to_vec(), 2, 10).is_empty());
        assert_eq!(window(items, 0, 3).len(), 3);
    }

    #[test]
    fn test_window_size_formula() {
        let sample = parse_feed(FEED, &base());
        for n in 0..=sample.len() {
            for max in 1..=7 {
                let got = window(sample[..n].to_vec(), 2, max).len();
                assert_eq!(got, n.saturating_sub(2).min(max));
            }
        }
    }

    #[test]
    fn test_parse_post_page() {
        let html = r#"<html><head><meta property="og:image" content="/og/cover.jpg"></head>
            <body><video><source src="/media/clip.mp4"></video></body></html>"#;
        let url = Url::parse("https://www.shopltk.com/p/abc").unwrap();
        let item = parse_post(html, &url);
        assert_eq!(item.kind, MediaKind::Video);
        assert_eq!(item.inline_videos, vec!["https://www.shopltk.com/media/clip.mp4"]);
        assert_eq!(item.images[0].src.as_deref(), Some("https://www.shopltk.com/og/cover.jpg"));

        let photo = parse_post("<div class='ltk-img'><img src='https://img.example/a.jpg'></div>", &url);
        assert_eq!(photo.kind, MediaKind::Image);
        assert_eq!(parse_post("<p>gone</p>", &url).kind, MediaKind::Unknown);
    }

    #[test]
    fn test_direct_video_urls_in_source() {
        let html = r#"<script>window.cfg = { videoUrl: "https://media.example/v/1.mp4", logo: "https://cdn.example/logo.png" };</script>
            <div data-video-url="https://stream.example/clip"></div>
            <p>https://media.example/v/1.mp4 again</p>
            <p>videoSrc = '/relative/skip.mp4'</p>"#;
        assert_eq!(
            direct_video_urls_in_source(html),
            vec!["https://media.example/v/1.mp4", "https://stream.example/clip"]
        );
    }

    #[test]
    fn test_absolutize() {
        let b = base();
        assert_eq!(absolutize(&b, "#top"), None);
        assert_eq!(absolutize(&b, "javascript:void(0)"), None);
        assert_eq!(absolutize(&b, "  "), None);
        assert_eq!(absolutize(&b, "blob:https://x/1").as_deref(), Some("blob:https://x/1"));
        assert_eq!(
            absolutize(&b, "../p/1").as_deref(),
            Some("https://www.shopltk.com/p/1")
        );
    }

    #[test]
    fn test_html_has() {
        assert!(html_has("<div><video></video></div>", "video"));
        assert!(!html_has("<div></div>", "video"));
        assert!(!html_has("<div></div>", "[[bad"));
    }
}
