// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! `reelgrab discover <url>`: find and save the media behind a feed or post.

use super::output;
use crate::config::{default_output_dir, DiscoveryConfig};
use crate::discovery::{DiscoveredMedia, DiscoveryRequest, DiscoveryResult, Orchestrator, UrlKind};
use crate::remux::Remuxer;
use crate::renderer::chromium::ChromiumRenderer;
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Flags of the discover command.
#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    pub url: String,
    pub max_items: Option<usize>,
    pub kind: UrlKind,
    pub skip: Option<usize>,
    pub output: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub no_remux: bool,
}

impl DiscoverOptions {
    /// Fold the command flags into `config`.
    pub fn apply(&self, config: &mut DiscoveryConfig) {
        if let Some(skip) = self.skip {
            config.skip_leading = skip;
        }
        if let Some(secs) = self.timeout_secs {
            config.run_timeout_ms = secs.saturating_mul(1_000);
        }
        if let Some(max) = self.max_items {
            config.max_items = max;
        }
    }
}

/// What the command produced.
#[derive(Debug, Serialize)]
pub struct DiscoverReport {
    pub result: DiscoveryResult,
    /// Videos written by the remuxer.
    pub remuxed: Vec<PathBuf>,
    pub output_dir: PathBuf,
}

/// Run the discover command.
pub async fn run(options: DiscoverOptions, mut config: DiscoveryConfig) -> Result<()> {
    options.apply(&mut config);
    let output_dir = options.output.clone().unwrap_or_else(default_output_dir);

    let renderer = Arc::new(ChromiumRenderer::new(&config));
    let orchestrator = Orchestrator::new(renderer, config);

    output::note(format!("Discovering media on {}", options.url));
    let report = execute(&orchestrator, &options, output_dir).await?;

    if output::is_json() {
        output::print_json(&serde_json::to_value(&report)?);
    } else if !output::is_quiet() {
        print_summary(&report);
    }
    Ok(())
}

/// Discover, then remux manifests unless disabled.
///
/// A missing remuxer is an error only when there is something to remux.
pub async fn execute(
    orchestrator: &Orchestrator,
    options: &DiscoverOptions,
    output_dir: PathBuf,
) -> Result<DiscoverReport> {
    let request = DiscoveryRequest::new(&options.url, &output_dir)
        .with_max_items(orchestrator.config().max_items)
        .with_kind(options.kind);
    let result = orchestrator.discover(request).await?;

    let mut remuxed = Vec::new();
    if !options.no_remux && !result.manifest_urls().is_empty() {
        let remuxer = Remuxer::from_config(orchestrator.config())?;
        remuxed = remuxer.materialize_all(&result, &output_dir).await?;
    }

    Ok(DiscoverReport {
        result,
        remuxed,
        output_dir,
    })
}

fn print_summary(report: &DiscoverReport) {
    let result = &report.result;
    println!(
        "Processed {} items in {:.1}s{}",
        result.items.len(),
        result.elapsed_ms as f64 / 1000.0,
        if result.timed_out { " (time budget exhausted)" } else { "" }
    );

    for item in &result.items {
        println!("  [{}] {:?} (feed position {})", item.index, item.kind, item.ordinal);
        for media in &item.media {
            match media {
                DiscoveredMedia::Manifest { url } => println!("      manifest  {url}"),
                DiscoveredMedia::File { path, bytes, suspect } => println!(
                    "      file      {} ({bytes} bytes){}",
                    path.display(),
                    if *suspect { " [suspect]" } else { "" }
                ),
            }
        }
        if let Some(e) = &item.error {
            println!("      error     {e}");
        }
    }

    for path in &report.remuxed {
        println!("  remuxed {}", path.display());
    }
    if let Some(e) = &result.error {
        println!("  note: {e}");
    }
    println!("Output directory: {}", report.output_dir.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::scripted::{ScriptedPage, ScriptedRenderer};

    const POST_URL: &str = "https://www.shopltk.com/p/abc";

    fn options(no_remux: bool) -> DiscoverOptions {
        DiscoverOptions {
            url: POST_URL.into(),
            max_items: None,
            kind: UrlKind::Post,
            skip: None,
            output: None,
            timeout_secs: Some(5),
            no_remux,
        }
    }

    fn quick_config() -> DiscoveryConfig {
        DiscoveryConfig {
            element_wait_ms: 20,
            feed_settle_ms: 0,
            playback_settle_ms: 0,
            ..DiscoveryConfig::default()
        }
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = DiscoveryConfig::default();
        let opts = DiscoverOptions {
            skip: Some(0),
            max_items: Some(3),
            ..options(false)
        };
        opts.apply(&mut config);
        assert_eq!(config.skip_leading, 0);
        assert_eq!(config.max_items, 3);
        assert_eq!(config.run_timeout_ms, 5_000);
    }

    #[tokio::test]
    async fn test_no_remux_returns_manifests_only() {
        let page = ScriptedPage::new("<html><body><video></video></body></html>")
            .request("https://stream.mux.com/abc.m3u8");
        let renderer = ScriptedRenderer::new().page(POST_URL, page);
        let orchestrator = Orchestrator::new(Arc::new(renderer), quick_config());

        let dir = tempfile::tempdir().unwrap();
        let report = execute(&orchestrator, &options(true), dir.path().to_path_buf())
            .await
            .unwrap();
        assert_eq!(report.result.manifest_urls(), vec!["https://stream.mux.com/abc.m3u8"]);
        assert!(report.remuxed.is_empty());
    }

    #[tokio::test]
    async fn test_missing_remuxer_surfaces_when_manifests_exist() {
        let page = ScriptedPage::new("<html><body><video></video></body></html>")
            .request("https://stream.mux.com/abc.m3u8");
        let renderer = ScriptedRenderer::new().page(POST_URL, page);
        let config = DiscoveryConfig {
            ffmpeg_path: Some(PathBuf::from("/nonexistent/reelgrab/ffmpeg")),
            ..quick_config()
        };
        let orchestrator = Orchestrator::new(Arc::new(renderer), config);

        let dir = tempfile::tempdir().unwrap();
        let err = execute(&orchestrator, &options(false), dir.path().to_path_buf())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ffmpeg not found"));
    }
}
