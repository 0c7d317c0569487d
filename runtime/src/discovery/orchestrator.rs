// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Top-level discovery policy for one input URL.
//!
//! `START -> ENUMERATE -> (per item) CLASSIFY -> RESOLVE_VIDEO | RESOLVE_IMAGE
//! -> COLLECT -> DONE`
//!
//! The run budget starts before the browser is launched. A cancellation
//! token fires when it expires; launch and every bounded wait select on it,
//! so the run winds down cooperatively with whatever it already found. A
//! hard deadline of budget plus teardown grace drops the run future if a
//! browser call hangs. Media is written into the result as soon as it is
//! found, so both paths keep partial results. The session is released
//! exactly once after the run future finishes or is dropped, and release
//! time never counts against the budget.

use super::feed::{window, FeedNavigator};
use super::types::{DiscoveryRequest, DiscoveryResult, ItemOutcome, MediaKind, UrlKind};
use crate::acquisition::MediaDownloader;
use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::live::Session;
use crate::renderer::Renderer;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// States of a discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Enumerate,
    Classify,
    ResolveVideo,
    ResolveImage,
    Collect,
    Done,
}

fn advance(from: Phase, to: Phase) -> Phase {
    debug!(?from, ?to, "phase");
    to
}

/// Runs discovery for independent URLs. Shareable behind `Arc`; every call
/// gets its own browser session.
pub struct Orchestrator {
    renderer: Arc<dyn Renderer>,
    downloader: MediaDownloader,
    config: DiscoveryConfig,
}

impl Orchestrator {
    pub fn new(renderer: Arc<dyn Renderer>, config: DiscoveryConfig) -> Self {
        Self {
            downloader: MediaDownloader::from_config(&config),
            renderer,
            config,
        }
    }

    pub fn with_downloader(mut self, downloader: MediaDownloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Discover media for one URL.
    ///
    /// Only an invalid request or a browser that cannot be launched is an
    /// error. An expired budget or an unreachable page yields a (possibly
    /// empty) result with `timed_out` or `error` set.
    pub async fn discover(&self, request: DiscoveryRequest) -> Result<DiscoveryResult, DiscoveryError> {
        request.validate()?;
        let run_id = uuid::Uuid::new_v4();
        let span = info_span!("discover", url = %request.url, run_id = %run_id);
        self.discover_run(request, run_id).instrument(span).await
    }

    async fn discover_run(&self, request: DiscoveryRequest, run_id: uuid::Uuid) -> Result<DiscoveryResult, DiscoveryError> {
        let started = Instant::now();
        let budget = self.config.run_timeout();
        let mut phase = Phase::Start;

        tokio::fs::create_dir_all(&request.output_dir).await?;

        let cancel = CancellationToken::new();
        let timer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                cancel.cancel();
            })
        };
        let mut result = DiscoveryResult::empty(&request.url, request.kind);

        let seed: String = run_id.simple().to_string().chars().take(8).collect();
        let acquired = tokio::select! {
            acquired = Session::acquire(self.renderer.as_ref(), &seed) => Some(acquired),
            _ = cancel.cancelled() => None,
        };
        let mut session = match acquired {
            Some(Ok(session)) => session,
            Some(Err(e)) => {
                timer.abort();
                return Err(e);
            }
            None => {
                warn!("time budget exhausted while launching the browser");
                return Ok(self.finish(result, true, phase, started));
            }
        };

        let navigator = FeedNavigator::new(self.config.clone(), self.downloader.clone(), cancel.clone());
        let grace = self.config.teardown_grace();
        let deadline = tokio::time::Instant::from_std(started) + budget + grace;

        let outcome = tokio::time::timeout_at(
            deadline,
            self.run(&navigator, &mut session, &request, &mut result, &mut phase),
        )
        .await;

        // Freeze the budget verdict before teardown, which may be slow.
        timer.abort();
        let budget_hit = cancel.is_cancelled() || outcome.is_err();
        session.release().await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_fatal() => return Err(e),
            Ok(Err(e)) if budget_hit => debug!("run interrupted by the budget: {e}"),
            Ok(Err(e)) => {
                warn!("discovery stopped early: {e}");
                result.error = Some(e.to_string());
            }
            Err(_) => warn!(
                "browser call still pending {}ms after the budget, abandoned",
                grace.as_millis()
            ),
        }

        Ok(self.finish(result, budget_hit, phase, started))
    }

    /// COLLECT: dedup, stamp the timeout verdict and elapsed time.
    fn finish(&self, mut result: DiscoveryResult, budget_hit: bool, phase: Phase, started: Instant) -> DiscoveryResult {
        let phase = advance(phase, Phase::Collect);
        result.dedup();

        result.timed_out = budget_hit;
        if result.timed_out {
            let e = DiscoveryError::TimeoutExceeded {
                budget_ms: self.config.run_timeout_ms,
            };
            warn!("{e}, returning partial results");
            result.error.get_or_insert_with(|| e.to_string());
        }
        result.elapsed_ms = started.elapsed().as_millis() as u64;

        advance(phase, Phase::Done);
        info!(
            "discovery finished: {} items, {} media, {}ms",
            result.items.len(),
            result.media().count(),
            result.elapsed_ms
        );
        result
    }

    async fn run(
        &self,
        navigator: &FeedNavigator,
        session: &mut Session,
        request: &DiscoveryRequest,
        result: &mut DiscoveryResult,
        phase: &mut Phase,
    ) -> Result<(), DiscoveryError> {
        *phase = advance(*phase, Phase::Enumerate);
        let items = match request.kind {
            UrlKind::Profile => {
                let all = navigator.enumerate_items(session, &request.url).await?;
                let windowed = window(all, self.config.skip_leading, request.max_items);
                info!(
                    "processing {} items (skipping {} leading cards)",
                    windowed.len(),
                    self.config.skip_leading
                );
                windowed
            }
            UrlKind::Post => vec![navigator.enumerate_post(session, &request.url).await?],
        };

        for (index, item) in items.iter().enumerate() {
            if navigator.is_cancelled() {
                info!("time budget exhausted before item {index}");
                break;
            }

            *phase = advance(*phase, Phase::Classify);
            result.items.push(ItemOutcome::new(index, item));
            let Some(outcome) = result.items.last_mut() else {
                break;
            };

            let resolved = match item.kind {
                MediaKind::Video => {
                    *phase = advance(*phase, Phase::ResolveVideo);
                    match request.kind {
                        UrlKind::Post => {
                            navigator
                                .resolve_post_video(session, index, &request.output_dir, &mut outcome.media)
                                .await
                        }
                        UrlKind::Profile => {
                            navigator
                                .resolve_video(
                                    session,
                                    item,
                                    index,
                                    &request.url,
                                    &request.output_dir,
                                    &mut outcome.media,
                                )
                                .await
                        }
                    }
                }
                MediaKind::Image | MediaKind::Unknown => {
                    *phase = advance(*phase, Phase::ResolveImage);
                    navigator
                        .resolve_image(item, index, &request.url, &request.output_dir, &mut outcome.media)
                        .await
                }
            };

            match resolved {
                Ok(()) => debug!("item {index} produced {} media", outcome.media.len()),
                Err(e) => {
                    warn!("item {index} (feed position {}) failed: {e}", item.ordinal);
                    outcome.error = Some(e.to_string());
                }
            }
        }

        Ok(())
    }
}
