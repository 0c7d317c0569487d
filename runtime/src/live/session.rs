// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Browser session ownership for one discovery run.
//!
//! A session holds one browser process, one primary tab and at most one
//! transient tab. Every tab operation re-checks that exactly one or two
//! handles are live and that focus falls back to the primary tab once the
//! transient one closes.

use crate::error::DiscoveryError;
use crate::renderer::{RenderContext, RenderSession, Renderer};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Upper bound for closing a single tab during release.
const TAB_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Which tab currently receives operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Primary,
    Transient,
}

/// Warns when a session goes out of scope without `release`.
struct ReleaseGuard {
    session_id: String,
    armed: bool,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                "session {} dropped without release, relying on process teardown",
                self.session_id
            );
        }
    }
}

/// An exclusively owned browser session.
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    runtime: Box<dyn RenderSession>,
    primary: Box<dyn RenderContext>,
    transient: Option<Box<dyn RenderContext>>,
    created_at: Instant,
    guard: ReleaseGuard,
}

impl Session {
    /// Launch an isolated browser and open the primary tab.
    pub async fn acquire(renderer: &dyn Renderer, profile_seed: &str) -> Result<Self, DiscoveryError> {
        let mut runtime = renderer.launch(profile_seed).await?;

        let primary = match runtime.new_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                if let Err(shutdown_err) = runtime.shutdown().await {
                    debug!("shutdown after failed tab open: {shutdown_err:#}");
                }
                return Err(DiscoveryError::BrowserLaunch(format!(
                    "failed to open primary tab: {e:#}"
                )));
            }
        };

        let id = format!("sess-{profile_seed}");
        info!("session {id} acquired");

        Ok(Self {
            guard: ReleaseGuard {
                session_id: id.clone(),
                armed: true,
            },
            id,
            runtime,
            primary,
            transient: None,
            created_at: Instant::now(),
        })
    }

    /// The long-lived feed tab.
    pub fn primary(&mut self) -> &mut dyn RenderContext {
        self.primary.as_mut()
    }

    /// The tab operations currently target.
    pub fn active(&self) -> &dyn RenderContext {
        match &self.transient {
            Some(ctx) => ctx.as_ref(),
            None => self.primary.as_ref(),
        }
    }

    pub fn focus(&self) -> Focus {
        if self.transient.is_some() {
            Focus::Transient
        } else {
            Focus::Primary
        }
    }

    /// Number of tabs this session holds open (1 or 2).
    pub fn live_handles(&self) -> usize {
        1 + usize::from(self.transient.is_some())
    }

    /// How long the session has been alive.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Open the transient tab and focus it.
    ///
    /// A transient tab left over from an interrupted operation is closed
    /// first, so the session never exceeds two tabs.
    pub async fn open_transient(&mut self) -> Result<&mut dyn RenderContext, DiscoveryError> {
        if self.transient.is_some() {
            warn!("session {}: closing stale transient tab", self.id);
            self.close_transient().await;
        }

        let ctx = self
            .runtime
            .new_context()
            .await
            .map_err(|e| DiscoveryError::Navigation(format!("failed to open tab: {e:#}")))?;

        self.transient = Some(ctx);
        self.check_invariant();
        match self.transient.as_deref_mut() {
            Some(ctx) => Ok(ctx),
            None => Err(DiscoveryError::Navigation("transient tab vanished".into())),
        }
    }

    /// Close the transient tab, if any, and return focus to the primary tab.
    pub async fn close_transient(&mut self) {
        if let Some(ctx) = self.transient.take() {
            match tokio::time::timeout(TAB_CLOSE_TIMEOUT, ctx.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("session {}: tab close failed: {e:#}", self.id),
                Err(_) => debug!("session {}: tab close timed out", self.id),
            }
        }
        self.check_invariant();
    }

    fn check_invariant(&self) {
        let live = self.live_handles();
        debug_assert!((1..=2).contains(&live));
        let open = self.runtime.active_contexts();
        if open > 2 {
            warn!("session {}: {open} tabs open, expected at most 2", self.id);
        }
    }

    /// Close every tab, terminate the browser and delete its profile.
    ///
    /// Consumes the session, so it runs at most once.
    pub async fn release(self) {
        let Session {
            id,
            runtime,
            primary,
            transient,
            created_at,
            mut guard,
        } = self;

        if let Some(ctx) = transient {
            let _ = tokio::time::timeout(TAB_CLOSE_TIMEOUT, ctx.close()).await;
        }
        let _ = tokio::time::timeout(TAB_CLOSE_TIMEOUT, primary.close()).await;

        if let Err(e) = runtime.shutdown().await {
            warn!("session {id}: browser shutdown reported an error: {e:#}");
        }

        guard.armed = false;
        info!(
            "session {id} released after {:.1}s",
            created_at.elapsed().as_secs_f64()
        );
    }
}
