// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! `reelgrab serve`: run the HTTP API.

use super::output;
use crate::config::DiscoveryConfig;
use crate::discovery::Orchestrator;
use crate::renderer::chromium::ChromiumRenderer;
use crate::rest::{self, AppState};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Run the HTTP API until interrupted. Task directories live under
/// `work_dir`, or the system temp directory.
pub async fn run(host: &str, port: u16, work_dir: Option<PathBuf>, config: DiscoveryConfig) -> Result<()> {
    let work_root = work_dir.unwrap_or_else(std::env::temp_dir);
    tokio::fs::create_dir_all(&work_root)
        .await
        .with_context(|| format!("cannot create work directory {}", work_root.display()))?;

    info!("starting reelgrab v{}", env!("CARGO_PKG_VERSION"));
    let renderer = Arc::new(ChromiumRenderer::new(&config));
    let orchestrator = Arc::new(Orchestrator::new(renderer, config));
    let state = Arc::new(AppState::new(orchestrator, work_root));

    output::note(format!("Listening on http://{host}:{port}"));
    rest::start(host, port, state).await
}
