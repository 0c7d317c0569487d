// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! `reelgrab remux <manifest> <output>`: materialize one manifest.

use super::output;
use crate::config::DiscoveryConfig;
use crate::remux::Remuxer;
use anyhow::Result;
use serde_json::json;
use std::path::Path;

/// Run the remux command. A missing `ffmpeg` fails with install guidance.
pub async fn run(manifest_url: &str, dest: &Path, config: &DiscoveryConfig) -> Result<()> {
    let remuxer = Remuxer::from_config(config)?;
    output::note(format!("Remuxing with {}", remuxer.binary().display()));

    remuxer.materialize(manifest_url, dest).await?;

    if output::is_json() {
        output::print_json(&json!({
            "manifest": manifest_url,
            "output": dest.display().to_string(),
        }));
    } else if !output::is_quiet() {
        println!("Saved {}", dest.display());
    }
    Ok(())
}
