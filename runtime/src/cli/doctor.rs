// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment readiness check.

use super::output;
use crate::config::DiscoveryConfig;
use crate::remux::{remediation, Remuxer};
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;

/// Locate the browser: explicit config first, then auto-detection.
fn browser_path(config: &DiscoveryConfig) -> Option<PathBuf> {
    config
        .chrome_path
        .clone()
        .filter(|p| p.exists())
        .or_else(find_chromium)
}

/// Check browser and remuxer availability.
pub async fn run(config: &DiscoveryConfig) -> Result<()> {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    let browser = browser_path(config);
    let remuxer = Remuxer::from_config(config).ok();
    let ready = browser.is_some() && remuxer.is_some();

    if output::is_json() {
        output::print_json(&json!({
            "os": os,
            "arch": arch,
            "browser": browser.as_ref().map(|p| p.display().to_string()),
            "ffmpeg": remuxer.as_ref().map(|r| r.binary().display().to_string()),
            "ready": ready,
        }));
        return Ok(());
    }

    println!("Reelgrab Doctor");
    println!("===============");
    println!();
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    match &browser {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!("[!!] Chromium NOT found. Install Chrome or set REELGRAB_CHROME_PATH."),
    }
    match &remuxer {
        Some(r) => println!("[OK] ffmpeg found: {}", r.binary().display()),
        None => {
            println!("[!!] ffmpeg NOT found (needed to save streamed videos).");
            println!("     {}", remediation(os));
        }
    }

    println!();
    if ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_browser_path_wins_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("chrome");
        std::fs::write(&fake, b"").unwrap();
        let config = DiscoveryConfig {
            chrome_path: Some(fake.clone()),
            ..DiscoveryConfig::default()
        };
        assert_eq!(browser_path(&config), Some(fake));
    }
}
