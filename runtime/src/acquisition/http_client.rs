// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Streaming media downloader wrapping reqwest.
//!
//! Sends a desktop Chrome identity plus the referring page, retries on 5xx
//! and transport errors with exponential backoff, and backs off on 429.
//! Bodies are streamed to disk chunk by chunk.

use crate::config::DiscoveryConfig;
use crate::discovery::types::DiscoveredMedia;
use crate::error::DiscoveryError;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Files below this many bytes are kept but flagged as suspect.
pub const MIN_SANE_SIZE: u64 = 10_000;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/131.0.0.0 Safari/537.36";

/// A file written by the downloader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bytes: u64,
    pub suspect: bool,
}

impl DownloadOutcome {
    pub fn new(path: PathBuf, bytes: u64) -> Self {
        let suspect = is_suspect(bytes);
        if suspect {
            warn!(
                "{} is only {bytes} bytes, probably not real media",
                path.display()
            );
        }
        Self {
            path,
            bytes,
            suspect,
        }
    }

    pub fn into_media(self) -> DiscoveredMedia {
        DiscoveredMedia::File {
            path: self.path,
            bytes: self.bytes,
            suspect: self.suspect,
        }
    }
}

pub fn is_suspect(bytes: u64) -> bool {
    bytes < MIN_SANE_SIZE
}

/// HTTP downloader for images and directly linked videos.
#[derive(Clone)]
pub struct MediaDownloader {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
}

impl MediaDownloader {
    /// Create a downloader with a Chrome user agent.
    pub fn new(timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            timeout: Duration::from_millis(timeout_ms),
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(config.download_timeout_ms)
    }

    /// Override the first retry delay; later retries double it.
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Stream `url` into `dest`, sending `referer` when given.
    ///
    /// A non-success status after retries is an error and leaves no file
    /// behind. An undersized file is still a success, flagged `suspect`.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        referer: Option<&str>,
    ) -> Result<DownloadOutcome, DiscoveryError> {
        debug!("downloading {url}");
        let resp = self.send_with_retry(url, referer).await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DiscoveryError::download(url, format!("HTTP {}", status.as_u16())));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match write_body(resp, dest).await {
            Ok(bytes) => {
                info!("saved {bytes} bytes to {}", dest.display());
                Ok(DownloadOutcome::new(dest.to_path_buf(), bytes))
            }
            Err(reason) => {
                let _ = tokio::fs::remove_file(dest).await;
                Err(DiscoveryError::download(url, reason))
            }
        }
    }

    async fn send_with_retry(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<reqwest::Response, DiscoveryError> {
        let mut retries = 0u32;

        loop {
            let mut request = self.client.get(url).timeout(self.timeout);
            if let Some(referer) = referer {
                request = request.header(reqwest::header::REFERER, referer);
            }

            match request.send().await {
                Ok(r) => {
                    let status = r.status().as_u16();

                    // Retry on 5xx
                    if status >= 500 && retries < self.max_retries {
                        retries += 1;
                        tokio::time::sleep(self.backoff(retries)).await;
                        continue;
                    }

                    // Backoff on 429
                    if status == 429 && retries < self.max_retries {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        tokio::time::sleep(Duration::from_secs(retry_after.min(10))).await;
                        continue;
                    }

                    return Ok(r);
                }
                Err(e) => {
                    if retries < self.max_retries {
                        retries += 1;
                        debug!("retrying {url} after error: {e}");
                        tokio::time::sleep(self.backoff(retries)).await;
                        continue;
                    }
                    return Err(DiscoveryError::download(url, e));
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.pow(attempt.saturating_sub(1))
    }
}

async fn write_body(resp: reqwest::Response, dest: &Path) -> Result<u64, String> {
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| format!("cannot create {}: {e}", dest.display()))?;

    let mut written = 0u64;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("body stream interrupted: {e}"))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("write failed: {e}"))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| format!("flush failed: {e}"))?;

    Ok(written)
}
