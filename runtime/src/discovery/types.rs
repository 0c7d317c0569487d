// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Data types shared by the discovery pipeline.

use crate::error::DiscoveryError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Classification of a feed card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    /// Neither a play control nor an image was found.
    Unknown,
}

/// One `<img>` found in a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub src: Option<String>,
    pub srcset: Option<String>,
}

/// One rendered card in the feed, captured during a single scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    /// Zero-based position in the feed, before windowing.
    pub ordinal: usize,
    pub kind: MediaKind,
    /// Absolute URL of the item's own detail page.
    pub detail_url: Option<String>,
    pub images: Vec<ImageCandidate>,
    /// `src` values of `<video>`/`<source>` elements inside the card.
    pub inline_videos: Vec<String>,
}

/// Where a manifest URL was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestSource {
    NetworkLog,
    PageSource,
    PlayerState,
}

/// A discovered video-manifest URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestCandidate {
    pub url: String,
    pub source: ManifestSource,
    /// Whether the URL is served by the preferred streaming host.
    pub preferred: bool,
}

/// One unit of media produced for an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiscoveredMedia {
    /// A streaming manifest still to be materialized.
    Manifest { url: String },
    /// A file already written to disk.
    File {
        path: PathBuf,
        bytes: u64,
        /// Smaller than the sanity threshold; kept but probably not real media.
        suspect: bool,
    },
}

impl DiscoveredMedia {
    /// Identity used for de-duplication: the URL or the path, compared exactly.
    pub fn key(&self) -> String {
        match self {
            DiscoveredMedia::Manifest { url } => url.clone(),
            DiscoveredMedia::File { path, .. } => path.display().to_string(),
        }
    }
}

/// Result for one windowed feed item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// Zero-based position inside the processing window.
    pub index: usize,
    /// Zero-based position in the feed.
    pub ordinal: usize,
    pub kind: MediaKind,
    pub media: Vec<DiscoveredMedia>,
    /// Set when the item failed; its media is then empty or partial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn new(index: usize, item: &FeedItem) -> Self {
        Self {
            index,
            ordinal: item.ordinal,
            kind: item.kind,
            media: Vec::new(),
            error: None,
        }
    }
}

/// Everything one discovery run produced for one input URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub source_url: String,
    pub kind: UrlKind,
    pub items: Vec<ItemOutcome>,
    /// The wall-clock budget expired before every item was processed.
    pub timed_out: bool,
    pub elapsed_ms: u64,
    /// Run-level problem that did not abort the run, such as a feed page
    /// that failed to load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DiscoveryResult {
    pub fn empty(source_url: impl Into<String>, kind: UrlKind) -> Self {
        Self {
            source_url: source_url.into(),
            kind,
            items: Vec::new(),
            timed_out: false,
            elapsed_ms: 0,
            error: None,
        }
    }

    /// All media in feed order.
    pub fn media(&self) -> impl Iterator<Item = &DiscoveredMedia> {
        self.items.iter().flat_map(|item| item.media.iter())
    }

    pub fn manifest_urls(&self) -> Vec<&str> {
        self.media()
            .filter_map(|m| match m {
                DiscoveredMedia::Manifest { url } => Some(url.as_str()),
                DiscoveredMedia::File { .. } => None,
            })
            .collect()
    }

    pub fn files(&self) -> Vec<&Path> {
        self.media()
            .filter_map(|m| match m {
                DiscoveredMedia::File { path, .. } => Some(path.as_path()),
                DiscoveredMedia::Manifest { .. } => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.media().next().is_none()
    }

    /// Drop media already seen earlier in the result, keeping first occurrences.
    pub fn dedup(&mut self) {
        let mut seen = HashSet::new();
        for item in &mut self.items {
            item.media.retain(|m| seen.insert(m.key()));
        }
    }
}

/// What kind of page the input URL points at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UrlKind {
    /// A feed of many posts; windowing applies.
    #[default]
    Profile,
    /// A single post; exactly one item is produced.
    Post,
}

/// Input for one discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    pub url: String,
    pub max_items: usize,
    pub kind: UrlKind,
    /// Directory for images and directly downloaded videos.
    pub output_dir: PathBuf,
}

impl DiscoveryRequest {
    pub fn new(url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            max_items: 10,
            kind: UrlKind::Profile,
            output_dir: output_dir.into(),
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_kind(mut self, kind: UrlKind) -> Self {
        self.kind = kind;
        self
    }

    /// Reject requests that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.max_items == 0 {
            return Err(DiscoveryError::InvalidRequest(
                "max_items must be a positive integer".into(),
            ));
        }
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| DiscoveryError::InvalidRequest(format!("invalid url {:?}: {e}", self.url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DiscoveryError::InvalidRequest(format!(
                "unsupported url scheme: {}",
                parsed.scheme()
            )));
        }
        Ok(())
    }
}
