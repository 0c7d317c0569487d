// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Media discovery pipeline.
//!
//! The orchestrator acquires a browser session, the feed navigator walks the
//! feed and resolves each item, and the manifest miner recovers streaming
//! manifest URLs from a rendered tab.

pub mod feed;
pub mod manifest;
pub mod orchestrator;
pub mod types;

pub use orchestrator::Orchestrator;
pub use types::{DiscoveredMedia, DiscoveryRequest, DiscoveryResult, UrlKind};
