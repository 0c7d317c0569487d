// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reelgrab runtime library: headless-browser media discovery for
//! social-commerce feeds.
//!
//! A discovery run drives an isolated Chromium session over a feed or post,
//! recovers streaming manifest URLs from the network log, page source or
//! player state, and downloads images and directly linked videos. Manifests
//! are materialized with `ffmpeg`; finished tasks are served as zip archives
//! over HTTP.

pub mod acquisition;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod live;
pub mod remux;
pub mod renderer;
pub mod rest;
pub mod service;
