// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Direct asset acquisition.
//!
//! Images and directly linked videos are fetched over plain HTTP with a
//! browser identity. Blob references that only exist inside a page are
//! pulled out through the page itself.

pub mod blob;
pub mod http_client;
pub mod srcset;

pub use http_client::{DownloadOutcome, MediaDownloader, MIN_SANE_SIZE};
