// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Live browser sessions.

pub mod session;

pub use session::{Focus, Session};
