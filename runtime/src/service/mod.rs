// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Background download tasks behind the HTTP API.
//!
//! A task runs one discovery, materializes its manifests, packs the output
//! directory into a zip and records the outcome in a shared registry.

pub mod archive;
pub mod tasks;

pub use tasks::{run_task, TaskRecord, TaskRegistry, TaskStatus};
