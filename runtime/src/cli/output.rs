// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Output mode shared by all commands.
//!
//! `main` records the global `--json` and `--quiet` flags in the
//! environment so every command can check them.

use serde_json::Value;

pub const JSON_ENV: &str = "REELGRAB_JSON";
pub const QUIET_ENV: &str = "REELGRAB_QUIET";

pub fn is_json() -> bool {
    std::env::var_os(JSON_ENV).is_some()
}

pub fn is_quiet() -> bool {
    std::env::var_os(QUIET_ENV).is_some()
}

/// Pretty-print a JSON document on stdout.
pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}

/// Human progress line on stderr, silent in quiet or JSON mode.
pub fn note(message: impl std::fmt::Display) {
    if !is_quiet() && !is_json() {
        eprintln!("  {message}");
    }
}
