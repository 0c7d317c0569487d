// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommand implementations for the reelgrab binary.

pub mod discover_cmd;
pub mod doctor;
pub mod output;
pub mod remux_cmd;
pub mod serve_cmd;

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` wins over the defaults of `reelgrab=info`, or
/// `reelgrab=debug` with `verbose`.
pub fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "reelgrab=debug" } else { "reelgrab=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
