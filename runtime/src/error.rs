// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for discovery, materialization and downloads.
//!
//! Only [`DiscoveryError::BrowserLaunch`], [`DiscoveryError::ToolMissing`]
//! and a rejected request are run-fatal. Everything else is scoped to one
//! item, one tier or one candidate and is logged by the caller before
//! moving on.

/// Errors surfaced by the discovery pipeline.
#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("time budget of {budget_ms}ms exceeded")]
    TimeoutExceeded { budget_ms: u64 },

    #[error("{tool} not found. {remediation}")]
    ToolMissing {
        tool: String,
        remediation: String,
    },

    #[error("remux failed (exit status {}): {stderr}", status.map(|s| s.to_string()).unwrap_or_else(|| "none".into()))]
    RemuxFailure { status: Option<i32>, stderr: String },

    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("navigation error: {0}")]
    Navigation(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoveryError {
    /// Stable machine-readable code, used in CLI JSON output and REST bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DiscoveryError::BrowserLaunch(_) => "E_BROWSER_LAUNCH",
            DiscoveryError::TimeoutExceeded { .. } => "E_TIMEOUT",
            DiscoveryError::ToolMissing { .. } => "E_TOOL_MISSING",
            DiscoveryError::RemuxFailure { .. } => "E_REMUX_FAILED",
            DiscoveryError::Download { .. } => "E_DOWNLOAD_FAILED",
            DiscoveryError::Navigation(_) => "E_NAVIGATION",
            DiscoveryError::InvalidRequest(_) => "E_INVALID_PARAMS",
            DiscoveryError::Io(_) => "E_IO",
        }
    }

    /// Whether this error aborts the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DiscoveryError::BrowserLaunch(_)
                | DiscoveryError::ToolMissing { .. }
                | DiscoveryError::InvalidRequest(_)
        )
    }

    pub(crate) fn download(url: &str, reason: impl std::fmt::Display) -> Self {
        DiscoveryError::Download {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(DiscoveryError::BrowserLaunch("no chrome".into()).is_fatal());
        assert!(DiscoveryError::ToolMissing {
            tool: "ffmpeg".into(),
            remediation: String::new(),
        }
        .is_fatal());
        assert!(!DiscoveryError::TimeoutExceeded { budget_ms: 10 }.is_fatal());
        assert!(!DiscoveryError::RemuxFailure {
            status: Some(1),
            stderr: "bad input".into(),
        }
        .is_fatal());
        assert!(!DiscoveryError::download("https://x", "404").is_fatal());
    }

    #[test]
    fn test_remux_failure_message() {
        let e = DiscoveryError::RemuxFailure {
            status: Some(1),
            stderr: "Invalid data found".into(),
        };
        assert_eq!(e.to_string(), "remux failed (exit status 1): Invalid data found");

        let e = DiscoveryError::RemuxFailure {
            status: None,
            stderr: "killed".into(),
        };
        assert!(e.to_string().contains("exit status none"));
        assert_eq!(e.code(), "E_REMUX_FAILED");
    }
}
