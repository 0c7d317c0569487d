// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Manifest materialization with an external `ffmpeg`.
//!
//! Streams are copied without re-encoding. The ADTS-to-ASC bitstream filter
//! fixes AAC audio for the MP4 container.

use crate::config::DiscoveryConfig;
use crate::discovery::types::{DiscoveredMedia, DiscoveryResult};
use crate::error::DiscoveryError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

const TOOL: &str = "ffmpeg";

/// Lines of tool stderr kept in a failure.
const STDERR_TAIL_LINES: usize = 20;

/// Platform-specific install guidance for the remuxer.
pub fn remediation(os: &str) -> &'static str {
    match os {
        "windows" => {
            "Download a release build from https://www.gyan.dev/ffmpeg/builds/, extract it \
             and add its bin folder to PATH (or run `winget install ffmpeg`)."
        }
        "macos" => "Install it with Homebrew: brew install ffmpeg",
        _ => {
            "Install it with your package manager: `sudo apt install ffmpeg` (Debian/Ubuntu), \
             `sudo dnf install ffmpeg` (Fedora) or `sudo pacman -S ffmpeg` (Arch)."
        }
    }
}

fn tool_missing() -> DiscoveryError {
    DiscoveryError::ToolMissing {
        tool: TOOL.to_string(),
        remediation: remediation(std::env::consts::OS).to_string(),
    }
}

/// Wraps the located `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct Remuxer {
    binary: PathBuf,
}

impl Remuxer {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Use `explicit` if given (a path or a name on `PATH`), else search
    /// `PATH` for `ffmpeg`.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, DiscoveryError> {
        let found = match explicit {
            Some(p) if p.is_file() => Some(p.to_path_buf()),
            Some(p) => which::which(p).ok(),
            None => which::which(TOOL).ok(),
        };
        match found {
            Some(binary) => {
                debug!("using {TOOL} at {}", binary.display());
                Ok(Self::new(binary))
            }
            None => Err(tool_missing()),
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        Self::locate(config.ffmpeg_path.as_deref())
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn args(manifest_url: &str, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-y",
            "-nostdin",
            "-i",
            manifest_url,
            "-c",
            "copy",
            "-bsf:a",
            "aac_adtstoasc",
            "-loglevel",
            "warning",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(output.as_os_str().to_os_string());
        args
    }

    /// Remux `manifest_url` into `output`, creating its directory.
    ///
    /// Success means exit status zero. Any other exit is a `RemuxFailure`
    /// carrying the tool's stderr, and any partial output is removed.
    pub async fn materialize(&self, manifest_url: &str, output: &Path) -> Result<(), DiscoveryError> {
        if !self.binary.is_file() {
            return Err(tool_missing());
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("remuxing {manifest_url} -> {}", output.display());
        let result = Command::new(&self.binary)
            .args(Self::args(manifest_url, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(tool_missing()),
            Err(e) => return Err(DiscoveryError::Io(e)),
        };

        if out.status.success() {
            let size = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
            info!(
                "saved {} ({:.2} MB)",
                output.display(),
                size as f64 / (1024.0 * 1024.0)
            );
            return Ok(());
        }

        let _ = tokio::fs::remove_file(output).await;
        let stderr = String::from_utf8_lossy(&out.stderr);
        let lines: Vec<&str> = stderr.trim().lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        Err(DiscoveryError::RemuxFailure {
            status: out.status.code(),
            stderr: tail,
        })
    }

    /// Materialize every manifest of `result` as `video_<index>_<n>.mp4`
    /// under `output_dir`.
    ///
    /// A failed remux is logged and skipped; only a vanished tool aborts.
    pub async fn materialize_all(&self, result: &DiscoveryResult, output_dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
        let mut produced = Vec::new();
        for item in &result.items {
            let manifests = item.media.iter().filter_map(|m| match m {
                DiscoveredMedia::Manifest { url } => Some(url.as_str()),
                DiscoveredMedia::File { .. } => None,
            });
            for (n, url) in manifests.enumerate() {
                let output = output_dir.join(format!("video_{}_{n}.mp4", item.index));
                match self.materialize(url, &output).await {
                    Ok(()) => produced.push(output),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!("skipping manifest {url}: {e}"),
                }
            }
        }
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remediation_per_platform() {
        assert!(remediation("macos").contains("brew install ffmpeg"));
        assert!(remediation("linux").contains("apt install ffmpeg"));
        assert!(remediation("windows").contains("PATH"));
    }

    #[test]
    fn test_args_copy_without_reencoding() {
        let args = Remuxer::args("https://stream.mux.com/a.m3u8", Path::new("/out/v.mp4"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let joined = args.join(" ");
        assert!(joined.contains("-i https://stream.mux.com/a.m3u8 -c copy -bsf:a aac_adtstoasc -loglevel warning"));
        assert_eq!(args.last().map(String::as_str), Some("/out/v.mp4"));
    }

    #[tokio::test]
    async fn test_missing_tool_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("never/created/video_0_0.mp4");

        let err = Remuxer::locate(Some(Path::new("/nonexistent/reelgrab/ffmpeg"))).unwrap_err();
        assert!(matches!(err, DiscoveryError::ToolMissing { .. }));
        assert_eq!(err.code(), "E_TOOL_MISSING");

        let remuxer = Remuxer::new(PathBuf::from("/nonexistent/reelgrab/ffmpeg"));
        let err = remuxer
            .materialize("https://stream.mux.com/a.m3u8", &output)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::ToolMissing { .. }));
        assert!(!output.exists());
        assert!(!dir.path().join("never").exists());
    }

    #[cfg(unix)]
    fn fake_tool(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "for last; do :; done\nprintf 'mp4data' > \"$last\"");
        let output = dir.path().join("videos/video_0_0.mp4");

        Remuxer::locate(Some(&tool))
            .unwrap()
            .materialize("https://stream.mux.com/a.m3u8", &output)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "mp4data");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_materialize_all_names_by_item_and_skips_failures() {
        use crate::discovery::types::{ItemOutcome, MediaKind, UrlKind};

        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            dir.path(),
            "for last; do :; done\ncase \"$4\" in *broken*) exit 1;; esac\nprintf 'mp4' > \"$last\"",
        );
        let mut result = DiscoveryResult::empty("https://feed.example/u", UrlKind::Profile);
        result.items = vec![
            ItemOutcome {
                index: 0,
                ordinal: 2,
                kind: MediaKind::Video,
                media: vec![
                    DiscoveredMedia::Manifest { url: "https://stream.mux.com/a.m3u8".into() },
                    DiscoveredMedia::Manifest { url: "https://other.example/broken.m3u8".into() },
                ],
                error: None,
            },
            ItemOutcome {
                index: 1,
                ordinal: 3,
                kind: MediaKind::Video,
                media: vec![DiscoveredMedia::Manifest { url: "https://stream.mux.com/b.m3u8".into() }],
                error: None,
            },
        ];

        let out_dir = dir.path().join("out");
        let produced = Remuxer::new(tool).materialize_all(&result, &out_dir).await.unwrap();
        assert_eq!(
            produced,
            vec![out_dir.join("video_0_0.mp4"), out_dir.join("video_1_0.mp4")]
        );
        assert!(!out_dir.join("video_0_1.mp4").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_remux_failure_without_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            dir.path(),
            "for last; do :; done\nprintf 'partial' > \"$last\"\necho 'Invalid data found when processing input' >&2\nexit 1",
        );
        let output = dir.path().join("video_1_0.mp4");

        let err = Remuxer::new(tool)
            .materialize("https://other.example/broken.m3u8", &output)
            .await
            .unwrap_err();
        match err {
            DiscoveryError::RemuxFailure { status, stderr } => {
                assert_eq!(status, Some(1));
                assert!(stderr.contains("Invalid data found"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!output.exists());
    }
}
