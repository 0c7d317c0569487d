// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Zip packaging of a finished task's output directory.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Pack the regular files directly under `dir` into `zip_path`.
///
/// Entries are named by file name and written in name order. Returns the
/// number of entries.
pub async fn zip_directory(dir: &Path, zip_path: &Path) -> Result<usize> {
    let dir = dir.to_path_buf();
    let zip_path = zip_path.to_path_buf();
    tokio::task::spawn_blocking(move || write_zip(&dir, &zip_path))
        .await
        .context("zip task panicked")?
}

fn write_zip(dir: &Path, zip_path: &Path) -> Result<usize> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("cannot read {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    let file = File::create(zip_path)
        .with_context(|| format!("cannot create {}", zip_path.display()))?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for path in &entries {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        zip.start_file(name, options)?;
        let mut reader = BufReader::new(File::open(path)?);
        std::io::copy(&mut reader, &mut zip)?;
    }

    zip.finish()?;
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[tokio::test]
    async fn test_zip_contains_sorted_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("task");
        std::fs::create_dir_all(media.join("nested")).unwrap();
        std::fs::write(media.join("video_0_0.mp4"), b"video").unwrap();
        std::fs::write(media.join("image_1_0.jpg"), b"image").unwrap();
        std::fs::write(media.join("nested/skip.txt"), b"skip").unwrap();

        let zip_path = dir.path().join("task.zip");
        let count = zip_directory(&media, &zip_path).await.unwrap();
        assert_eq!(count, 2);

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["image_1_0.jpg", "video_0_0.mp4"]);

        let mut body = String::new();
        archive
            .by_name("video_0_0.mp4")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "video");
    }

    #[tokio::test]
    async fn test_missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = zip_directory(&dir.path().join("absent"), &dir.path().join("a.zip")).await;
        assert!(result.is_err());
    }
}
