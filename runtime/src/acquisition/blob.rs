// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-page retrieval of `blob:` references.
//!
//! A blob URL only resolves inside the page that created it, so the bytes
//! are fetched by a script in that page, returned as a base64 data URL and
//! decoded here.

use crate::error::DiscoveryError;
use base64::Engine;
use std::path::Path;

/// Marker for the blob fetch script, so test renderers can answer it.
pub const BLOB_FETCH_MARKER: &str = "reelgrab:blob-fetch";

pub fn is_blob_url(url: &str) -> bool {
    url.starts_with("blob:")
}

/// Script that resolves to the blob's content as a data URL, or to
/// `"Error: ..."` when the fetch fails.
pub fn blob_fetch_script(blob_url: &str) -> String {
    let literal = serde_json::to_string(blob_url).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"/* {BLOB_FETCH_MARKER} */
(async (blobUrl) => {{
  try {{
    const response = await fetch(blobUrl);
    const blob = await response.blob();
    return await new Promise((resolve, reject) => {{
      const reader = new FileReader();
      reader.onloadend = () => resolve(reader.result);
      reader.onerror = () => reject(reader.error);
      reader.readAsDataURL(blob);
    }});
  }} catch (e) {{
    return 'Error: ' + e.message;
  }}
}})({literal})"#
    )
}

/// Decode the payload of a base64 data URL.
pub fn decode_data_url(blob_url: &str, data: &str) -> Result<Vec<u8>, DiscoveryError> {
    if let Some(message) = data.strip_prefix("Error:") {
        return Err(DiscoveryError::download(blob_url, format!("in-page fetch failed:{message}")));
    }
    if !data.starts_with("data:") {
        return Err(DiscoveryError::download(blob_url, "script did not return a data URL"));
    }
    let Some(start) = data.find("base64,") else {
        return Err(DiscoveryError::download(blob_url, "data URL is not base64 encoded"));
    };
    base64::engine::general_purpose::STANDARD
        .decode(data[start + "base64,".len()..].trim())
        .map_err(|e| DiscoveryError::download(blob_url, format!("invalid base64 payload: {e}")))
}

/// Decode `data` and write it to `dest`, returning the byte count.
pub async fn save_data_url(blob_url: &str, data: &str, dest: &Path) -> Result<u64, DiscoveryError> {
    let bytes = decode_data_url(blob_url, data)?;
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(dest, &bytes).await?;
    Ok(bytes.len() as u64)
}
