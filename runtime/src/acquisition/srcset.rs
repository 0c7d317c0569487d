// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Responsive-image candidate selection.

use crate::discovery::types::ImageCandidate;

/// One `srcset` entry with a pixel-density descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct SrcsetEntry {
    pub url: String,
    pub density: f64,
}

/// Parse the density entries of a `srcset` attribute.
///
/// Entries are separated by commas. The URL is the first token and the
/// descriptor the last. Only `Nx` descriptors are understood; width
/// descriptors and malformed entries are skipped.
pub fn parse_srcset(srcset: &str) -> Vec<SrcsetEntry> {
    srcset
        .split(',')
        .filter_map(|part| {
            let tokens: Vec<&str> = part.split_whitespace().collect();
            if tokens.len() < 2 {
                return None;
            }
            let density = tokens[tokens.len() - 1]
                .strip_suffix('x')?
                .parse::<f64>()
                .ok()?;
            (density.is_finite() && density > 0.0).then(|| SrcsetEntry {
                url: tokens[0].to_string(),
                density,
            })
        })
        .collect()
}

/// URL of the highest-density entry; the first one wins ties.
pub fn highest_density(srcset: &str) -> Option<String> {
    parse_srcset(srcset)
        .into_iter()
        .fold(None::<SrcsetEntry>, |best, entry| match best {
            Some(b) if b.density >= entry.density => Some(b),
            _ => Some(entry),
        })
        .map(|e| e.url)
}

/// Best download URL for an image: the densest `srcset` entry, else `src`.
pub fn best_image_url(image: &ImageCandidate) -> Option<String> {
    image
        .srcset
        .as_deref()
        .and_then(highest_density)
        .or_else(|| image.src.clone().filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picks_highest_density() {
        let srcset = "https://img.example/a_1x.jpg 1x, https://img.example/a_3x.jpg 3x, https://img.example/a_2x.jpg 2x";
        assert_eq!(
            highest_density(srcset).as_deref(),
            Some("https://img.example/a_3x.jpg")
        );
    }

    #[test]
    fn test_skips_width_and_malformed_entries() {
        let entries = parse_srcset("a.jpg 640w, b.jpg, c.jpg 1.5x, d.jpg abcx, , e.jpg 0x");
        assert_eq!(
            entries,
            vec![SrcsetEntry {
                url: "c.jpg".into(),
                density: 1.5
            }]
        );
        assert_eq!(highest_density("a.jpg 640w, b.jpg 1280w"), None);
    }

    #[test]
    fn test_best_image_url_falls_back_to_src() {
        let only_widths = ImageCandidate {
            src: Some("https://img.example/plain.jpg".into()),
            srcset: Some("https://img.example/w.jpg 640w".into()),
        };
        assert_eq!(
            best_image_url(&only_widths).as_deref(),
            Some("https://img.example/plain.jpg")
        );

        let dense = ImageCandidate {
            src: Some("https://img.example/plain.jpg".into()),
            srcset: Some("https://img.example/x2.jpg 2x".into()),
        };
        assert_eq!(best_image_url(&dense).as_deref(), Some("https://img.example/x2.jpg"));

        let empty = ImageCandidate {
            src: Some("  ".into()),
            srcset: None,
        };
        assert_eq!(best_image_url(&empty), None);
    }
}
