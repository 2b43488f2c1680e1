//! Artifact encoding: page file → payload ready for the transform service.
//!
//! Image artifacts are decoded, scaled down when either edge exceeds the
//! configured limit, re-encoded as PNG and base64-wrapped. PNG is lossless,
//! which keeps small print legible for the vision model regardless of the
//! format the renderer wrote. Text artifacts are passed through as-is.

use crate::pipeline::discover::{ArtifactKind, PageArtifact};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// What the transform service receives for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagePayload {
    /// Base64 image data plus its MIME type.
    Image { data: String, mime_type: &'static str },
    /// Raw page text.
    Text(String),
}

/// Encoding failures; surfaced as [`crate::error::PageError::Encoding`].
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("could not read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not decode image '{path}': {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("could not encode PNG: {0}")]
    Encode(#[from] image::ImageError),
}

/// Target size for an image so its longer edge is at most `max_edge`.
///
/// Returns `None` when the image already fits. Both dimensions are scaled by
/// the same factor; the shorter edge is truncated, never below 1.
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> Option<(u32, u32)> {
    if width <= max_edge && height <= max_edge {
        return None;
    }
    let scale = |short: u32, long: u32| -> u32 {
        ((short as u64 * max_edge as u64) / long as u64).max(1) as u32
    };
    if width > height {
        Some((max_edge, scale(height, width)))
    } else {
        Some((scale(width, height), max_edge))
    }
}

/// Scale `img` down so neither edge exceeds `max_edge`.
pub fn downscale(img: DynamicImage, max_edge: u32) -> DynamicImage {
    match fit_within(img.width(), img.height(), max_edge) {
        Some((w, h)) => {
            debug!(
                "Downscaling {}x{} → {}x{} (max edge {})",
                img.width(),
                img.height(),
                w,
                h,
                max_edge
            );
            img.resize_exact(w, h, FilterType::Triangle)
        }
        None => img,
    }
}

/// PNG-encode and base64-wrap an image.
pub fn encode_png_base64(img: &DynamicImage) -> Result<String, EncodeError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(b64)
}

/// Load an image artifact and turn it into a payload. Blocking.
pub fn encode_image_file(path: &Path, max_edge: u32) -> Result<PagePayload, EncodeError> {
    let img = image::open(path).map_err(|source| match source {
        image::ImageError::IoError(io) => EncodeError::Read {
            path: path.display().to_string(),
            source: io,
        },
        other => EncodeError::Decode {
            path: path.display().to_string(),
            source: other,
        },
    })?;
    let img = downscale(img, max_edge);
    Ok(PagePayload::Image {
        data: encode_png_base64(&img)?,
        mime_type: "image/png",
    })
}

/// Prepare any artifact for transmission.
///
/// Image decoding is CPU-bound, so it runs on the blocking pool.
pub async fn prepare(artifact: &PageArtifact, max_edge: u32) -> Result<PagePayload, String> {
    match artifact.kind {
        ArtifactKind::Text => tokio::fs::read_to_string(&artifact.path)
            .await
            .map(PagePayload::Text)
            .map_err(|e| format!("could not read '{}': {}", artifact.path.display(), e)),
        ArtifactKind::Image => {
            let path = artifact.path.clone();
            tokio::task::spawn_blocking(move || encode_image_file(&path, max_edge))
                .await
                .map_err(|e| format!("encoding task failed: {e}"))?
                .map_err(|e| e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn oversized_landscape_is_scaled_to_limit() {
        assert_eq!(fit_within(6000, 3000, 4000), Some((4000, 2000)));
    }

    #[test]
    fn oversized_portrait_is_scaled_to_limit() {
        assert_eq!(fit_within(3000, 6000, 4000), Some((2000, 4000)));
        assert_eq!(fit_within(4500, 4500, 4000), Some((4000, 4000)));
    }

    #[test]
    fn image_within_limit_is_untouched() {
        assert_eq!(fit_within(3000, 2000, 4000), None);
        assert_eq!(fit_within(4000, 4000, 4000), None);
    }

    #[test]
    fn downscale_resizes_real_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(60, 30, Rgb([0, 0, 0])));
        let out = downscale(img, 40);
        assert_eq!((out.width(), out.height()), (40, 20));

        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 20, Rgb([0, 0, 0])));
        let out = downscale(img, 40);
        assert_eq!((out.width(), out.height()), (30, 20));
    }

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 0, 0])));
        let b64 = encode_png_base64(&img).expect("encode should succeed");
        let decoded = STANDARD.decode(&b64).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn encode_file_downscales_before_encoding() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("doc-page-1.png");
        RgbImage::from_pixel(80, 20, Rgb([10, 20, 30])).save(&path).unwrap();

        let PagePayload::Image { data, mime_type } = encode_image_file(&path, 40).unwrap() else {
            panic!("expected an image payload");
        };
        assert_eq!(mime_type, "image/png");
        let png = image::load_from_memory(&STANDARD.decode(data).unwrap()).unwrap();
        assert_eq!((png.width(), png.height()), (40, 10));
    }

    #[test]
    fn garbage_file_is_a_decode_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("doc-page-1.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let err = encode_image_file(&path, 4000).unwrap_err();
        assert!(matches!(err, EncodeError::Decode { .. }), "got {err:?}");
    }
}
