//! Renderer adapter: PDF → page artifacts on disk, via pdfium.
//!
//! This is the producer side of the pipeline. It writes one file per page
//! under the canonical naming convention, either a raster image
//! ([`render_pages`]) or the page's embedded text ([`extract_text`]), and
//! returns the artifacts it wrote.
//!
//! pdfium is a C++ library with thread-local state, so every call runs
//! inside `spawn_blocking` and binds its own library handle.

use crate::config::NamingConvention;
use crate::error::PipelineError;
use crate::pipeline::discover::{ArtifactKind, PageArtifact};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Raster format for rendered pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RasterFormat {
    #[default]
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpg",
        }
    }

    /// Parse a user-supplied format name (`png`, `jpg`, `jpeg`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Some(RasterFormat::Png),
            "jpg" | "jpeg" => Some(RasterFormat::Jpeg),
            _ => None,
        }
    }
}

/// How pages are rasterised.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Resolution. Default: 200.
    pub dpi: u32,
    pub format: RasterFormat,
    /// Password for encrypted PDFs.
    pub password: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            dpi: 200,
            format: RasterFormat::Png,
            password: None,
        }
    }
}

/// Render every page of `pdf` to `{out_dir}/{document_id}-page-{n}.{ext}`.
pub async fn render_pages(
    pdf: &Path,
    out_dir: &Path,
    document_id: &str,
    options: &RenderOptions,
) -> Result<Vec<PageArtifact>, PipelineError> {
    check_pdf(pdf)?;
    let pdf = pdf.to_path_buf();
    let out_dir = out_dir.to_path_buf();
    let document_id = document_id.to_string();
    let options = options.clone();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&pdf, &out_dir, &document_id, &options)
    })
    .await
    .map_err(|e| PipelineError::Internal(format!("Render task panicked: {e}")))?
}

/// Write each page's embedded text to `{out_dir}/{document_id}-page-{n}.txt`.
///
/// Pages without a text layer produce empty files; the transformer then
/// reports them as empty responses rather than silently skipping them.
pub async fn extract_text(
    pdf: &Path,
    out_dir: &Path,
    document_id: &str,
    password: Option<&str>,
) -> Result<Vec<PageArtifact>, PipelineError> {
    check_pdf(pdf)?;
    let pdf = pdf.to_path_buf();
    let out_dir = out_dir.to_path_buf();
    let document_id = document_id.to_string();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        extract_text_blocking(&pdf, &out_dir, &document_id, password.as_deref())
    })
    .await
    .map_err(|e| PipelineError::Internal(format!("Text extraction task panicked: {e}")))?
}

// ── Blocking implementations ─────────────────────────────────────────────

fn render_pages_blocking(
    pdf: &Path,
    out_dir: &Path,
    document_id: &str,
    options: &RenderOptions,
) -> Result<Vec<PageArtifact>, PipelineError> {
    let pdfium = bind()?;
    let document = open(&pdfium, pdf, options.password.as_deref())?;
    let pages = document.pages();
    let total = pages.len();
    info!("Rendering {} pages of '{}' at {} dpi", total, pdf.display(), options.dpi);

    create_dir(out_dir)?;
    let render_config =
        PdfRenderConfig::new().scale_page_by_factor(options.dpi.max(1) as f32 / 72.0);

    let mut artifacts = Vec::with_capacity(total as usize);
    for idx in 0..total {
        let page_num = idx as u32 + 1;
        let rasterisation_failed = |e: PdfiumError| PipelineError::RasterisationFailed {
            page: page_num as usize,
            detail: format!("{e:?}"),
        };

        let page = pages.get(idx).map_err(rasterisation_failed)?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(rasterisation_failed)?;
        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", page_num, image.width(), image.height());

        let path = page_path(out_dir, document_id, page_num, options.format.extension());
        save_image(&image, &path, options.format)?;
        artifacts.push(PageArtifact {
            path,
            page: page_num,
            label: page_num.to_string(),
            kind: ArtifactKind::Image,
        });
    }

    Ok(artifacts)
}

fn extract_text_blocking(
    pdf: &Path,
    out_dir: &Path,
    document_id: &str,
    password: Option<&str>,
) -> Result<Vec<PageArtifact>, PipelineError> {
    let pdfium = bind()?;
    let document = open(&pdfium, pdf, password)?;
    let pages = document.pages();
    info!("Extracting text from {} pages of '{}'", pages.len(), pdf.display());

    create_dir(out_dir)?;
    let mut artifacts = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx as u32 + 1;
        let text = page
            .text()
            .map_err(|e| PipelineError::RasterisationFailed {
                page: page_num as usize,
                detail: format!("text layer: {e:?}"),
            })?
            .all();

        let path = page_path(out_dir, document_id, page_num, "txt");
        std::fs::write(&path, &text).map_err(|source| PipelineError::OutputWriteFailed {
            path: path.clone(),
            source,
        })?;
        debug!("Page {}: {} chars of text", page_num, text.len());
        artifacts.push(PageArtifact {
            path,
            page: page_num,
            label: page_num.to_string(),
            kind: ArtifactKind::Text,
        });
    }

    Ok(artifacts)
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Verify `path` exists and starts with the `%PDF` magic bytes.
pub fn check_pdf(path: &Path) -> Result<(), PipelineError> {
    let mut file = std::fs::File::open(path).map_err(|_| PipelineError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let mut magic = [0u8; 4];
    let read = file.read(&mut magic).map_err(|e| PipelineError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    if read < 4 || &magic != b"%PDF" {
        return Err(PipelineError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

fn bind() -> Result<Pdfium, PipelineError> {
    pdfium_auto::bind_pdfium_silent().map_err(|e| PipelineError::PdfiumBindingFailed(e.to_string()))
}

fn open<'a>(
    pdfium: &'a Pdfium,
    pdf: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, PipelineError> {
    pdfium.load_pdf_from_file(pdf, password).map_err(|e| {
        let detail = format!("{e:?}");
        if detail.to_ascii_lowercase().contains("password") {
            if password.is_some() {
                PipelineError::WrongPassword {
                    path: pdf.to_path_buf(),
                }
            } else {
                PipelineError::PasswordRequired {
                    path: pdf.to_path_buf(),
                }
            }
        } else {
            PipelineError::CorruptPdf {
                path: pdf.to_path_buf(),
                detail,
            }
        }
    })
}

fn create_dir(dir: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(dir).map_err(|source| PipelineError::OutputWriteFailed {
        path: dir.to_path_buf(),
        source,
    })
}

fn page_path(out_dir: &Path, document_id: &str, page: u32, ext: &str) -> PathBuf {
    out_dir.join(NamingConvention::file_name(document_id, &page.to_string(), ext))
}

fn save_image(
    image: &DynamicImage,
    path: &Path,
    format: RasterFormat,
) -> Result<(), PipelineError> {
    let result = match format {
        RasterFormat::Png => image.save_with_format(path, image::ImageFormat::Png),
        // JPEG has no alpha channel.
        RasterFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
            .save_with_format(path, image::ImageFormat::Jpeg),
    };
    result.map_err(|e| PipelineError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: std::io::Error::other(e.to_string()),
    })
}
