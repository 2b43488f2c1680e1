//! Error types for the edgequake-page2text library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`]: **fatal**, the run cannot proceed at all (no
//!   artifacts discovered, no backend configured, unreadable PDF). Returned
//!   as `Err(PipelineError)` from the top-level `process_*` functions.
//!
//! * [`PageError`]: **non-fatal**, a single page failed (bad image, service
//!   kept failing, empty reply) but every other page is unaffected. Stored
//!   inside [`crate::output::PageOutcome`] and surfaced in the
//!   [`crate::output::ProcessingReport`] failure list.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-page2text library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Discovery ─────────────────────────────────────────────────────────
    /// No artifact in the directory matched the document identifier.
    #[error("No page artifacts found for '{identifier}' in '{dir}'")]
    DiscoveryEmpty { dir: PathBuf, identifier: String },

    /// The artifact directory exists but could not be listed.
    #[error("Failed to list '{dir}': {source}")]
    DiscoveryFailed {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Backend ───────────────────────────────────────────────────────────
    /// None of the configured backends has a usable credential.
    #[error("No transform backend is configured (tried: {tried}).\n{hint}")]
    AuthenticationMissing { tried: String, hint: String },

    // ── Renderer ──────────────────────────────────────────────────────────
    /// Input PDF was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rendering failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy."
    )]
    PdfiumBindingFailed(String),

    /// Could not create or write a rendered artifact.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config ────────────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The `Display` text is what ends up in the report's `failed_pages[].error`,
/// so every variant names its page.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PageError {
    /// The artifact could not be prepared for transmission.
    #[error("Page {page}: could not prepare artifact: {detail}")]
    Encoding { page: u32, detail: String },

    /// The external service kept failing until the attempt budget ran out.
    #[error("Page {page}: service call failed after {attempts} attempt(s): {detail}")]
    Service {
        page: u32,
        attempts: u32,
        status: Option<u16>,
        detail: String,
    },

    /// The service answered but returned no usable text.
    #[error("Page {page}: service returned an empty response after {attempts} attempt(s)")]
    EmptyResponse { page: u32, attempts: u32 },

    /// The worker processing the page faulted instead of returning an outcome.
    #[error("Page {page}: worker fault: {detail}")]
    WorkerFault { page: u32, detail: String },

    /// The transformed text could not be persisted.
    #[error("Page {page}: failed to write '{path}': {detail}")]
    OutputWrite {
        page: u32,
        path: PathBuf,
        detail: String,
    },
}

impl PageError {
    /// Page number the error belongs to.
    pub fn page(&self) -> u32 {
        match self {
            PageError::Encoding { page, .. }
            | PageError::Service { page, .. }
            | PageError::EmptyResponse { page, .. }
            | PageError::WorkerFault { page, .. }
            | PageError::OutputWrite { page, .. } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_empty_display() {
        let e = PipelineError::DiscoveryEmpty {
            dir: PathBuf::from("storage/images"),
            identifier: "doc".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("No page artifacts"), "got: {msg}");
        assert!(msg.contains("'doc'"), "got: {msg}");
    }

    #[test]
    fn authentication_missing_lists_backends() {
        let e = PipelineError::AuthenticationMissing {
            tried: "openai, anthropic".into(),
            hint: "Set OPENAI_API_KEY".into(),
        };
        assert!(e.to_string().contains("openai, anthropic"));
    }

    #[test]
    fn service_error_names_page_and_attempts() {
        let e = PageError::Service {
            page: 7,
            attempts: 3,
            status: Some(503),
            detail: "HTTP 503: overloaded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 7"), "got: {msg}");
        assert!(msg.contains("3 attempt"), "got: {msg}");
        assert!(msg.contains("overloaded"), "got: {msg}");
    }

    #[test]
    fn page_accessor_covers_every_variant() {
        let errors = [
            PageError::Encoding { page: 1, detail: String::new() },
            PageError::EmptyResponse { page: 2, attempts: 3 },
            PageError::WorkerFault { page: 3, detail: String::new() },
            PageError::OutputWrite {
                page: 4,
                path: PathBuf::from("x"),
                detail: String::new(),
            },
        ];
        let pages: Vec<u32> = errors.iter().map(PageError::page).collect();
        assert_eq!(pages, vec![1, 2, 3, 4]);
    }
}
