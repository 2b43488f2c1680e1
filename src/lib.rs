//! # edgequake-page2text
//!
//! Turn the pages of a PDF into per-page text files with a Vision Language
//! Model, a bounded number of pages at a time.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 0. Render     (optional) page images or native text via pdfium
//!  ├─ 1. Discover   {id}-page-{n}.{png|jpg|txt} in a directory, page order
//!  ├─ 2. Dispatch   one task per page, at most N in flight
//!  ├─ 3. Transform  downscale + base64, call the model, fixed-delay retries
//!  └─ 4. Aggregate  {id}-page-{n}.txt per page + JSON processing report
//! ```
//!
//! A page that fails never stops the others: its error lands in the
//! report's `failed_pages` and the run keeps draining.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_page2text::{
//!     process_document, BackendOptions, BackendSpec, DocumentJob, PipelineConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let specs = vec![BackendSpec::openai(std::env::var("OPENAI_API_KEY").unwrap_or_default())];
//!     let job = DocumentJob::new("storage/images", "storage/tmp", "invoice-42");
//!     let config = PipelineConfig::default();
//!
//!     let report = process_document(&specs, &BackendOptions::default(), &job, &config).await;
//!     println!("{}", serde_json::to_string_pretty(&report).unwrap());
//!     std::process::exit(report.exit_code());
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `page2text` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-page2text = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{
    resolve_backend, BackendOptions, BackendSpec, LlmProviderService, ServiceError,
    TransformRequest, TransformService,
};
pub use config::{NamingConvention, PipelineConfig, PipelineConfigBuilder};
pub use error::{PageError, PipelineError};
pub use output::{FailedPage, PageOutcome, ProcessingReport, WrittenPage};
pub use pipeline::discover::{
    discover, ArtifactKind, PageArtifact, EMPTY_LABEL_KEY, UNPARSED_PAGE,
};
pub use pipeline::render::{extract_text, render_pages, RasterFormat, RenderOptions};
pub use progress::{NoopProgressCallback, PageProgressCallback, ProgressCallback};
pub use run::{
    convert_document, process_document, process_pages, process_pages_sync, run_to_report,
    DocumentJob,
};
