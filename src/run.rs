//! Run-level entry points: one document through the whole pipeline.
//!
//! [`process_pages`] is the core: discover → dispatch → aggregate, returning
//! `Err` only for run-level failures. [`run_to_report`] and
//! [`process_document`] fold those failures into a failed
//! [`ProcessingReport`] so a caller always has a report to print.
//! [`convert_document`] renders a PDF first and then processes the pages it
//! wrote.

use crate::backend::{resolve_backend, BackendOptions, BackendSpec, TransformService};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::ProcessingReport;
use crate::pipeline::aggregate::Aggregator;
use crate::pipeline::discover::discover;
use crate::pipeline::dispatch::dispatch_stream;
use crate::pipeline::render::{render_pages, RenderOptions};
use crate::pipeline::transform::PageTransformer;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Where one document's artifacts live and where its text goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentJob {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Prefix shared by every artifact of the document.
    pub document_id: String,
    /// Second identifier whose artifacts belong to the same document
    /// (e.g. the original file name the renderer used).
    pub alias: Option<String>,
}

impl DocumentJob {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        document_id: impl Into<String>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            document_id: document_id.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into()).filter(|a: &String| !a.is_empty());
        self
    }
}

/// Transform every page artifact of `job` and write the results.
///
/// # Errors
/// - [`PipelineError::DiscoveryEmpty`] when no artifact matches
/// - [`PipelineError::DiscoveryFailed`] when the input directory cannot be
///   listed
///
/// Individual page failures never surface here; they are in the report.
pub async fn process_pages(
    service: Arc<dyn TransformService>,
    job: &DocumentJob,
    config: &PipelineConfig,
) -> Result<ProcessingReport, PipelineError> {
    let start = Instant::now();
    info!(
        "Processing '{}' from '{}' with {}",
        job.document_id,
        job.input_dir.display(),
        service.name()
    );

    // ── Discover ─────────────────────────────────────────────────────────
    let artifacts = discover(
        &job.input_dir,
        &job.document_id,
        job.alias.as_deref(),
        &config.naming,
    )?;
    if artifacts.is_empty() {
        return Err(PipelineError::DiscoveryEmpty {
            dir: job.input_dir.clone(),
            identifier: job.document_id.clone(),
        });
    }
    let total = artifacts.len();
    info!("Found {} page artifacts", total);

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total);
    }

    // ── Dispatch + aggregate ─────────────────────────────────────────────
    let transformer = Arc::new(PageTransformer::new(service, config));
    let mut outcomes = dispatch_stream(
        transformer,
        artifacts,
        config.concurrency,
        config.progress_callback.clone(),
    );
    let mut aggregator = Aggregator::new(
        &job.output_dir,
        job.document_id.as_str(),
        config.output_extension.as_str(),
    );

    while let Some(outcome) = outcomes.next().await {
        let page = outcome.page();
        debug!(
            "Page {}: {} attempt(s), {}ms",
            page, outcome.attempts, outcome.duration_ms
        );
        let verdict = aggregator.record(outcome).await;
        if let Some(ref cb) = config.progress_callback {
            match verdict {
                Ok(text_len) => cb.on_page_complete(page, total, text_len),
                Err(e) => cb.on_page_error(page, total, &e.to_string()),
            }
        }
    }

    let report = aggregator.finish();
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(report.total_pages, report.processed_pages);
    }

    info!(
        "Done: {}/{} pages written to '{}' in {}ms",
        report.processed_pages,
        report.total_pages,
        job.output_dir.display(),
        start.elapsed().as_millis()
    );
    Ok(report)
}

/// [`process_pages`], with run-level failures folded into the report.
pub async fn run_to_report(
    service: Arc<dyn TransformService>,
    job: &DocumentJob,
    config: &PipelineConfig,
) -> ProcessingReport {
    process_pages(service, job, config)
        .await
        .unwrap_or_else(|e| ProcessingReport::from_fatal(&e))
}

/// Resolve a backend from `specs`, then [`run_to_report`].
///
/// A missing backend is reported like any other run-level failure.
pub async fn process_document(
    specs: &[BackendSpec],
    options: &BackendOptions,
    job: &DocumentJob,
    config: &PipelineConfig,
) -> ProcessingReport {
    match resolve_backend(specs, options) {
        Ok(service) => run_to_report(service, job, config).await,
        Err(e) => ProcessingReport::from_fatal(&e),
    }
}

/// Render `pdf` into `job.input_dir`, then process the rendered pages.
pub async fn convert_document(
    pdf: &Path,
    job: &DocumentJob,
    service: Arc<dyn TransformService>,
    config: &PipelineConfig,
    render_options: &RenderOptions,
) -> Result<ProcessingReport, PipelineError> {
    let rendered = render_pages(pdf, &job.input_dir, &job.document_id, render_options).await?;
    info!("Rendered {} pages from '{}'", rendered.len(), pdf.display());
    process_pages(service, job, config).await
}

/// Synchronous wrapper around [`process_pages`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_pages_sync(
    service: Arc<dyn TransformService>,
    job: &DocumentJob,
    config: &PipelineConfig,
) -> Result<ProcessingReport, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(process_pages(service, job, config))
}
