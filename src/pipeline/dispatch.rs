//! Bounded-concurrency dispatch of page transformations.
//!
//! Every artifact becomes one spawned task; `buffer_unordered(n)` keeps at
//! most `n` of them in flight and yields outcomes in completion order. A
//! task that panics is caught at its join handle and reported as
//! [`PageError::WorkerFault`] for that page, so the stream always yields
//! exactly one outcome per artifact.

use crate::error::PageError;
use crate::output::PageOutcome;
use crate::pipeline::discover::PageArtifact;
use crate::pipeline::transform::PageTransformer;
use crate::progress::ProgressCallback;
use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tracing::error;

/// Outcomes in completion order.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = PageOutcome> + Send>>;

/// Start transforming `artifacts` with at most `concurrency` pages in flight.
///
/// Nothing is polled until the returned stream is; dropping the stream
/// stops scheduling new pages.
pub fn dispatch_stream(
    transformer: Arc<PageTransformer>,
    artifacts: Vec<PageArtifact>,
    concurrency: usize,
    progress: Option<ProgressCallback>,
) -> OutcomeStream {
    let total = artifacts.len();
    let concurrency = concurrency.max(1);

    let outcomes = stream::iter(artifacts.into_iter().map(move |artifact| {
        let transformer = Arc::clone(&transformer);
        let progress = progress.clone();
        async move {
            if let Some(ref cb) = progress {
                cb.on_page_start(artifact.page, total);
            }
            let job_artifact = artifact.clone();
            let handle =
                tokio::spawn(async move { transformer.transform(&job_artifact).await });
            match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    let detail = if join_err.is_panic() {
                        panic_message(join_err.into_panic())
                    } else {
                        "task cancelled".to_string()
                    };
                    error!("Page {}: worker fault: {}", artifact.page, detail);
                    PageOutcome {
                        result: Err(PageError::WorkerFault {
                            page: artifact.page,
                            detail,
                        }),
                        artifact,
                        attempts: 0,
                        duration_ms: 0,
                    }
                }
            }
        }
    }))
    .buffer_unordered(concurrency);

    Box::pin(outcomes)
}

/// Run every page to completion and collect the outcomes (completion order).
pub async fn dispatch(
    transformer: Arc<PageTransformer>,
    artifacts: Vec<PageArtifact>,
    concurrency: usize,
    progress: Option<ProgressCallback>,
) -> Vec<PageOutcome> {
    dispatch_stream(transformer, artifacts, concurrency, progress)
        .collect()
        .await
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
