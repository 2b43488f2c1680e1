//! Outcome aggregation: persist successful pages and build the report.
//!
//! The aggregator is the only consumer of the dispatcher's stream and runs
//! on the caller's task, so it needs no locking. Outcomes arrive in
//! completion order; the report lists pages in page order regardless.

use crate::config::NamingConvention;
use crate::error::PageError;
use crate::output::{FailedPage, PageOutcome, ProcessingReport, WrittenPage};
use crate::pipeline::discover::PageArtifact;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Collects [`PageOutcome`]s for one document.
#[derive(Debug)]
pub struct Aggregator {
    output_dir: PathBuf,
    document_id: String,
    extension: String,
    total: usize,
    processed: usize,
    failed: Vec<(u32, String, FailedPage)>,
    written: Vec<(u32, String, WrittenPage)>,
}

impl Aggregator {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        document_id: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            document_id: document_id.into(),
            extension: extension.into(),
            total: 0,
            processed: 0,
            failed: Vec::new(),
            written: Vec::new(),
        }
    }

    /// Where the text for `artifact` is written:
    /// `{output_dir}/{document_id}-page-{n}.{ext}`.
    pub fn output_path(&self, artifact: &PageArtifact) -> PathBuf {
        self.output_dir.join(NamingConvention::file_name(
            &self.document_id,
            &artifact.output_key(),
            &self.extension,
        ))
    }

    /// Record one outcome, writing its text when it succeeded.
    ///
    /// Returns the final verdict for the page: the written text length, or
    /// the error that ends up in the report. A successful transformation
    /// whose file cannot be written becomes [`PageError::OutputWrite`].
    pub async fn record(&mut self, outcome: PageOutcome) -> Result<usize, PageError> {
        self.total += 1;
        let artifact = outcome.artifact;
        let verdict = match outcome.result {
            Ok(text) => {
                let path = self.output_path(&artifact);
                match write_atomic(&path, &text).await {
                    Ok(()) => {
                        debug!("Page {}: wrote {}", artifact.page, path.display());
                        self.written.push((
                            artifact.page,
                            artifact.label.clone(),
                            WrittenPage {
                                page: artifact.page,
                                path,
                            },
                        ));
                        Ok(text.len())
                    }
                    Err(e) => Err(PageError::OutputWrite {
                        page: artifact.page,
                        path,
                        detail: e.to_string(),
                    }),
                }
            }
            Err(e) => Err(e),
        };

        match &verdict {
            Ok(_) => self.processed += 1,
            Err(e) => {
                warn!("{}", e);
                self.failed.push((
                    artifact.page,
                    artifact.label,
                    FailedPage {
                        page: artifact.page,
                        error: e.to_string(),
                    },
                ));
            }
        }
        verdict
    }

    /// Pages recorded so far.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Close the run and produce its report.
    pub fn finish(mut self) -> ProcessingReport {
        self.failed.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
        self.written.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

        ProcessingReport {
            success: self.total > 0 && self.failed.is_empty(),
            processed_pages: self.processed,
            total_pages: self.total,
            failed_pages: self.failed.into_iter().map(|(_, _, f)| f).collect(),
            error: None,
            written: self.written.into_iter().map(|(_, _, w)| w).collect(),
        }
    }
}

/// Write `text` to `path` via a sibling temp file, so a reader never sees a
/// half-written page. Existing files are replaced.
async fn write_atomic(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, text).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::discover::{ArtifactKind, UNPARSED_PAGE};
    use tempfile::TempDir;

    fn artifact(page: u32, label: &str) -> PageArtifact {
        PageArtifact {
            path: PathBuf::from(format!("in/doc-page-{label}.png")),
            page,
            label: label.to_string(),
            kind: ArtifactKind::Image,
        }
    }

    fn ok(page: u32, text: &str) -> PageOutcome {
        PageOutcome {
            artifact: artifact(page, &page.to_string()),
            result: Ok(text.to_string()),
            attempts: 1,
            duration_ms: 1,
        }
    }

    fn failed(page: u32) -> PageOutcome {
        PageOutcome {
            artifact: artifact(page, &page.to_string()),
            result: Err(PageError::EmptyResponse { page, attempts: 3 }),
            attempts: 3,
            duration_ms: 1,
        }
    }

    #[tokio::test]
    async fn writes_text_verbatim_under_canonical_name() {
        let tmp = TempDir::new().unwrap();
        let mut agg = Aggregator::new(tmp.path().join("out"), "doc", "txt");

        let text = "# Heading\n\n  indented line \n";
        assert_eq!(agg.record(ok(2, text)).await, Ok(text.len()));
        let report = agg.finish();

        let path = tmp.path().join("out").join("doc-page-2.txt");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
        assert_eq!(report.written, vec![WrittenPage { page: 2, path }]);
        assert!(!tmp.path().join("out").join("doc-page-2.txt.tmp").exists());
    }

    #[tokio::test]
    async fn report_orders_failures_by_page() {
        let tmp = TempDir::new().unwrap();
        let mut agg = Aggregator::new(tmp.path(), "doc", "txt");
        for outcome in [failed(5), ok(1, "a"), failed(2), ok(4, "b"), ok(3, "c")] {
            let _ = agg.record(outcome).await;
        }
        let report = agg.finish();

        assert!(!report.success);
        assert_eq!(report.total_pages, 5);
        assert_eq!(report.processed_pages, 3);
        let pages: Vec<u32> = report.failed_pages.iter().map(|f| f.page).collect();
        assert_eq!(pages, vec![2, 5]);
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn all_successful_is_success() {
        let tmp = TempDir::new().unwrap();
        let mut agg = Aggregator::new(tmp.path(), "doc", "md");
        agg.record(ok(1, "x")).await.unwrap();
        let report = agg.finish();
        assert!(report.success);
        assert!(tmp.path().join("doc-page-1.md").exists());
    }

    #[test]
    fn nothing_recorded_is_not_success() {
        let report = Aggregator::new("unused", "doc", "txt").finish();
        assert!(!report.success);
        assert_eq!(report.total_pages, 0);
    }

    #[tokio::test]
    async fn rerun_overwrites_previous_output() {
        let tmp = TempDir::new().unwrap();
        for text in ["first", "second"] {
            let mut agg = Aggregator::new(tmp.path(), "doc", "txt");
            agg.record(ok(1, text)).await.unwrap();
        }
        let content = std::fs::read_to_string(tmp.path().join("doc-page-1.txt")).unwrap();
        assert_eq!(content, "second");
    }

    #[tokio::test]
    async fn unwritable_output_becomes_page_failure() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("out");
        std::fs::write(&blocker, "a file where the directory should be").unwrap();

        let mut agg = Aggregator::new(&blocker, "doc", "txt");
        let verdict = agg.record(ok(1, "text")).await;
        assert!(matches!(verdict, Err(PageError::OutputWrite { page: 1, .. })));

        let report = agg.finish();
        assert_eq!(report.processed_pages, 0);
        assert_eq!(report.failed_pages.len(), 1);
    }

    #[tokio::test]
    async fn unparsed_pages_keep_distinct_outputs() {
        let tmp = TempDir::new().unwrap();
        let mut agg = Aggregator::new(tmp.path(), "doc", "txt");
        for label in ["cover", "appendix"] {
            let outcome = PageOutcome {
                artifact: artifact(UNPARSED_PAGE, label),
                result: Ok(label.to_string()),
                attempts: 1,
                duration_ms: 0,
            };
            agg.record(outcome).await.unwrap();
        }
        assert!(tmp.path().join("doc-page-cover.txt").exists());
        assert!(tmp.path().join("doc-page-appendix.txt").exists());
    }
}
