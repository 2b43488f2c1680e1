//! Output types: per-page outcomes and the aggregated run report.

use crate::error::{PageError, PipelineError};
use crate::pipeline::discover::PageArtifact;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The result of transforming one [`PageArtifact`].
///
/// Produced once by the transformer (or by the dispatcher when the worker
/// faulted) and never modified afterwards.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    /// The artifact this outcome belongs to.
    pub artifact: PageArtifact,
    /// Extracted text, or why the page failed.
    pub result: Result<String, PageError>,
    /// Service calls issued for this page (0 when preparation failed).
    pub attempts: u32,
    /// Wall-clock time spent on the page.
    pub duration_ms: u64,
}

impl PageOutcome {
    /// 1-based page number (or the unparsed sentinel).
    pub fn page(&self) -> u32 {
        self.artifact.page
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// One entry of [`ProcessingReport::failed_pages`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPage {
    pub page: u32,
    pub error: String,
}

/// A successfully persisted page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPage {
    pub page: u32,
    pub path: PathBuf,
}

/// Aggregate over every [`PageOutcome`] of one document.
///
/// Serialises to the JSON object downstream callers consume:
///
/// ```json
/// {
///   "success": false,
///   "processed_pages": 4,
///   "total_pages": 5,
///   "failed_pages": [{ "page": 3, "error": "Page 3: ..." }]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingReport {
    /// `true` iff at least one page was attempted and none failed.
    pub success: bool,
    /// Pages whose text was written.
    pub processed_pages: usize,
    /// Pages attempted.
    pub total_pages: usize,
    /// Failures, ascending by page number.
    pub failed_pages: Vec<FailedPage>,
    /// Run-level failure (no pages found, no backend). Absent on normal runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Output files written, ascending by page number.
    #[serde(skip)]
    pub written: Vec<WrittenPage>,
}

impl ProcessingReport {
    /// Report for a run that failed before any page was dispatched.
    pub fn from_fatal(err: &PipelineError) -> Self {
        Self {
            success: false,
            processed_pages: 0,
            total_pages: 0,
            failed_pages: Vec::new(),
            error: Some(err.to_string()),
            written: Vec::new(),
        }
    }

    /// Process exit status for this report: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_report_shape() {
        let err = PipelineError::DiscoveryEmpty {
            dir: PathBuf::from("imgs"),
            identifier: "doc".into(),
        };
        let report = ProcessingReport::from_fatal(&err);
        assert!(!report.success);
        assert_eq!(report.total_pages, 0);
        assert_eq!(report.exit_code(), 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_pages"], 0);
        assert!(json["error"].as_str().unwrap().contains("No page artifacts"));
    }

    #[test]
    fn normal_report_omits_error_and_written() {
        let report = ProcessingReport {
            success: true,
            processed_pages: 2,
            total_pages: 2,
            written: vec![WrittenPage {
                page: 1,
                path: PathBuf::from("out/doc-page-1.txt"),
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys.len(),
            4,
            "only the four boundary fields are serialised, got {keys:?}"
        );
        assert_eq!(json["failed_pages"], serde_json::json!([]));
        assert_eq!(report.exit_code(), 0);
    }
}
