//! Configuration types for the page-transformation pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The config is constructed once at process
//! start and passed by reference into every stage; no stage reads the
//! process environment on its own.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::time::Duration;

/// Configuration for one pipeline run.
///
/// # Example
/// ```rust
/// use edgequake_page2text::PipelineConfig;
/// use std::time::Duration;
///
/// let config = PipelineConfig::builder()
///     .concurrency(5)
///     .max_attempts(4)
///     .retry_delay(Duration::from_secs(2))
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 5);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Pages transformed at the same time. Default: 3.
    ///
    /// Work is dominated by network round-trips to the model, so this is the
    /// main throughput knob. Lower it if the provider starts returning 429s.
    pub concurrency: usize,

    /// Service calls per page, including the first one. Default: 3.
    pub max_attempts: u32,

    /// Fixed pause between two attempts on the same page. Default: 5 s.
    pub retry_delay: Duration,

    /// Longest image edge sent to the service, in pixels. Default: 4000.
    ///
    /// Larger images are scaled down (aspect ratio preserved) before encoding.
    pub max_image_edge: u32,

    /// Extension of the written text files. Default: `txt`.
    pub output_extension: String,

    /// How page artifacts are named on disk.
    pub naming: NamingConvention,

    /// Custom system prompt for image pages. If None,
    /// [`DEFAULT_VISION_PROMPT`](crate::prompts::DEFAULT_VISION_PROMPT) is used.
    pub system_prompt: Option<String>,

    /// Custom system prompt for text pages. If None,
    /// [`DEFAULT_STRUCTURING_PROMPT`](crate::prompts::DEFAULT_STRUCTURING_PROMPT)
    /// is used. [`system_prompt`](Self::system_prompt) never applies here.
    pub structuring_prompt: Option<String>,

    /// Per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            max_image_edge: 4000,
            output_extension: "txt".to_string(),
            naming: NamingConvention::default(),
            system_prompt: None,
            structuring_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("concurrency", &self.concurrency)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("max_image_edge", &self.max_image_edge)
            .field("output_extension", &self.output_extension)
            .field("naming", &self.naming)
            .field("system_prompt", &self.system_prompt.as_ref().map(|_| "<custom>"))
            .field(
                "structuring_prompt",
                &self.structuring_prompt.as_ref().map(|_| "<custom>"),
            )
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PageProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn max_image_edge(mut self, px: u32) -> Self {
        self.config.max_image_edge = px.max(100);
        self
    }

    pub fn output_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.output_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn naming(mut self, naming: NamingConvention) -> Self {
        self.config.naming = naming;
        self
    }

    /// System prompt for image pages only.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// System prompt for text pages only.
    pub fn structuring_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.structuring_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "At least one attempt per page is required".into(),
            ));
        }
        if c.output_extension.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Output extension must not be empty".into(),
            ));
        }
        if c.naming.separators.iter().all(|s| s.is_empty()) {
            return Err(PipelineError::InvalidConfig(
                "At least one non-empty page separator is required".into(),
            ));
        }
        if c.naming.extensions.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "At least one artifact extension is required".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Naming ───────────────────────────────────────────────────────────────

/// Canonical separator between document identifier and page number.
pub const CANONICAL_SEPARATOR: &str = "-page-";

/// How page artifacts are named: `{identifier}{separator}{page}.{ext}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingConvention {
    /// Accepted separators. Outputs always use [`CANONICAL_SEPARATOR`].
    pub separators: Vec<String>,
    /// Accepted artifact extensions, lowercase, without the dot.
    pub extensions: Vec<String>,
}

impl Default for NamingConvention {
    /// `-page-` plus the legacy `_page_`; png, jpg, jpeg and txt.
    fn default() -> Self {
        Self {
            separators: vec![CANONICAL_SEPARATOR.to_string(), "_page_".to_string()],
            extensions: ["png", "jpg", "jpeg", "txt"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl NamingConvention {
    /// Only the canonical separator; the given extensions.
    pub fn canonical(extensions: &[&str]) -> Self {
        Self {
            separators: vec![CANONICAL_SEPARATOR.to_string()],
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
        }
    }

    /// File name for one page under the canonical convention.
    pub fn file_name(document_id: &str, page_label: &str, ext: &str) -> String {
        format!("{document_id}{CANONICAL_SEPARATOR}{page_label}.{ext}")
    }
}
