//! CLI binary for edgequake-page2text.
//!
//! A thin shim over the library crate: maps flags and env vars to
//! `PipelineConfig` / `BackendSpec`s, prints the JSON report on stdout and
//! exits 0 when every page succeeded, 1 otherwise. Logs and the progress bar
//! go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_page2text::backend::{
    DEFAULT_ANTHROPIC_BASE_URL, DEFAULT_ANTHROPIC_MODEL, DEFAULT_AZURE_API_VERSION,
    DEFAULT_AZURE_DEPLOYMENT, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL,
};
use edgequake_page2text::{
    convert_document, extract_text, process_document, render_pages, resolve_backend,
    BackendOptions, BackendSpec, DocumentJob, PageArtifact, PageProgressCallback, PipelineConfig,
    ProcessingReport, ProgressCallback, RasterFormat, RenderOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Progress bar ─────────────────────────────────────────────────────────

/// Progress bar plus one log line per finished page. Pages finish out of
/// order, so start times are tracked per page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<u32, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix("Discovering");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    /// Remove the bar if the run never reached `on_run_complete`.
    fn clear(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }

    fn elapsed_secs(&self, page: u32) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl PageProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        self.bar.set_prefix("Transforming");
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page: u32, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page, Instant::now());
        }
        self.bar.set_message(format!("page {page}"));
    }

    fn on_page_complete(&self, page: u32, total: usize, text_len: usize) {
        let secs = self.elapsed_secs(page);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page: u32, total: usize, error: &str) {
        let secs = self.elapsed_secs(page);
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!("{} {} pages transformed", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} pages transformed  ({} failed)",
                red("✘"),
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

// ── Arguments ────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Transform already-rendered pages storage/images/invoice-42-page-*.png
  page2text transform invoice-42

  # Same, also picking up files the renderer named after the upload
  page2text transform invoice-42 "Q3 report"

  # Render a PDF to page images only
  page2text render report.pdf invoice-42 --dpi 300

  # Extract embedded text, then structure it with the model
  # (a page with both an image and a .txt in one directory uses the image)
  page2text extract-text report.pdf invoice-42 --output-dir storage/text
  page2text transform invoice-42 --input-dir storage/text

  # Render and transform in one go
  page2text convert report.pdf invoice-42 --concurrency 5

BACKEND RESOLUTION (first usable wins):
  1. EDGEQUAKE_LLM_PROVIDER + EDGEQUAKE_MODEL   any edgequake-llm provider
  2. OPENAI_API_KEY (with OPENAI_API_TYPE=openai) OpenAI chat completions
  3. AZURE_OPENAI_ENDPOINT + AZURE_OPENAI_KEY   Azure OpenAI deployment
  4. ANTHROPIC_API_KEY                          Anthropic messages API

OUTPUT:
  One {id}-page-{n}.txt per page in --output-dir, and a JSON report on stdout:
  {"success": true, "processed_pages": 5, "total_pages": 5, "failed_pages": []}
  Exit status is 0 when every page succeeded, 1 otherwise.
"#;

/// Transform rendered PDF pages into per-page text with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "page2text",
    version,
    about = "Transform rendered PDF pages into per-page text with Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAGE2TEXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the report.
    #[arg(short, long, global = true, env = "PAGE2TEXT_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "PAGE2TEXT_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transform the page artifacts of one document.
    Transform(TransformArgs),
    /// Render a PDF into page images.
    Render(RenderArgs),
    /// Extract each page's embedded text into text artifacts.
    ExtractText(ExtractTextArgs),
    /// Render a PDF, then transform the rendered pages.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct TransformArgs {
    /// Document identifier: artifacts are named {id}-page-{n}.{ext}.
    document_id: String,

    /// Alternate identifier whose artifacts belong to the same document.
    alias: Option<String>,

    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Input PDF.
    pdf: PathBuf,

    /// Document identifier used in the page file names.
    document_id: String,

    /// Directory for rendered pages.
    #[arg(long, env = "PAGE2TEXT_INPUT_DIR", default_value = "storage/images")]
    output_dir: PathBuf,

    #[command(flatten)]
    render: RenderFlags,
}

#[derive(Args, Debug)]
struct ExtractTextArgs {
    /// Input PDF.
    pdf: PathBuf,

    /// Document identifier used in the page file names.
    document_id: String,

    /// Directory for the extracted text artifacts.
    #[arg(long, env = "PAGE2TEXT_INPUT_DIR", default_value = "storage/images")]
    output_dir: PathBuf,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PAGE2TEXT_PDF_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Input PDF.
    pdf: PathBuf,

    /// Document identifier used in every file name.
    document_id: String,

    #[command(flatten)]
    render: RenderFlags,

    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Args, Debug)]
struct RenderFlags {
    /// Rendering resolution (72–600).
    #[arg(long, env = "PAGE2TEXT_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Image format: png or jpg.
    #[arg(long, env = "PAGE2TEXT_FORMAT", default_value = "png")]
    format: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PAGE2TEXT_PDF_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Directory holding the page artifacts.
    #[arg(long, env = "PAGE2TEXT_INPUT_DIR", default_value = "storage/images")]
    input_dir: PathBuf,

    /// Directory for the per-page text files.
    #[arg(long, env = "PAGE2TEXT_OUTPUT_DIR", default_value = "storage/tmp")]
    output_dir: PathBuf,

    /// Pages transformed at the same time.
    #[arg(short, long, env = "PAGE2TEXT_CONCURRENCY", default_value_t = 3)]
    concurrency: usize,

    /// Service calls per page, including the first.
    #[arg(long, env = "PAGE2TEXT_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Seconds to wait between two attempts on the same page.
    #[arg(long, env = "PAGE2TEXT_RETRY_DELAY", default_value_t = 5)]
    retry_delay: u64,

    /// Longest image edge sent to the model, in pixels.
    #[arg(long, env = "PAGE2TEXT_MAX_IMAGE_EDGE", default_value_t = 4000)]
    max_image_edge: u32,

    /// Extension of the written text files.
    #[arg(long, env = "PAGE2TEXT_OUTPUT_EXTENSION", default_value = "txt")]
    output_extension: String,

    /// Path to a text file with a custom system prompt for image pages.
    #[arg(long, env = "PAGE2TEXT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Path to a text file with a custom system prompt for text pages.
    #[arg(long, env = "PAGE2TEXT_STRUCTURING_PROMPT")]
    structuring_prompt: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct BackendArgs {
    /// edgequake-llm provider name (openai, anthropic, gemini, ollama, …).
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Model for --provider.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// `openai` to use OPENAI_API_KEY; anything else skips it.
    #[arg(long, env = "OPENAI_API_TYPE", default_value = "openai")]
    openai_api_type: String,

    #[arg(long, env = "OPENAI_API_BASE", default_value = DEFAULT_OPENAI_BASE_URL)]
    openai_api_base: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_OPENAI_MODEL)]
    openai_model: String,

    #[arg(long, env = "AZURE_OPENAI_ENDPOINT")]
    azure_endpoint: Option<String>,

    #[arg(long, env = "AZURE_OPENAI_KEY", hide_env_values = true)]
    azure_key: Option<String>,

    #[arg(long, env = "AZURE_OPENAI_DEPLOYMENT", default_value = DEFAULT_AZURE_DEPLOYMENT)]
    azure_deployment: String,

    #[arg(long, env = "AZURE_OPENAI_API_VERSION", default_value = DEFAULT_AZURE_API_VERSION)]
    azure_api_version: String,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_MODEL", default_value = DEFAULT_ANTHROPIC_MODEL)]
    anthropic_model: String,

    /// Max output tokens per page.
    #[arg(long, env = "PAGE2TEXT_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: u32,

    /// Sampling temperature (0.0–2.0). Provider default when unset.
    #[arg(long, env = "PAGE2TEXT_TEMPERATURE")]
    temperature: Option<f32>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "PAGE2TEXT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

impl BackendArgs {
    /// Candidate backends in resolution order.
    fn specs(&self) -> Vec<BackendSpec> {
        let mut specs = Vec::new();
        if let (Some(name), Some(model)) = (&self.provider, &self.model) {
            specs.push(BackendSpec::Provider {
                name: name.clone(),
                model: model.clone(),
            });
        }
        if self.openai_api_type.eq_ignore_ascii_case("openai") {
            specs.push(BackendSpec::OpenAi {
                api_key: self.openai_api_key.clone(),
                base_url: self.openai_api_base.clone(),
                model: self.openai_model.clone(),
            });
        }
        specs.push(BackendSpec::AzureOpenAi {
            endpoint: self.azure_endpoint.clone(),
            api_key: self.azure_key.clone(),
            deployment: self.azure_deployment.clone(),
            api_version: self.azure_api_version.clone(),
        });
        specs.push(BackendSpec::Anthropic {
            api_key: self.anthropic_api_key.clone(),
            base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            model: self.anthropic_model.clone(),
        });
        specs
    }

    fn options(&self) -> BackendOptions {
        BackendOptions {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            request_timeout: Duration::from_secs(self.api_timeout),
        }
    }
}

impl PipelineArgs {
    fn job(&self, document_id: &str, alias: Option<&str>) -> DocumentJob {
        let job = DocumentJob::new(&self.input_dir, &self.output_dir, document_id);
        match alias {
            Some(a) => job.with_alias(a),
            None => job,
        }
    }

    fn config(&self, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
        let mut builder = PipelineConfig::builder()
            .concurrency(self.concurrency)
            .max_attempts(self.max_attempts)
            .retry_delay(Duration::from_secs(self.retry_delay))
            .max_image_edge(self.max_image_edge)
            .output_extension(self.output_extension.as_str());

        if let Some(ref path) = self.system_prompt {
            builder = builder.system_prompt(read_prompt(path)?);
        }
        if let Some(ref path) = self.structuring_prompt {
            builder = builder.structuring_prompt(read_prompt(path)?);
        }
        if let Some(cb) = progress {
            builder = builder.progress_callback(cb);
        }
        builder.build().context("Invalid configuration")
    }
}

fn read_prompt(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompt file '{}'", path.display()))
}

impl RenderFlags {
    fn options(&self) -> Result<RenderOptions> {
        let Some(format) = RasterFormat::parse(&self.format) else {
            bail!("Unsupported image format '{}': use png or jpg", self.format);
        };
        Ok(RenderOptions {
            dpi: self.dpi,
            format,
            password: self.password.clone(),
        })
    }
}

// ── Main ─────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // The bar gives all the feedback that matters; keep library logs quiet
    // under it unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let cli_progress = show_progress.then(CliProgressCallback::new);
    let progress = cli_progress.clone().map(|cb| cb as ProgressCallback);

    let result = execute(cli.command, progress, cli.quiet).await;
    if let Some(cb) = cli_progress {
        cb.clear();
    }
    result
}

async fn execute(
    command: Command,
    progress: Option<ProgressCallback>,
    quiet: bool,
) -> Result<ExitCode> {
    match command {
        Command::Transform(args) => {
            let job = args.pipeline.job(&args.document_id, args.alias.as_deref());
            let config = args.pipeline.config(progress)?;
            let report =
                process_document(&args.backend.specs(), &args.backend.options(), &job, &config)
                    .await;
            emit_report(&report)
        }
        Command::Render(args) => {
            let artifacts = render_pages(
                &args.pdf,
                &args.output_dir,
                &args.document_id,
                &args.render.options()?,
            )
            .await
            .context("Failed to render PDF")?;
            print_artifacts(&artifacts, quiet);
            Ok(ExitCode::SUCCESS)
        }
        Command::ExtractText(args) => {
            let artifacts = extract_text(
                &args.pdf,
                &args.output_dir,
                &args.document_id,
                args.password.as_deref(),
            )
            .await
            .context("Failed to extract text")?;
            print_artifacts(&artifacts, quiet);
            Ok(ExitCode::SUCCESS)
        }
        Command::Convert(args) => {
            let job = args.pipeline.job(&args.document_id, None);
            let config = args.pipeline.config(progress)?;
            let render_options = args.render.options()?;
            let report = match resolve_backend(&args.backend.specs(), &args.backend.options()) {
                Ok(service) => {
                    convert_document(&args.pdf, &job, service, &config, &render_options)
                        .await
                        .unwrap_or_else(|e| ProcessingReport::from_fatal(&e))
                }
                Err(e) => ProcessingReport::from_fatal(&e),
            };
            emit_report(&report)
        }
    }
}

/// Pretty JSON on stdout; exit status from `report.success`.
fn emit_report(report: &ProcessingReport) -> Result<ExitCode> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    println!("{json}");
    Ok(ExitCode::from(report.exit_code() as u8))
}

fn print_artifacts(artifacts: &[PageArtifact], quiet: bool) {
    if quiet {
        return;
    }
    for a in artifacts {
        println!("{}", a.path.display());
    }
    eprintln!("{} {} pages written", green("✔"), bold(&artifacts.len().to_string()));
}
