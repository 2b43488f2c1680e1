//! End-to-end tests against a live model and a real PDF.
//!
//! Gated behind `E2E_ENABLED` so they never run in CI by accident. They also
//! need pdfium (downloaded on first use, or `PDFIUM_LIB_PATH`), a PDF at
//! `test_cases/sample.pdf`, and one configured backend.
//!
//! Run with:
//!   E2E_ENABLED=1 OPENAI_API_KEY=sk-... cargo test --test e2e -- --nocapture

use edgequake_page2text::{
    convert_document, extract_text, process_pages, resolve_backend, BackendOptions, BackendSpec,
    DocumentJob, PipelineConfig, RenderOptions,
};
use std::path::PathBuf;
use tempfile::TempDir;

fn sample_pdf() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/sample.pdf")
}

/// Skip unless E2E_ENABLED is set and the sample PDF exists.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p = sample_pdf();
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn env_specs() -> Vec<BackendSpec> {
    let var = |k: &str| std::env::var(k).ok();
    let mut specs = Vec::new();
    if let Some(key) = var("OPENAI_API_KEY") {
        specs.push(BackendSpec::openai(key));
    }
    if let Some(key) = var("ANTHROPIC_API_KEY") {
        specs.push(BackendSpec::anthropic(key));
    }
    specs
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_convert_sample() {
    let pdf = e2e_skip_unless_ready!();
    let tmp = TempDir::new().unwrap();
    let service = resolve_backend(&env_specs(), &BackendOptions::default())
        .expect("set OPENAI_API_KEY or ANTHROPIC_API_KEY");

    let job = DocumentJob::new(tmp.path().join("images"), tmp.path().join("out"), "sample");
    let report = convert_document(
        &pdf,
        &job,
        service,
        &PipelineConfig::default(),
        &RenderOptions::default(),
    )
    .await
    .expect("conversion should not fail fatally");

    println!("{}", serde_json::to_string_pretty(&report).unwrap());
    assert!(report.total_pages > 0);
    assert!(report.processed_pages > 0, "no page was transformed");
    for written in &report.written {
        let text = std::fs::read_to_string(&written.path).unwrap();
        assert!(!text.trim().is_empty(), "page {} is empty", written.page);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_structure_extracted_text() {
    let pdf = e2e_skip_unless_ready!();
    let tmp = TempDir::new().unwrap();
    let service = resolve_backend(&env_specs(), &BackendOptions::default())
        .expect("set OPENAI_API_KEY or ANTHROPIC_API_KEY");

    let text_dir = tmp.path().join("text");
    let artifacts = extract_text(&pdf, &text_dir, "sample", None).await.unwrap();
    assert!(!artifacts.is_empty());

    let job = DocumentJob::new(&text_dir, tmp.path().join("out"), "sample");
    let report = process_pages(service, &job, &PipelineConfig::default())
        .await
        .unwrap();
    assert_eq!(report.total_pages, artifacts.len());
}
