//! Per-page transformation with a bounded, fixed-delay retry loop.
//!
//! ## Outcome classification
//!
//! | Situation | Result | Attempts |
//! |-----------|--------|----------|
//! | artifact cannot be read / decoded | [`PageError::Encoding`] | 0 |
//! | service returns non-blank text | `Ok(text)` | 1..=max |
//! | last attempt returned blank text | [`PageError::EmptyResponse`] | max |
//! | last attempt errored | [`PageError::Service`] | max |
//!
//! Encoding failures are not retried: the bytes on disk will not change
//! between attempts. A blank reply counts as a failed attempt, so it is
//! retried like a transport error.

use crate::backend::{ServiceError, TransformRequest, TransformService};
use crate::config::PipelineConfig;
use crate::error::PageError;
use crate::output::PageOutcome;
use crate::pipeline::discover::PageArtifact;
use crate::pipeline::encode::{prepare, PagePayload};
use crate::prompts::{
    structuring_user_prompt, vision_user_prompt, DEFAULT_STRUCTURING_PROMPT,
    DEFAULT_VISION_PROMPT,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Turns one [`PageArtifact`] into one [`PageOutcome`].
///
/// Cheap to share: the dispatcher hands an `Arc<PageTransformer>` to every
/// worker.
pub struct PageTransformer {
    service: Arc<dyn TransformService>,
    max_attempts: u32,
    retry_delay: Duration,
    max_image_edge: u32,
    system_prompt: Option<String>,
    structuring_prompt: Option<String>,
}

enum AttemptFailure {
    Empty,
    Service(ServiceError),
}

impl PageTransformer {
    pub fn new(service: Arc<dyn TransformService>, config: &PipelineConfig) -> Self {
        Self {
            service,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay,
            max_image_edge: config.max_image_edge,
            system_prompt: config.system_prompt.clone(),
            structuring_prompt: config.structuring_prompt.clone(),
        }
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    /// Transform one page. Never panics on service or artifact errors; every
    /// failure is folded into the returned outcome.
    pub async fn transform(&self, artifact: &PageArtifact) -> PageOutcome {
        let start = Instant::now();
        let page = artifact.page;

        let payload = match prepare(artifact, self.max_image_edge).await {
            Ok(p) => p,
            Err(detail) => {
                warn!("Page {}: could not prepare '{}': {}", page, artifact.path.display(), detail);
                return finish(artifact, Err(PageError::Encoding { page, detail }), 0, start);
            }
        };

        let request = self.request(page, payload);
        let mut last_failure = AttemptFailure::Empty;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                sleep(self.retry_delay).await;
            }

            match self.service.transform(&request).await {
                Ok(text) if !text.trim().is_empty() => {
                    debug!("Page {}: {} chars on attempt {}", page, text.len(), attempt);
                    return finish(artifact, Ok(text), attempt, start);
                }
                Ok(_) => {
                    warn!(
                        "Page {}: attempt {}/{} returned empty text",
                        page, attempt, self.max_attempts
                    );
                    last_failure = AttemptFailure::Empty;
                }
                Err(e) => {
                    warn!(
                        "Page {}: attempt {}/{} failed: {}",
                        page, attempt, self.max_attempts, e
                    );
                    last_failure = AttemptFailure::Service(e);
                }
            }
        }

        let attempts = self.max_attempts;
        let err = match last_failure {
            AttemptFailure::Empty => PageError::EmptyResponse { page, attempts },
            AttemptFailure::Service(e) => PageError::Service {
                page,
                attempts,
                status: e.status,
                detail: e.message,
            },
        };
        finish(artifact, Err(err), attempts, start)
    }

    fn request(&self, page: u32, payload: PagePayload) -> TransformRequest {
        let (custom, default_system, user_prompt) = match &payload {
            PagePayload::Image { .. } => (
                &self.system_prompt,
                DEFAULT_VISION_PROMPT,
                vision_user_prompt(page),
            ),
            PagePayload::Text(text) => (
                &self.structuring_prompt,
                DEFAULT_STRUCTURING_PROMPT,
                structuring_user_prompt(page, text),
            ),
        };
        TransformRequest {
            page,
            system_prompt: custom
                .clone()
                .unwrap_or_else(|| default_system.to_string()),
            user_prompt,
            payload,
        }
    }
}

fn finish(
    artifact: &PageArtifact,
    result: Result<String, PageError>,
    attempts: u32,
    start: Instant,
) -> PageOutcome {
    PageOutcome {
        artifact: artifact.clone(),
        result,
        attempts,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::discover::ArtifactKind;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replays a fixed script of replies, then repeats the last one.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, ServiceError>>>,
        calls: AtomicU32,
        last_request: Mutex<Option<TransformRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, ServiceError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TransformService for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn transform(&self, request: &TransformRequest) -> Result<String, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front().unwrap()
            } else {
                replies.front().cloned().unwrap()
            }
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::builder()
            .retry_delay(Duration::ZERO)
            .build()
            .unwrap()
    }

    fn image_artifact(dir: &TempDir, page: u32) -> PageArtifact {
        let path = dir.path().join(format!("doc-page-{page}.png"));
        RgbImage::from_pixel(8, 8, Rgb([255, 255, 255])).save(&path).unwrap();
        PageArtifact {
            path,
            page,
            label: page.to_string(),
            kind: ArtifactKind::Image,
        }
    }

    fn fail(status: u16) -> Result<String, ServiceError> {
        Err(ServiceError::new(Some(status), format!("HTTP {status}")))
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let dir = TempDir::new().unwrap();
        let service = Scripted::new(vec![fail(500), fail(503), Ok("page text".into())]);
        let transformer = PageTransformer::new(service.clone(), &config());

        let outcome = transformer.transform(&image_artifact(&dir, 1)).await;
        assert_eq!(outcome.result, Ok("page text".to_string()));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(service.calls(), 3);
    }

    #[tokio::test]
    async fn persistent_failure_uses_exactly_the_attempt_budget() {
        let dir = TempDir::new().unwrap();
        let service = Scripted::new(vec![fail(429)]);
        let transformer = PageTransformer::new(service.clone(), &config());

        let outcome = transformer.transform(&image_artifact(&dir, 4)).await;
        assert_eq!(service.calls(), 3);
        match outcome.result {
            Err(PageError::Service {
                page,
                attempts,
                status,
                ..
            }) => {
                assert_eq!(page, 4);
                assert_eq!(attempts, 3);
                assert_eq!(status, Some(429));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_reply_is_retried_then_reported_empty() {
        let dir = TempDir::new().unwrap();
        let service = Scripted::new(vec![Ok("  \n".into())]);
        let transformer = PageTransformer::new(service.clone(), &config());

        let outcome = transformer.transform(&image_artifact(&dir, 2)).await;
        assert_eq!(service.calls(), 3);
        assert_eq!(
            outcome.result,
            Err(PageError::EmptyResponse {
                page: 2,
                attempts: 3
            })
        );
    }

    #[tokio::test]
    async fn unreadable_artifact_is_not_sent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc-page-1.png");
        std::fs::write(&path, b"not an image").unwrap();
        let artifact = PageArtifact {
            path,
            page: 1,
            label: "1".into(),
            kind: ArtifactKind::Image,
        };
        let service = Scripted::new(vec![Ok("never".into())]);
        let transformer = PageTransformer::new(service.clone(), &config());

        let outcome = transformer.transform(&artifact).await;
        assert_eq!(service.calls(), 0);
        assert_eq!(outcome.attempts, 0);
        assert!(matches!(outcome.result, Err(PageError::Encoding { page: 1, .. })));
    }

    #[tokio::test]
    async fn text_artifact_uses_structuring_prompt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc-page-3.txt");
        std::fs::write(&path, "raw  extracted\ntext").unwrap();
        let artifact = PageArtifact {
            path,
            page: 3,
            label: "3".into(),
            kind: ArtifactKind::Text,
        };
        let service = Scripted::new(vec![Ok("tidy".into())]);
        let transformer = PageTransformer::new(service.clone(), &config());

        transformer.transform(&artifact).await;
        let request = service.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.system_prompt, DEFAULT_STRUCTURING_PROMPT);
        assert!(request.user_prompt.contains("raw  extracted\ntext"));
        assert_eq!(request.payload, PagePayload::Text("raw  extracted\ntext".into()));
    }

    #[tokio::test]
    async fn custom_system_prompt_overrides_default() {
        let dir = TempDir::new().unwrap();
        let service = Scripted::new(vec![Ok("x".into())]);
        let config = PipelineConfig::builder()
            .retry_delay(Duration::ZERO)
            .system_prompt("be brief")
            .build()
            .unwrap();
        let transformer = PageTransformer::new(service.clone(), &config);

        transformer.transform(&image_artifact(&dir, 1)).await;
        let request = service.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.system_prompt, "be brief");
    }

    #[tokio::test]
    async fn prompt_overrides_are_per_artifact_kind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc-page-2.txt");
        std::fs::write(&path, "some text").unwrap();
        let text_artifact = PageArtifact {
            path,
            page: 2,
            label: "2".into(),
            kind: ArtifactKind::Text,
        };
        let config = PipelineConfig::builder()
            .retry_delay(Duration::ZERO)
            .system_prompt("describe the image")
            .build()
            .unwrap();

        let service = Scripted::new(vec![Ok("x".into())]);
        PageTransformer::new(service.clone(), &config)
            .transform(&text_artifact)
            .await;
        let request = service.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.system_prompt, DEFAULT_STRUCTURING_PROMPT);

        let config = PipelineConfig::builder()
            .retry_delay(Duration::ZERO)
            .structuring_prompt("tidy the text")
            .build()
            .unwrap();
        let service = Scripted::new(vec![Ok("x".into()), Ok("y".into())]);
        let transformer = PageTransformer::new(service.clone(), &config);

        transformer.transform(&text_artifact).await;
        let request = service.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.system_prompt, "tidy the text");

        transformer.transform(&image_artifact(&dir, 1)).await;
        let request = service.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.system_prompt, DEFAULT_VISION_PROMPT);
    }
}
