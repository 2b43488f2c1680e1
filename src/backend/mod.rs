//! Transform backends: the external language-model call behind each page.
//!
//! The pipeline only knows the [`TransformService`] trait. Concrete services
//! are chosen once, before dispatch, from an explicit ordered list of
//! [`BackendSpec`]s: the first spec with a usable credential wins, and an
//! empty result is a hard [`PipelineError::AuthenticationMissing`]. Nothing
//! in here reads the process environment; the CLI fills the specs from its
//! flags and env fallbacks at start-up.
//!
//! Every spec becomes an [`LlmProviderService`]:
//!
//! | Spec | `edgequake-llm` provider |
//! |------|--------------------------|
//! | [`BackendSpec::Provider`] | `ProviderFactory::create_llm_provider` |
//! | [`BackendSpec::OpenAi`] | `OpenAIProvider::compatible` |
//! | [`BackendSpec::AzureOpenAi`] | `AzureOpenAIProvider` |
//! | [`BackendSpec::Anthropic`] | `AnthropicProvider` |

pub mod provider;

use crate::error::PipelineError;
use crate::pipeline::encode::PagePayload;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use provider::LlmProviderService;

/// Default OpenAI API base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default OpenAI model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
/// Default Azure OpenAI deployment name.
pub const DEFAULT_AZURE_DEPLOYMENT: &str = "gpt4o-forRAG";
/// Default Azure OpenAI API version.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-15-preview";
/// Default Anthropic API base URL.
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
/// Default Anthropic model.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-7-sonnet-20250219";

/// One page's request to the service.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    /// 1-based page number, for prompts and logs.
    pub page: u32,
    pub system_prompt: String,
    /// Instruction sent alongside the payload.
    pub user_prompt: String,
    pub payload: PagePayload,
}

/// A failed service call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ServiceError {
    /// HTTP status, when the call got that far.
    pub status: Option<u16>,
    pub message: String,
}

impl ServiceError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// The external transformation capability: one artifact in, text out.
///
/// Implementations issue exactly one call per invocation; retries belong to
/// [`crate::pipeline::transform::PageTransformer`]. An `Ok` with blank text is
/// allowed and is classified as an empty response by the caller.
#[async_trait]
pub trait TransformService: Send + Sync {
    /// Short label for logs, e.g. `openai:gpt-4o-mini`.
    fn name(&self) -> &str;

    async fn transform(&self, request: &TransformRequest) -> Result<String, ServiceError>;
}

/// Request knobs shared by every backend.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    /// Maximum tokens the model may generate per page. Default: 4000.
    pub max_tokens: u32,
    /// Sampling temperature. Default: provider default.
    pub temperature: Option<f32>,
    /// Per-request timeout. Default: 120 s.
    pub request_timeout: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            max_tokens: 4000,
            temperature: None,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// One candidate backend, in resolution order.
#[derive(Debug, Clone)]
pub enum BackendSpec {
    /// Named provider created through `edgequake_llm::ProviderFactory`
    /// (openai, anthropic, gemini, ollama, mistral, …). The factory reads the
    /// provider's own credential.
    Provider { name: String, model: String },
    OpenAi {
        api_key: Option<String>,
        base_url: String,
        model: String,
    },
    AzureOpenAi {
        endpoint: Option<String>,
        api_key: Option<String>,
        deployment: String,
        api_version: String,
    },
    Anthropic {
        api_key: Option<String>,
        base_url: String,
        model: String,
    },
}

impl BackendSpec {
    /// OpenAI with default base URL and model.
    pub fn openai(api_key: impl Into<String>) -> Self {
        BackendSpec::OpenAi {
            api_key: Some(api_key.into()),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
        }
    }

    /// Anthropic with default base URL and model.
    pub fn anthropic(api_key: impl Into<String>) -> Self {
        BackendSpec::Anthropic {
            api_key: Some(api_key.into()),
            base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            model: DEFAULT_ANTHROPIC_MODEL.to_string(),
        }
    }

    /// Short label used in logs and error messages.
    pub fn label(&self) -> String {
        match self {
            BackendSpec::Provider { name, .. } => format!("provider:{name}"),
            BackendSpec::OpenAi { .. } => "openai".to_string(),
            BackendSpec::AzureOpenAi { .. } => "azure-openai".to_string(),
            BackendSpec::Anthropic { .. } => "anthropic".to_string(),
        }
    }

    /// Whether the spec carries everything needed to attempt a call.
    pub fn is_configured(&self) -> bool {
        match self {
            BackendSpec::Provider { name, model } => present(name) && present(model),
            BackendSpec::OpenAi { api_key, .. } => opt_present(api_key),
            BackendSpec::AzureOpenAi {
                endpoint, api_key, ..
            } => opt_present(endpoint) && opt_present(api_key),
            BackendSpec::Anthropic { api_key, .. } => opt_present(api_key),
        }
    }
}

fn present(s: &str) -> bool {
    !s.trim().is_empty()
}

fn opt_present(s: &Option<String>) -> bool {
    s.as_deref().is_some_and(present)
}

/// Pick the first usable backend from `specs`.
///
/// Specs without credentials are skipped; a spec whose construction fails
/// (e.g. the provider factory rejects it) is logged and skipped too. When
/// nothing is left the run cannot succeed for any page, so this fails fast.
pub fn resolve_backend(
    specs: &[BackendSpec],
    options: &BackendOptions,
) -> Result<Arc<dyn TransformService>, PipelineError> {
    for spec in specs.iter().filter(|s| s.is_configured()) {
        match build_service(spec, options) {
            Ok(service) => {
                info!("Using transform backend {}", service.name());
                return Ok(service);
            }
            Err(e) => warn!("Backend {} unavailable: {}", spec.label(), e),
        }
    }

    let tried = if specs.is_empty() {
        "none".to_string()
    } else {
        specs.iter().map(BackendSpec::label).collect::<Vec<_>>().join(", ")
    };
    Err(PipelineError::AuthenticationMissing {
        tried,
        hint: "Set OPENAI_API_KEY, AZURE_OPENAI_ENDPOINT + AZURE_OPENAI_KEY, or ANTHROPIC_API_KEY, \
or name a provider with EDGEQUAKE_LLM_PROVIDER + EDGEQUAKE_MODEL."
            .to_string(),
    })
}

fn build_service(
    spec: &BackendSpec,
    options: &BackendOptions,
) -> Result<Arc<dyn TransformService>, PipelineError> {
    let options = options.clone();
    let service = match spec {
        BackendSpec::Provider { name, model } => {
            LlmProviderService::from_factory(name, model, options)?
        }
        BackendSpec::OpenAi {
            api_key,
            base_url,
            model,
        } => LlmProviderService::openai(
            base_url,
            api_key.as_deref().unwrap_or_default(),
            model,
            options,
        ),
        BackendSpec::AzureOpenAi {
            endpoint,
            api_key,
            deployment,
            api_version,
        } => LlmProviderService::azure(
            endpoint.as_deref().unwrap_or_default(),
            api_key.as_deref().unwrap_or_default(),
            deployment,
            api_version,
            options,
        ),
        BackendSpec::Anthropic {
            api_key,
            base_url,
            model,
        } => LlmProviderService::anthropic(
            base_url,
            api_key.as_deref().unwrap_or_default(),
            model,
            options,
        ),
    };
    Ok(Arc::new(service))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_credentials_are_not_configured() {
        let spec = BackendSpec::OpenAi {
            api_key: Some("   ".into()),
            base_url: DEFAULT_OPENAI_BASE_URL.into(),
            model: DEFAULT_OPENAI_MODEL.into(),
        };
        assert!(!spec.is_configured());

        let azure = BackendSpec::AzureOpenAi {
            endpoint: None,
            api_key: Some("key".into()),
            deployment: DEFAULT_AZURE_DEPLOYMENT.into(),
            api_version: DEFAULT_AZURE_API_VERSION.into(),
        };
        assert!(!azure.is_configured(), "azure needs endpoint and key");
    }

    #[test]
    fn no_usable_backend_is_authentication_missing() {
        let specs = vec![
            BackendSpec::OpenAi {
                api_key: None,
                base_url: DEFAULT_OPENAI_BASE_URL.into(),
                model: DEFAULT_OPENAI_MODEL.into(),
            },
            BackendSpec::Anthropic {
                api_key: Some(String::new()),
                base_url: DEFAULT_ANTHROPIC_BASE_URL.into(),
                model: DEFAULT_ANTHROPIC_MODEL.into(),
            },
        ];
        let err = resolve_backend(&specs, &BackendOptions::default())
            .err()
            .expect("nothing is configured");
        match err {
            PipelineError::AuthenticationMissing { tried, .. } => {
                assert_eq!(tried, "openai, anthropic");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_spec_list_is_authentication_missing() {
        let err = resolve_backend(&[], &BackendOptions::default())
            .err()
            .expect("no specs");
        assert!(matches!(err, PipelineError::AuthenticationMissing { .. }));
    }

    #[test]
    fn first_configured_spec_wins() {
        let specs = vec![
            BackendSpec::OpenAi {
                api_key: None,
                base_url: DEFAULT_OPENAI_BASE_URL.into(),
                model: DEFAULT_OPENAI_MODEL.into(),
            },
            BackendSpec::anthropic("sk-ant-test"),
            BackendSpec::openai("sk-test"),
        ];
        let service = resolve_backend(&specs, &BackendOptions::default()).unwrap();
        assert!(service.name().starts_with("anthropic"), "got {}", service.name());
    }
}
