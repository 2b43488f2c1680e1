//! [`TransformService`] over an `edgequake-llm` provider.
//!
//! Every backend goes through here: OpenAI, Azure OpenAI and Anthropic are
//! built from explicit credentials, anything else the factory knows (ollama,
//! gemini, mistral, LM Studio, …) by name. Library callers can also inject a
//! pre-built provider with their own middleware.

use super::{BackendOptions, ServiceError, TransformRequest, TransformService};
use crate::error::PipelineError;
use crate::pipeline::encode::PagePayload;
use async_trait::async_trait;
use edgequake_llm::{
    AnthropicProvider, AzureOpenAIProvider, ChatMessage, CompletionOptions, ImageData,
    LLMProvider, LlmError, OpenAIProvider, ProviderFactory,
};
use std::sync::Arc;
use tracing::debug;

pub struct LlmProviderService {
    provider: Arc<dyn LLMProvider>,
    label: String,
    options: BackendOptions,
}

impl LlmProviderService {
    /// Wrap an already-configured provider.
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        label: impl Into<String>,
        options: BackendOptions,
    ) -> Self {
        Self {
            provider,
            label: label.into(),
            options,
        }
    }

    /// Create a provider by name through [`ProviderFactory`].
    pub fn from_factory(
        name: &str,
        model: &str,
        options: BackendOptions,
    ) -> Result<Self, PipelineError> {
        let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            PipelineError::AuthenticationMissing {
                tried: format!("provider:{name}"),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, format!("{name}:{model}"), options))
    }

    /// OpenAI chat completions at `base_url` (any OpenAI-compatible API).
    pub fn openai(base_url: &str, api_key: &str, model: &str, options: BackendOptions) -> Self {
        let provider =
            OpenAIProvider::compatible(api_key, base_url.trim_end_matches('/')).with_model(model);
        Self::new(Arc::new(provider), format!("openai:{model}"), options)
    }

    /// Azure OpenAI deployment at `endpoint`.
    pub fn azure(
        endpoint: &str,
        api_key: &str,
        deployment: &str,
        api_version: &str,
        options: BackendOptions,
    ) -> Self {
        let provider =
            AzureOpenAIProvider::new(endpoint, api_key, deployment).with_api_version(api_version);
        Self::new(
            Arc::new(provider),
            format!("azure-openai:{deployment}"),
            options,
        )
    }

    /// Anthropic messages API at `base_url`.
    pub fn anthropic(base_url: &str, api_key: &str, model: &str, options: BackendOptions) -> Self {
        let provider = AnthropicProvider::new(api_key)
            .with_base_url(base_url.trim_end_matches('/'))
            .with_model(model);
        Self::new(Arc::new(provider), format!("anthropic:{model}"), options)
    }

    fn messages(request: &TransformRequest) -> Vec<ChatMessage> {
        let user = match &request.payload {
            PagePayload::Image { data, mime_type } => ChatMessage::user_with_images(
                request.user_prompt.as_str(),
                vec![ImageData::new(data.clone(), *mime_type).with_detail("high")],
            ),
            PagePayload::Text(_) => ChatMessage::user(request.user_prompt.as_str()),
        };
        vec![ChatMessage::system(request.system_prompt.as_str()), user]
    }

    fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.options.temperature,
            max_tokens: Some(self.options.max_tokens as usize),
            ..Default::default()
        }
    }
}

/// Keep an HTTP-like status where the provider error implies one, so the
/// report can tell throttling from auth failures.
fn service_error(e: LlmError) -> ServiceError {
    let status = match &e {
        LlmError::RateLimited(_) => Some(429),
        LlmError::AuthError(_) => Some(401),
        LlmError::InvalidRequest(_) | LlmError::TokenLimitExceeded { .. } => Some(400),
        LlmError::ModelNotFound(_) => Some(404),
        _ => None,
    };
    ServiceError::new(status, e.to_string())
}

#[async_trait]
impl TransformService for LlmProviderService {
    fn name(&self) -> &str {
        &self.label
    }

    async fn transform(&self, request: &TransformRequest) -> Result<String, ServiceError> {
        let messages = Self::messages(request);
        let options = self.completion_options();
        let call = self.provider.chat(&messages, Some(&options));
        let response = tokio::time::timeout(self.options.request_timeout, call)
            .await
            .map_err(|_| {
                ServiceError::new(
                    None,
                    format!(
                        "request timed out after {}s",
                        self.options.request_timeout.as_secs_f64()
                    ),
                )
            })?
            .map_err(service_error)?;

        debug!(
            "Page {}: {} input tokens, {} output tokens",
            request.page, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}
