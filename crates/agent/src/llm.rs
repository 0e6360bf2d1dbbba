use std::time::Duration;

use async_trait::async_trait;
use leadloop_core::config::{LlmConfig, LlmProvider};
use leadloop_core::errors::{Service, ServiceError};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError>;

    fn model_name(&self) -> &str;
}

pub fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::OpenAi => "https://api.openai.com",
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

/// One HTTP client for all three providers; only the request shape and the
/// response path differ.
#[derive(Clone)]
pub struct HttpLlmClient {
    provider: LlmProvider,
    client: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for HttpLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLlmClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| ServiceError::from_transport(Service::Advisor, false, error.to_string()))?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string());

        Ok(Self {
            provider: config.provider,
            client,
            api_key: config.api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn endpoint(&self) -> String {
        let path = match self.provider {
            LlmProvider::Anthropic => "/v1/messages",
            LlmProvider::OpenAi => "/v1/chat/completions",
            LlmProvider::Ollama => "/api/chat",
        };
        format!("{}{path}", self.base_url)
    }

    pub fn request_body(&self, request: &CompletionRequest) -> Value {
        match self.provider {
            LlmProvider::Anthropic => json!({
                "model": self.model,
                "max_tokens": request.max_tokens,
                "system": request.system,
                "messages": [{"role": "user", "content": request.prompt}]
            }),
            LlmProvider::OpenAi => json!({
                "model": self.model,
                "max_tokens": request.max_tokens,
                "temperature": 0.1,
                "messages": [
                    {"role": "system", "content": request.system},
                    {"role": "user", "content": request.prompt}
                ]
            }),
            LlmProvider::Ollama => json!({
                "model": self.model,
                "stream": false,
                "options": {"num_predict": request.max_tokens},
                "messages": [
                    {"role": "system", "content": request.system},
                    {"role": "user", "content": request.prompt}
                ]
            }),
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let Some(api_key) = &self.api_key else {
            return builder;
        };
        match self.provider {
            LlmProvider::Anthropic => builder
                .header("x-api-key", api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION),
            LlmProvider::OpenAi | LlmProvider::Ollama => builder.bearer_auth(api_key.expose_secret()),
        }
    }
}

/// Pulls the assistant text out of a provider response body.
pub fn extract_text(provider: LlmProvider, body: &Value) -> Option<String> {
    let text = match provider {
        LlmProvider::Anthropic => body["content"]
            .as_array()?
            .iter()
            .filter_map(|block| block["text"].as_str())
            .collect::<Vec<_>>()
            .join(""),
        LlmProvider::OpenAi => body["choices"][0]["message"]["content"].as_str()?.to_string(),
        LlmProvider::Ollama => body["message"]["content"].as_str()?.to_string(),
    };
    (!text.trim().is_empty()).then_some(text)
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        let endpoint = self.endpoint();
        debug!(
            event_name = "advisor.llm.request",
            provider = self.provider.as_str(),
            model = %self.model,
            prompt_chars = request.prompt.len(),
            "sending completion request"
        );

        let response = self
            .authorize(self.client.post(&endpoint))
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|error| {
                ServiceError::from_transport(Service::Advisor, error.is_timeout(), error.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(Service::Advisor, status.as_u16(), &body, None));
        }

        let body: Value = response.json().await.map_err(|error| {
            ServiceError::from_transport(Service::Advisor, error.is_timeout(), error.to_string())
        })?;
        extract_text(self.provider, &body).ok_or_else(|| ServiceError::UnparseableSuggestion {
            message: format!("{} response carried no text content", self.provider.as_str()),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
