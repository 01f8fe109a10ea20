pub mod anthropic;
pub mod openai;
pub mod openrouter;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use super::types::AiResponse;
use crate::error::AppError;
use crate::settings::SettingsProvider;
use crate::settings_keys as keys;

/// Timeout for the models-endpoint check in [`AiClient::test_connection`].
const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// ProviderKind: which HTTP API is selected
// =============================================================================

/// Supported LLM APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    OpenRouter,
}

impl ProviderKind {
    /// Parse from the string stored in settings. Unknown values fall back to OpenAI.
    pub fn from_setting(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => ProviderKind::Anthropic,
            "openrouter" => ProviderKind::OpenRouter,
            _ => ProviderKind::OpenAi,
        }
    }

    pub fn as_setting(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    /// Settings key holding this provider's dedicated API key.
    pub fn api_key_setting(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => keys::OPENAI_API_KEY,
            ProviderKind::Anthropic => keys::ANTHROPIC_API_KEY,
            ProviderKind::OpenRouter => keys::OPENROUTER_API_KEY,
        }
    }
}

// =============================================================================
// Transport: the only component that touches the network
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Fully described outbound request. Headers include authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Executes HTTP requests. Network-level failures map to `AppError::Transport`;
/// any completed response, whatever its status, is returned as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AppError>;
}

/// Convert any displayable error into `AppError::Transport`.
fn transport_err(e: impl std::fmt::Display) -> AppError {
    AppError::Transport(e.to_string())
}

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("genblocks/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(transport_err)?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(&request.url),
            HttpMethod::Post => self.http.post(&request.url),
        }
        .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Transport(format!("request timed out after {:?}", request.timeout))
            } else {
                transport_err(e)
            }
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_err)?;
        Ok(HttpResponse { status, body })
    }
}

// =============================================================================
// AiProvider trait: per-API request/response shape
// =============================================================================

/// Provider-neutral completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub model: String,
    pub max_tokens: u64,
    pub temperature: f64,
}

/// Each backend knows its endpoints, its auth headers and how to map its
/// request and response bodies to the common [`AiResponse`] envelope.
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn default_base_url(&self) -> &'static str;

    fn default_model(&self) -> &'static str;

    /// Path of the completion endpoint, appended to the base URL.
    fn chat_path(&self) -> &'static str;

    /// Path of the model listing endpoint used for connection tests.
    fn models_path(&self) -> &'static str {
        "/models"
    }

    /// Authentication and provider-required extra headers.
    fn headers(&self, api_key: &str) -> Vec<(String, String)>;

    fn build_body(&self, request: &ChatRequest) -> Value;

    /// Normalize a decoded 200 response. A missing content field is an
    /// `InvalidResponseShape` error.
    fn parse_response(&self, body: &Value, requested_model: &str) -> Result<AiResponse, AppError>;
}

/// Create the provider for the given kind.
pub fn resolve_provider(kind: ProviderKind, settings: &dyn SettingsProvider) -> Box<dyn AiProvider> {
    match kind {
        ProviderKind::OpenAi => Box::new(openai::OpenAiProvider),
        ProviderKind::Anthropic => Box::new(anthropic::AnthropicProvider),
        ProviderKind::OpenRouter => Box::new(openrouter::OpenRouterProvider {
            site_url: settings.get_non_empty(keys::SITE_URL),
            site_name: settings.get_non_empty(keys::SITE_NAME),
        }),
    }
}

/// Read the active provider kind from settings.
pub fn load_provider_kind(settings: &dyn SettingsProvider) -> ProviderKind {
    ProviderKind::from_setting(&settings.get_str(keys::API_PROVIDER, keys::DEFAULT_PROVIDER))
}

// =============================================================================
// Error mapping
// =============================================================================

/// Best-effort extraction of the provider's human-readable error message.
pub fn provider_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .and_then(Value::as_str)
            .or_else(|| v.get("error").and_then(Value::as_str))
            .or_else(|| v.get("message").and_then(Value::as_str))
            .map(String::from)
    });
    match message {
        Some(m) => m,
        None if body.trim().is_empty() => "no response body".to_string(),
        None => super::parser::excerpt(body.trim()),
    }
}

/// Map a completed non-200 response to a typed error.
pub fn map_status_error(status: u16, body: &str, model: &str) -> AppError {
    match status {
        429 => AppError::RateLimited {
            model: model.to_string(),
            message: provider_message(body),
        },
        401 => AppError::Unauthorized(provider_message(body)),
        402 => AppError::InsufficientCredits(provider_message(body)),
        400 => AppError::BadRequest(provider_message(body)),
        _ => AppError::Upstream {
            status,
            body: body.to_string(),
        },
    }
}

/// Shorthand for the shape errors raised by provider parsers.
pub(crate) fn shape_err(provider: &str, detail: impl Into<String>) -> AppError {
    AppError::InvalidResponseShape {
        provider: provider.to_string(),
        detail: detail.into(),
    }
}

/// `prompt_tokens` / `completion_tokens` / `total_tokens` usage block shared
/// by the OpenAI-compatible APIs.
pub(crate) fn openai_usage(body: &Value) -> (u64, u64, u64) {
    let usage = body.get("usage");
    let field = |name: &str| {
        usage
            .and_then(|u| u.get(name))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    let prompt = field("prompt_tokens");
    let completion = field("completion_tokens");
    let total = match field("total_tokens") {
        0 => prompt + completion,
        t => t,
    };
    (prompt, completion, total)
}

// =============================================================================
// AiClient
// =============================================================================

/// Sends one completion request per call through the configured provider.
/// Never retries; the caller decides based on [`AppError::is_retryable`].
pub struct AiClient {
    settings: Arc<dyn SettingsProvider>,
    transport: Arc<dyn Transport>,
}

impl AiClient {
    pub fn new(settings: Arc<dyn SettingsProvider>, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
        }
    }

    pub fn provider_kind(&self) -> ProviderKind {
        load_provider_kind(self.settings.as_ref())
    }

    /// Provider-specific key first, then the shared `api_key`.
    pub fn api_key(&self, kind: ProviderKind) -> Option<String> {
        self.settings
            .get_non_empty(kind.api_key_setting())
            .or_else(|| self.settings.get_non_empty(keys::API_KEY))
    }

    /// Fails with `NoApiKey` before any network activity.
    pub fn require_api_key(&self, kind: ProviderKind) -> Result<String, AppError> {
        self.api_key(kind).ok_or_else(|| AppError::NoApiKey {
            provider: kind.as_setting().to_string(),
        })
    }

    /// Model identifier that a request would use.
    pub fn model(&self, provider: &dyn AiProvider) -> String {
        self.settings.get_str(keys::MODEL, provider.default_model())
    }

    fn base_url(&self, provider: &dyn AiProvider) -> String {
        self.settings
            .get_str(keys::API_BASE_URL, provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.settings
                .get_u64(keys::REQUEST_TIMEOUT_SECS, keys::DEFAULT_REQUEST_TIMEOUT_SECS)
                .max(1),
        )
    }

    fn headers(provider: &dyn AiProvider, api_key: &str) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        headers.extend(provider.headers(api_key));
        headers
    }

    /// Send `system` + `user` to the configured provider and normalize the reply.
    pub async fn complete(&self, system: &str, user: &str) -> Result<AiResponse, AppError> {
        let kind = self.provider_kind();
        let api_key = self.require_api_key(kind)?;
        let provider = resolve_provider(kind, self.settings.as_ref());
        let model = self.model(provider.as_ref());

        let chat = ChatRequest {
            system: system.to_string(),
            user: user.to_string(),
            model: model.clone(),
            max_tokens: self
                .settings
                .get_u64(keys::MAX_TOKENS, keys::DEFAULT_MAX_TOKENS),
            temperature: self
                .settings
                .get_f64(keys::TEMPERATURE, keys::DEFAULT_TEMPERATURE),
        };

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: format!("{}{}", self.base_url(provider.as_ref()), provider.chat_path()),
            headers: Self::headers(provider.as_ref(), &api_key),
            body: Some(provider.build_body(&chat)),
            timeout: self.request_timeout(),
        };

        tracing::info!(provider = provider.name(), model = %model, "Sending completion request");
        let started = Instant::now();
        let response = self.transport.send(request).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if response.status != 200 {
            tracing::warn!(
                provider = provider.name(),
                model = %model,
                status = response.status,
                elapsed_ms,
                "Completion request failed"
            );
            return Err(map_status_error(response.status, &response.body, &model));
        }

        let body: Value = serde_json::from_str(&response.body)
            .map_err(|e| shape_err(provider.name(), format!("response body is not JSON: {}", e)))?;
        let result = provider.parse_response(&body, &model)?;

        tracing::info!(
            provider = provider.name(),
            model = %result.model,
            tokens = result.tokens_used,
            elapsed_ms,
            "Completion received"
        );
        Ok(result)
    }

    /// Request the provider's model listing with the configured key.
    pub async fn test_connection(&self) -> Result<(), AppError> {
        let kind = self.provider_kind();
        let api_key = self.require_api_key(kind)?;
        let provider = resolve_provider(kind, self.settings.as_ref());
        let model = self.model(provider.as_ref());

        let request = HttpRequest {
            method: HttpMethod::Get,
            url: format!("{}{}", self.base_url(provider.as_ref()), provider.models_path()),
            headers: Self::headers(provider.as_ref(), &api_key),
            body: None,
            timeout: CONNECTION_TEST_TIMEOUT,
        };

        let response = self.transport.send(request).await?;
        if response.status == 200 {
            tracing::info!(provider = provider.name(), "Connection test succeeded");
            Ok(())
        } else {
            Err(map_status_error(response.status, &response.body, &model))
        }
    }
}
