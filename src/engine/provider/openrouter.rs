use serde_json::Value;

use super::openai::{chat_completions_body, parse_chat_completion};
use super::{AiProvider, ChatRequest};
use crate::engine::types::AiResponse;
use crate::error::AppError;

/// OpenRouter: OpenAI-compatible wire format plus optional attribution
/// headers identifying the calling site.
pub struct OpenRouterProvider {
    pub site_url: Option<String>,
    pub site_name: Option<String>,
}

impl AiProvider for OpenRouterProvider {
    fn name(&self) -> &'static str {
        "OpenRouter"
    }

    fn default_base_url(&self) -> &'static str {
        "https://openrouter.ai/api/v1"
    }

    fn default_model(&self) -> &'static str {
        "openai/gpt-4o"
    }

    fn chat_path(&self) -> &'static str {
        "/chat/completions"
    }

    fn headers(&self, api_key: &str) -> Vec<(String, String)> {
        let mut headers = vec![("Authorization".to_string(), format!("Bearer {}", api_key))];
        if let Some(url) = &self.site_url {
            headers.push(("HTTP-Referer".to_string(), url.clone()));
        }
        if let Some(name) = &self.site_name {
            headers.push(("X-Title".to_string(), name.clone()));
        }
        headers
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        chat_completions_body(request)
    }

    fn parse_response(&self, body: &Value, requested_model: &str) -> Result<AiResponse, AppError> {
        parse_chat_completion(self.name(), body, requested_model)
    }
}
