use serde_json::{json, Value};

use super::{openai_usage, shape_err, AiProvider, ChatRequest};
use crate::engine::types::AiResponse;
use crate::error::AppError;

/// OpenAI chat completions API.
pub struct OpenAiProvider;

/// Request body shared by the OpenAI-compatible APIs.
pub(crate) fn chat_completions_body(request: &ChatRequest) -> Value {
    json!({
        "model": request.model,
        "messages": [
            {"role": "system", "content": request.system},
            {"role": "user", "content": request.user},
        ],
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    })
}

/// Read `choices[0].message.content` and the usage block.
pub(crate) fn parse_chat_completion(
    provider: &str,
    body: &Value,
    requested_model: &str,
) -> Result<AiResponse, AppError> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| shape_err(provider, "missing choices[0].message.content"))?;

    let (prompt_tokens, completion_tokens, tokens_used) = openai_usage(body);
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(requested_model)
        .to_string();

    Ok(AiResponse {
        content: content.to_string(),
        tokens_used,
        prompt_tokens,
        completion_tokens,
        model,
    })
}

impl AiProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    fn default_base_url(&self) -> &'static str {
        "https://api.openai.com/v1"
    }

    fn default_model(&self) -> &'static str {
        "gpt-4"
    }

    fn chat_path(&self) -> &'static str {
        "/chat/completions"
    }

    fn headers(&self, api_key: &str) -> Vec<(String, String)> {
        vec![("Authorization".to_string(), format!("Bearer {}", api_key))]
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        chat_completions_body(request)
    }

    fn parse_response(&self, body: &Value, requested_model: &str) -> Result<AiResponse, AppError> {
        parse_chat_completion(self.name(), body, requested_model)
    }
}
