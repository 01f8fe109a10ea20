use serde_json::{json, Value};

use super::{shape_err, AiProvider, ChatRequest};
use crate::engine::types::AiResponse;
use crate::error::AppError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic messages API. The system prompt travels outside the message
/// list and usage is reported as separate input/output counts.
pub struct AnthropicProvider;

impl AiProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "Anthropic"
    }

    fn default_base_url(&self) -> &'static str {
        "https://api.anthropic.com/v1"
    }

    fn default_model(&self) -> &'static str {
        "claude-3-5-sonnet-20241022"
    }

    fn chat_path(&self) -> &'static str {
        "/messages"
    }

    fn headers(&self, api_key: &str) -> Vec<(String, String)> {
        vec![
            ("x-api-key".to_string(), api_key.to_string()),
            ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
        ]
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        json!({
            "model": request.model,
            "system": request.system,
            "messages": [
                {"role": "user", "content": request.user},
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        })
    }

    fn parse_response(&self, body: &Value, requested_model: &str) -> Result<AiResponse, AppError> {
        let blocks = body
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| shape_err(self.name(), "missing content array"))?;

        let texts: Vec<&str> = blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect();
        if texts.is_empty() {
            return Err(shape_err(self.name(), "no text block in content"));
        }

        let usage = |name: &str| {
            body.pointer(&format!("/usage/{}", name))
                .and_then(Value::as_u64)
                .unwrap_or(0)
        };
        let prompt_tokens = usage("input_tokens");
        let completion_tokens = usage("output_tokens");

        Ok(AiResponse {
            content: texts.concat(),
            tokens_used: prompt_tokens + completion_tokens,
            prompt_tokens,
            completion_tokens,
            model: body
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(requested_model)
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_separated() {
        let body = AnthropicProvider.build_body(&ChatRequest {
            system: "sys".into(),
            user: "usr".into(),
            model: "claude-3-5-sonnet-20241022".into(),
            max_tokens: 4096,
            temperature: 0.3,
        });
        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 4096);
    }

    #[test]
    fn test_headers() {
        let headers = AnthropicProvider.headers("sk-ant");
        assert!(headers.contains(&("x-api-key".to_string(), "sk-ant".to_string())));
        assert!(headers.iter().any(|(k, v)| k == "anthropic-version" && v == ANTHROPIC_VERSION));
        assert!(!headers.iter().any(|(k, _)| k == "Authorization"));
    }

    #[test]
    fn test_usage_summed_and_text_joined() {
        let body = json!({
            "model": "claude-3-5-sonnet-20241022",
            "content": [
                {"type": "text", "text": "{\"blockName\":"},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "\"core/paragraph\"}"}
            ],
            "usage": {"input_tokens": 300, "output_tokens": 45}
        });
        let r = AnthropicProvider.parse_response(&body, "requested").unwrap();
        assert_eq!(r.content, "{\"blockName\":\"core/paragraph\"}");
        assert_eq!(r.tokens_used, 345);
        assert_eq!(r.prompt_tokens, 300);
        assert_eq!(r.completion_tokens, 45);
        assert_eq!(r.model, "claude-3-5-sonnet-20241022");
    }

    #[test]
    fn test_missing_text_is_shape_error() {
        let err = AnthropicProvider
            .parse_response(&json!({"content": []}), "m")
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_response_shape");
        let err = AnthropicProvider
            .parse_response(&json!({"type": "message"}), "m")
            .unwrap_err();
        assert!(err.to_string().contains("Anthropic"));
    }
}
