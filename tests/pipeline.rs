//! End-to-end generation against a scripted transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use genblocks::engine::provider::{HttpRequest, HttpResponse, Transport};
use genblocks::engine::usage::{MemoryUsageTracker, UsageStatus};
use genblocks::settings_keys as keys;
use genblocks::{
    parse_blocks, serialize, AppError, GenerationContext, GenerationRequest, MemorySettings,
    Services,
};

/// Replays queued responses in order and records every request.
struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Duration,
}

impl ScriptedTransport {
    fn new(bodies: Vec<(u16, Value)>) -> Self {
        Self {
            responses: Mutex::new(
                bodies
                    .into_iter()
                    .map(|(status, body)| HttpResponse {
                        status,
                        body: body.to_string(),
                    })
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        self.requests.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppError::Transport("no scripted response left".into()))
    }
}

fn openai_completion(content: &str, total_tokens: u64) -> Value {
    json!({
        "model": "gpt-4",
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {
            "prompt_tokens": total_tokens.saturating_sub(50),
            "completion_tokens": total_tokens.min(50),
            "total_tokens": total_tokens
        }
    })
}

fn anthropic_message(text: &str) -> Value {
    json!({
        "model": "claude-3-5-sonnet-20241022",
        "content": [{"type": "text", "text": text}],
        "usage": {"input_tokens": 300, "output_tokens": 200}
    })
}

const HERO: &str = r##"{
  "blockName": "core/group",
  "attrs": {"align": "full", "backgroundColor": "#1a1a2e"},
  "innerBlocks": [
    {"blockName": "core/heading", "attrs": {"level": 1, "content": "Build <b>faster</b><script>alert(1)</script>"}, "innerBlocks": []},
    {"blockName": "core/paragraph", "attrs": {"content": "Ship pages in minutes"}, "innerBlocks": []},
    {"blockName": "core/buttons", "attrs": {}, "innerBlocks": [
      {"blockName": "core/button", "attrs": {"text": "Start", "url": "javascript:alert(1)"}, "innerBlocks": []}
    ]}
  ]
}"##;

struct Setup {
    services: Services,
    transport: Arc<ScriptedTransport>,
    usage: Arc<MemoryUsageTracker>,
}

fn setup(settings: MemorySettings, transport: ScriptedTransport) -> Setup {
    let transport = Arc::new(transport);
    let usage = Arc::new(MemoryUsageTracker::new());
    let services = Services::with_parts(Arc::new(settings), transport.clone(), usage.clone());
    Setup {
        services,
        transport,
        usage,
    }
}

fn hero_request() -> GenerationRequest {
    GenerationRequest {
        prompt: "Create a hero section with a heading, a subtitle and a call to action button".into(),
        context: GenerationContext {
            brand_name: Some("Acme".into()),
            ..Default::default()
        },
        user_id: 9,
    }
}

#[tokio::test]
async fn test_hero_scenario_end_to_end() {
    let s = setup(
        MemorySettings::new()
            .with(keys::OPENAI_API_KEY, "sk-openai")
            .with(keys::COST_PER_1K_TOKENS, "0.02"),
        ScriptedTransport::new(vec![(200, openai_completion(HERO, 1500))]),
    );

    let generated = s.services.generator.generate(&hero_request()).await.unwrap();
    let root = &generated.block;
    assert_eq!(root.name, "core/group");
    assert_eq!(root.attr_str("align"), Some("full"));
    assert_eq!(root.children.len(), 3);

    let heading = &root.children[0];
    let content = heading.attr_str("content").unwrap();
    assert!(content.contains("<b>faster</b>"));
    assert!(!content.contains("script"));

    let button = &root.children[2].children[0];
    assert_eq!(button.name, "core/button");
    assert_eq!(button.attr_str("url"), Some(""));

    assert_eq!(generated.meta.tokens_used, 1500);
    assert_eq!(generated.meta.model, "gpt-4");

    let request = s.transport.requests.lock().unwrap()[0].clone();
    assert_eq!(request.url, "https://api.openai.com/v1/chat/completions");
    assert_eq!(request.header("authorization"), Some("Bearer sk-openai"));

    s.services.generator.flush_usage().await;
    let records = s.usage.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, UsageStatus::Success);
    assert_eq!(records[0].user_id, 9);
    assert!((records[0].estimated_cost - 0.03).abs() < 1e-9);
}

#[tokio::test]
async fn test_generated_tree_survives_markup_round_trip() {
    let s = setup(
        MemorySettings::new().with(keys::API_KEY, "sk"),
        ScriptedTransport::new(vec![(200, openai_completion(HERO, 900))]),
    );
    let generated = s.services.generator.generate(&hero_request()).await.unwrap();

    let markup = serialize(&generated.block);
    assert!(markup.starts_with("<!-- wp:group "));
    assert!(markup.ends_with("<!-- /wp:group -->"));

    let parsed = parse_blocks(&markup).unwrap();
    assert_eq!(parsed, vec![generated.block]);
}

#[tokio::test]
async fn test_fenced_anthropic_response() {
    let fenced = format!("Here is the JSON:\n```json\n{}\n```", HERO);
    let s = setup(
        MemorySettings::new()
            .with(keys::API_PROVIDER, "anthropic")
            .with(keys::ANTHROPIC_API_KEY, "sk-ant"),
        ScriptedTransport::new(vec![(200, anthropic_message(&fenced))]),
    );

    let generated = s.services.generator.generate(&hero_request()).await.unwrap();
    assert_eq!(generated.block.name, "core/group");
    assert_eq!(generated.meta.tokens_used, 500);

    let request = s.transport.requests.lock().unwrap()[0].clone();
    assert_eq!(request.url, "https://api.anthropic.com/v1/messages");
    assert_eq!(request.header("x-api-key"), Some("sk-ant"));
    assert!(request.body.unwrap()["system"].is_string());
}

#[tokio::test]
async fn test_cache_hit_skips_provider() {
    let s = setup(
        MemorySettings::new().with(keys::API_KEY, "sk"),
        ScriptedTransport::new(vec![(200, openai_completion(HERO, 1000))]),
    );

    let first = s.services.generator.generate(&hero_request()).await.unwrap();
    let second = s.services.generator.generate(&hero_request()).await.unwrap();
    assert!(!first.meta.cached);
    assert!(second.meta.cached);
    assert_eq!(first.block, second.block);
    assert_eq!(s.transport.request_count(), 1);
    assert_eq!(s.services.cache.len(), 1);

    // A different context is a different entry and exhausts the script.
    let mut other = hero_request();
    other.context.tone = Some("formal".into());
    let err = s.services.generator.generate(&other).await.unwrap_err();
    assert!(matches!(err, AppError::Transport(_)));
}

#[tokio::test]
async fn test_small_token_counts_and_huge_cache_duration() {
    let s = setup(
        MemorySettings::new()
            .with(keys::API_KEY, "sk")
            .with(keys::CACHE_DURATION, u64::MAX.to_string()),
        ScriptedTransport::new(vec![(200, openai_completion(HERO, 10))]),
    );
    let generated = s.services.generator.generate(&hero_request()).await.unwrap();
    assert_eq!(generated.meta.tokens_used, 10);

    let again = s.services.generator.generate(&hero_request()).await.unwrap();
    assert!(again.meta.cached);
    assert_eq!(s.transport.request_count(), 1);
}

#[tokio::test]
async fn test_missing_api_key_fails_before_network() {
    let s = setup(
        MemorySettings::new().with(keys::API_PROVIDER, "openrouter"),
        ScriptedTransport::new(vec![(200, openai_completion(HERO, 10))]),
    );
    let err = s.services.generator.generate(&hero_request()).await.unwrap_err();
    match err {
        AppError::NoApiKey { provider } => assert_eq!(provider, "openrouter"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(s.transport.request_count(), 0);
}

#[tokio::test]
async fn test_rate_limit_is_not_cached() {
    let s = setup(
        MemorySettings::new().with(keys::API_KEY, "sk").with(keys::MODEL, "gpt-4o-mini"),
        ScriptedTransport::new(vec![
            (429, json!({"error": {"message": "Rate limit exceeded"}})),
            (200, openai_completion(HERO, 700)),
        ]),
    );

    let err = s.services.generator.generate(&hero_request()).await.unwrap_err();
    assert!(matches!(err, AppError::RateLimited { ref model, .. } if model == "gpt-4o-mini"));
    assert!(s.services.cache.is_empty());

    let ok = s.services.generator.generate(&hero_request()).await.unwrap();
    assert!(!ok.meta.cached);
    assert_eq!(s.transport.request_count(), 2);
}

#[tokio::test]
async fn test_cancellation_abandons_slow_call() {
    let s = setup(
        MemorySettings::new().with(keys::API_KEY, "sk"),
        ScriptedTransport::new(vec![(200, openai_completion(HERO, 100))])
            .slow(Duration::from_secs(30)),
    );

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = s
        .services
        .generator
        .generate_cancellable(&hero_request(), token)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Cancelled));
    assert!(s.services.cache.is_empty());
    s.services.generator.flush_usage().await;
    assert_eq!(s.usage.records()[0].status, UsageStatus::Failed);
}

#[tokio::test]
async fn test_structural_error_reports_path() {
    let deep = r#"{"blockName":"core/group","innerBlocks":[{"blockName":"core/columns","innerBlocks":[{"blockName":"evil/payload"}]}]}"#;
    let s = setup(
        MemorySettings::new().with(keys::API_KEY, "sk"),
        ScriptedTransport::new(vec![(200, openai_completion(deep, 100))]),
    );
    let err = s.services.generator.generate(&hero_request()).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_block_name");
    assert!(err.to_string().contains("core/group > [0] core/columns > [0]"));
}
