pub mod cache;
pub mod parser;
pub mod processor;
pub mod prompt;
pub mod provider;
pub mod sanitize;
pub mod serializer;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::AppError;
use crate::settings::SettingsProvider;
use crate::settings_keys as keys;

use self::cache::{cache_key, ResponseCache};
use self::prompt::{enhance_prompt, validate_prompt, PromptBuilder};
use self::provider::{AiClient, Transport};
use self::types::{GeneratedBlock, GenerationMeta, GenerationRequest};
use self::usage::{estimate_cost, UsageRecord, UsageTracker};

/// Turns a natural-language request into a validated block tree.
///
/// One upstream call per request. Only fully processed trees are cached and
/// nothing is cached on error or cancellation.
pub struct BlockGenerator {
    settings: Arc<dyn SettingsProvider>,
    client: AiClient,
    cache: Arc<ResponseCache>,
    usage: Arc<dyn UsageTracker>,
    /// In-flight usage reports.
    reports: TaskTracker,
    prompts: PromptBuilder,
}

impl BlockGenerator {
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        transport: Arc<dyn Transport>,
        cache: Arc<ResponseCache>,
        usage: Arc<dyn UsageTracker>,
    ) -> Self {
        Self {
            client: AiClient::new(Arc::clone(&settings), transport),
            settings,
            cache,
            usage,
            reports: TaskTracker::new(),
            prompts: PromptBuilder::new(),
        }
    }

    /// Replace the prompt builder, e.g. to extend the system prompt.
    pub fn with_prompt_builder(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn client(&self) -> &AiClient {
        &self.client
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedBlock, AppError> {
        self.generate_cancellable(request, CancellationToken::new()).await
    }

    /// Like [`generate`](Self::generate), abandoning the upstream call as soon
    /// as `cancel` fires.
    pub async fn generate_cancellable(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<GeneratedBlock, AppError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        tracing::debug!(request_id = %request_id, user_id = request.user_id, "Generation started");
        let result = self.run(request, &cancel).await;

        match &result {
            Ok(generated) => tracing::info!(
                request_id = %request_id,
                block = %generated.block.name,
                nodes = generated.block.count(),
                cached = generated.meta.cached,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Block generated"
            ),
            Err(e) => tracing::warn!(
                request_id = %request_id,
                kind = e.kind(),
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Block generation failed"
            ),
        }

        self.report_usage(request, &result);
        result
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GeneratedBlock, AppError> {
        validate_prompt(&request.prompt)?;
        self.client.require_api_key(self.client.provider_kind())?;

        let cache_enabled = self.settings.get_bool(keys::CACHE_ENABLED, true);
        let key = cache_key(&request.prompt, &request.context);
        if cache_enabled {
            if let Some(mut hit) = self.cache.get(&key) {
                tracing::debug!(key = %key, "Cache hit");
                hit.meta.cached = true;
                return Ok(hit);
            }
        }

        let system = self.prompts.system_prompt();
        let user = self
            .prompts
            .build_user_prompt(&enhance_prompt(&request.prompt), &request.context);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AppError::Cancelled);
            }
            res = self.client.complete(&system, &user) => res?,
        };

        let block = parser::parse_response(&response.content)?;
        let generated = GeneratedBlock {
            block,
            meta: GenerationMeta::from(&response),
        };

        if cache_enabled {
            let ttl = self
                .settings
                .get_u64(keys::CACHE_DURATION, keys::DEFAULT_CACHE_DURATION_SECS);
            self.cache
                .insert(key, generated.clone(), Duration::from_secs(ttl));
        }
        Ok(generated)
    }

    /// Wait for every usage report spawned so far.
    pub async fn flush_usage(&self) {
        self.reports.close();
        self.reports.wait().await;
        self.reports.reopen();
    }

    /// Spawns the report so the caller never waits on the tracker. Input
    /// errors are not reported. Tracker failures are logged and dropped.
    fn report_usage(&self, request: &GenerationRequest, result: &Result<GeneratedBlock, AppError>) {
        let record = match result {
            Ok(generated) => {
                let tokens = if generated.meta.cached {
                    0
                } else {
                    generated.meta.tokens_used
                };
                let rate = self.settings.get_f64(keys::COST_PER_1K_TOKENS, 0.0);
                UsageRecord::success(
                    request.user_id,
                    &request.prompt,
                    &generated.block.name,
                    tokens,
                    estimate_cost(tokens, rate),
                )
            }
            Err(e) if e.is_input_error() => return,
            Err(_) => UsageRecord::failed(request.user_id, &request.prompt),
        };

        let usage = Arc::clone(&self.usage);
        self.reports.spawn(async move {
            if let Err(e) = usage.track(record).await {
                tracing::warn!(error = %e, "Failed to record usage");
            }
        });
    }
}
