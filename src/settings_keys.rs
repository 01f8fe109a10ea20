//! Canonical settings key constants.
//!
//! Use these instead of raw string literals to prevent typo-based key mismatches.

/// Active provider: `openai`, `anthropic` or `openrouter`.
pub const API_PROVIDER: &str = "api_provider";

/// Shared API key, used when no provider-specific key is set.
pub const API_KEY: &str = "api_key";

pub const OPENAI_API_KEY: &str = "openai_api_key";
pub const ANTHROPIC_API_KEY: &str = "anthropic_api_key";
pub const OPENROUTER_API_KEY: &str = "openrouter_api_key";

/// Model identifier. Falls back to the provider's default when unset.
pub const MODEL: &str = "model";

pub const MAX_TOKENS: &str = "max_tokens";
pub const TEMPERATURE: &str = "temperature";

pub const CACHE_ENABLED: &str = "cache_enabled";

/// Cache TTL in seconds.
pub const CACHE_DURATION: &str = "cache_duration";

pub const REQUEST_TIMEOUT_SECS: &str = "request_timeout_secs";

/// Overrides the provider's API base URL (e.g. `https://proxy.internal/v1`).
pub const API_BASE_URL: &str = "api_base_url";

/// OpenRouter attribution (`HTTP-Referer` / `X-Title` headers).
pub const SITE_URL: &str = "site_url";
pub const SITE_NAME: &str = "site_name";

/// Price used for usage cost estimates.
pub const COST_PER_1K_TOKENS: &str = "cost_per_1k_tokens";

pub const DEFAULT_PROVIDER: &str = "openai";
pub const DEFAULT_MAX_TOKENS: u64 = 8192;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_CACHE_DURATION_SECS: u64 = 3600;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 90;

/// Every key above; used to discover environment overrides.
pub const ALL: &[&str] = &[
    API_PROVIDER,
    API_KEY,
    OPENAI_API_KEY,
    ANTHROPIC_API_KEY,
    OPENROUTER_API_KEY,
    MODEL,
    MAX_TOKENS,
    TEMPERATURE,
    CACHE_ENABLED,
    CACHE_DURATION,
    REQUEST_TIMEOUT_SECS,
    API_BASE_URL,
    SITE_URL,
    SITE_NAME,
    COST_PER_1K_TOKENS,
];
