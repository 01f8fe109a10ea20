use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Number of words kept from the prompt in a usage record.
pub const PROMPT_EXCERPT_WORDS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Success,
    Failed,
}

impl UsageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageStatus::Success => "success",
            UsageStatus::Failed => "failed",
        }
    }
}

/// One generation attempt as reported to the usage tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub user_id: u64,
    pub prompt_excerpt: String,
    /// Root block type of the result; empty for failures.
    pub block_type: String,
    pub tokens_used: u64,
    pub estimated_cost: f64,
    pub status: UsageStatus,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn success(user_id: u64, prompt: &str, block_type: &str, tokens_used: u64, estimated_cost: f64) -> Self {
        Self {
            user_id,
            prompt_excerpt: prompt_excerpt(prompt),
            block_type: block_type.to_string(),
            tokens_used,
            estimated_cost,
            status: UsageStatus::Success,
            created_at: Utc::now(),
        }
    }

    pub fn failed(user_id: u64, prompt: &str) -> Self {
        Self {
            user_id,
            prompt_excerpt: prompt_excerpt(prompt),
            block_type: String::new(),
            tokens_used: 0,
            estimated_cost: 0.0,
            status: UsageStatus::Failed,
            created_at: Utc::now(),
        }
    }
}

/// First [`PROMPT_EXCERPT_WORDS`] words, with `...` appended when cut.
pub fn prompt_excerpt(prompt: &str) -> String {
    let words: Vec<&str> = prompt.split_whitespace().collect();
    if words.len() <= PROMPT_EXCERPT_WORDS {
        return words.join(" ");
    }
    format!("{}...", words[..PROMPT_EXCERPT_WORDS].join(" "))
}

/// `tokens / 1000 * rate`.
pub fn estimate_cost(tokens: u64, cost_per_1k_tokens: f64) -> f64 {
    tokens as f64 / 1000.0 * cost_per_1k_tokens
}

/// Receives one record per generation request. Failures are logged by the
/// caller and never fail the request.
#[async_trait]
pub trait UsageTracker: Send + Sync {
    async fn track(&self, record: UsageRecord) -> Result<(), AppError>;
}

/// Emits each record as a structured log event.
#[derive(Debug, Default)]
pub struct TracingUsageTracker;

#[async_trait]
impl UsageTracker for TracingUsageTracker {
    async fn track(&self, record: UsageRecord) -> Result<(), AppError> {
        tracing::info!(
            target: "genblocks::usage",
            user_id = record.user_id,
            block_type = %record.block_type,
            tokens_used = record.tokens_used,
            estimated_cost = record.estimated_cost,
            status = record.status.as_str(),
            "Generation usage"
        );
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryUsageTracker {
    records: Mutex<Vec<UsageRecord>>,
}

impl MemoryUsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Successful generations for `user_id` on the current UTC day.
    pub fn today_count(&self, user_id: u64) -> usize {
        let today = Utc::now().date_naive();
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| {
                r.user_id == user_id
                    && r.status == UsageStatus::Success
                    && r.created_at.date_naive() == today
            })
            .count()
    }

    pub fn total_tokens(&self) -> u64 {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.status == UsageStatus::Success)
            .map(|r| r.tokens_used)
            .sum()
    }
}

#[async_trait]
impl UsageTracker for MemoryUsageTracker {
    async fn track(&self, record: UsageRecord) -> Result<(), AppError> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
        Ok(())
    }
}
