use serde::Serialize;

use crate::engine::types::BlockPath;

/// Crate-wide error type. Every fallible function returns `Result<T, AppError>`.
/// Serializes as `{ error, kind, status }` so a transport layer can forward it
/// without inspecting variants.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // -- Input -------------------------------------------------------------
    #[error("Please provide a more detailed description of the block you want to create.")]
    PromptTooShort,

    #[error("Your description is too long. Please keep it under {max} characters.")]
    PromptTooLong { max: usize },

    #[error("Your prompt contains invalid content. Please describe the visual block you want to create.")]
    InvalidPrompt,

    // -- Upstream ----------------------------------------------------------
    #[error("API key is not configured for {provider}. Add it in settings.")]
    NoApiKey { provider: String },

    #[error("Rate limit reached for model '{model}': {message}")]
    RateLimited { model: String, message: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient credits: {0}")]
    InsufficientCredits(String),

    #[error("Bad request (check the model identifier): {0}")]
    BadRequest(String),

    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response from {provider}: {detail}")]
    InvalidResponseShape { provider: String, detail: String },

    #[error("Generation was cancelled")]
    Cancelled,

    // -- Parsing -----------------------------------------------------------
    #[error("AI returned an empty response")]
    EmptyResponse,

    #[error("Could not find valid JSON in AI response. The response may have been truncated or the AI did not return JSON.")]
    NoJsonFound { excerpt: String },

    #[error("JSON appears to be truncated or malformed. Open braces: {open}, Close braces: {close}")]
    JsonTruncated {
        open: usize,
        close: usize,
        excerpt: String,
    },

    #[error("Failed to parse response as JSON: {message}{hint}")]
    JsonParse {
        message: String,
        hint: String,
        json_excerpt: String,
        raw_excerpt: String,
    },

    #[error("Invalid block markup: {0}")]
    Markup(String),

    // -- Structure ---------------------------------------------------------
    #[error("Block nesting exceeds maximum depth of {max} levels at {path}")]
    MaxDepthExceeded { max: usize, path: BlockPath },

    #[error("Block data must be an object at {path}")]
    InvalidStructure { path: BlockPath },

    #[error("Block is missing required blockName field at {path}")]
    MissingTypeName { path: BlockPath },

    #[error("Invalid block name '{name}' at {path}")]
    InvalidTypeName { name: String, path: BlockPath },

    // -- Ambient -----------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::PromptTooShort => "prompt_too_short",
            AppError::PromptTooLong { .. } => "prompt_too_long",
            AppError::InvalidPrompt => "invalid_prompt",
            AppError::NoApiKey { .. } => "no_api_key",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::InsufficientCredits(_) => "insufficient_credits",
            AppError::BadRequest(_) => "bad_request",
            AppError::Upstream { .. } => "upstream_error",
            AppError::Transport(_) => "transport_error",
            AppError::InvalidResponseShape { .. } => "invalid_response_shape",
            AppError::Cancelled => "cancelled",
            AppError::EmptyResponse => "empty_response",
            AppError::NoJsonFound { .. } => "no_json_found",
            AppError::JsonTruncated { .. } => "json_truncated",
            AppError::JsonParse { .. } => "json_parse_error",
            AppError::Markup(_) => "invalid_markup",
            AppError::MaxDepthExceeded { .. } => "max_depth_exceeded",
            AppError::InvalidStructure { .. } => "invalid_structure",
            AppError::MissingTypeName { .. } => "missing_block_name",
            AppError::InvalidTypeName { .. } => "invalid_block_name",
            AppError::Config(_) => "config",
            AppError::Serde(_) => "serde",
            AppError::Io(_) => "io",
            AppError::Internal(_) => "internal",
        }
    }

    /// HTTP status hint for the transport layer.
    pub fn status(&self) -> u16 {
        match self {
            AppError::PromptTooShort
            | AppError::PromptTooLong { .. }
            | AppError::InvalidPrompt
            | AppError::NoApiKey { .. }
            | AppError::BadRequest(_) => 400,
            AppError::Unauthorized(_) => 401,
            AppError::InsufficientCredits(_) => 402,
            AppError::RateLimited { .. } => 429,
            AppError::Upstream { status, .. } => *status,
            AppError::Transport(_) => 502,
            AppError::Cancelled => 499,
            AppError::MaxDepthExceeded { .. }
            | AppError::InvalidStructure { .. }
            | AppError::MissingTypeName { .. }
            | AppError::InvalidTypeName { .. }
            | AppError::Markup(_) => 422,
            _ => 500,
        }
    }

    /// Prompt rejected before any network activity.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            AppError::PromptTooShort | AppError::PromptTooLong { .. } | AppError::InvalidPrompt
        )
    }

    /// True for failures of the upstream call a caller may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::RateLimited { .. } | AppError::Transport(_) => true,
            AppError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("AppError", 3)?;
        s.serialize_field("error", &self.to_string())?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("status", &self.status())?;
        s.end()
    }
}
