//! Turns raw model output into a processed block tree.
//!
//! `clean` strips the wrapping models like to add around JSON, `extract`
//! isolates the outermost object and `parse_response` decodes it and hands
//! the value to the tree processor.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::processor;
use super::types::BlockNode;
use crate::error::AppError;

/// Upper bound for diagnostic excerpts carried in parse errors.
pub const MAX_EXCERPT_CHARS: usize = 500;

const FENCE: &str = "```";
const BOM: char = '\u{feff}';

/// Conversational lead-ins stripped from the start of a response.
const PREFIXES: &[&str] = &[
    "Here is the Gutenberg block JSON:",
    "Here's the Gutenberg block:",
    "Here is the JSON:",
    "Here's the JSON:",
    "Here is the block:",
    "Here's the block:",
    "JSON output:",
    "Output:",
    "Result:",
];

static LEADING_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^```(?:json)?\s*").expect("valid regex"));
static TRAILING_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```$").expect("valid regex"));
static JSON_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^json\b").expect("valid regex"));

/// Truncate to at most [`MAX_EXCERPT_CHARS`] characters.
pub fn excerpt(text: &str) -> String {
    text.chars().take(MAX_EXCERPT_CHARS).collect()
}

// =============================================================================
// Cleaner
// =============================================================================

/// Best-effort removal of markdown fences, conversational prefixes and
/// leading prose. The result is not guaranteed to be valid JSON.
///
/// The step sequence runs until nothing changes, so `clean(clean(s)) == clean(s)`.
pub fn clean(raw: &str) -> String {
    let mut current = raw;
    loop {
        let next = clean_pass(current);
        if next == current {
            return next.to_string();
        }
        current = next;
    }
}

/// One pass over the cleaning steps. Every step returns a substring of its
/// input, so repeated passes shrink monotonically.
fn clean_pass(input: &str) -> &str {
    let mut s = input.trim();
    s = s.trim_start_matches(BOM).trim();

    if let Some(m) = LEADING_FENCE_RE.find(s) {
        s = &s[m.end()..];
    }
    if let Some(m) = TRAILING_FENCE_RE.find(s) {
        s = &s[..m.start()];
    }

    if let (Some(first), Some(last)) = (s.find(FENCE), s.rfind(FENCE)) {
        if first < last {
            let mut inner = s[first + FENCE.len()..last].trim_start();
            if let Some(m) = JSON_TAG_RE.find(inner) {
                inner = &inner[m.end()..];
            }
            s = inner.trim();
        }
    }

    s = s.trim_matches('`').trim();

    for prefix in PREFIXES {
        if let Some(head) = s.get(..prefix.len()) {
            if head.eq_ignore_ascii_case(prefix) {
                s = s[prefix.len()..].trim();
                break;
            }
        }
    }

    if let Some(start) = s.find('{') {
        if start > 0 && s.ends_with('}') {
            s = &s[start..];
        }
    }

    s
}

// =============================================================================
// Extractor
// =============================================================================

/// Isolate the outermost JSON object in a cleaned response.
///
/// Text that already starts with `{` and ends with `}` is returned untouched.
/// Otherwise the first-`{`-to-last-`}` slice is brace counted as a truncation
/// check; braces inside string literals are counted too.
pub fn extract(cleaned: &str) -> Result<&str, AppError> {
    let s = cleaned.trim();
    if s.starts_with('{') && s.ends_with('}') {
        return Ok(s);
    }

    let start = s.find('{').ok_or_else(|| AppError::NoJsonFound {
        excerpt: excerpt(s),
    })?;
    let slice = match s.rfind('}') {
        Some(end) if end > start => &s[start..=end],
        _ => {
            let tail = &s[start..];
            return Err(AppError::JsonTruncated {
                open: tail.matches('{').count(),
                close: tail.matches('}').count(),
                excerpt: excerpt(tail),
            });
        }
    };

    let open = slice.matches('{').count();
    let close = slice.matches('}').count();
    if open != close {
        return Err(AppError::JsonTruncated {
            open,
            close,
            excerpt: excerpt(slice),
        });
    }

    Ok(slice)
}

// =============================================================================
// Full pipeline
// =============================================================================

/// Decode an extracted slice, attaching excerpts of both the slice and the
/// raw response on failure.
pub fn decode(json: &str, raw: &str) -> Result<Value, AppError> {
    serde_json::from_str(json).map_err(|e| {
        let hint = if raw.contains(FENCE) && !json.contains(FENCE) {
            " Original response had markdown fences that were partially cleaned."
        } else if json.contains(FENCE) {
            " The response still contains markdown code fences."
        } else {
            ""
        };
        AppError::JsonParse {
            message: e.to_string(),
            hint: hint.to_string(),
            json_excerpt: excerpt(json),
            raw_excerpt: excerpt(raw),
        }
    })
}

/// clean → extract → decode → process.
pub fn parse_response(raw: &str) -> Result<BlockNode, AppError> {
    let cleaned = clean(raw);
    if cleaned.is_empty() {
        return Err(AppError::EmptyResponse);
    }

    let json = extract(&cleaned)?;
    let value = decode(json, raw)?;
    let block = processor::process(&value)?;

    tracing::debug!(
        block = %block.name,
        nodes = block.count(),
        depth = block.depth(),
        "Parsed AI response"
    );
    Ok(block)
}
