//! Attribute sanitization.
//!
//! Every attribute value is cleaned according to a class inferred from its
//! key name. The functions here are pure and idempotent: sanitizing an already
//! sanitized value returns it unchanged.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Number, Value};
use url::Url;

/// Keys whose string values may carry a safe subset of HTML.
const RICH_TEXT_KEYS: &[&str] = &["content", "value", "values", "text", "caption", "citation"];

const URL_KEYS: &[&str] = &["url", "href", "src", "mediaLink"];

const COLOR_KEYS: &[&str] = &[
    "backgroundColor",
    "textColor",
    "overlayColor",
    "color",
    "background",
];

const ALIGNMENT_KEYS: &[&str] = &["align", "textAlign", "verticalAlignment", "justifyContent"];

pub const ALLOWED_ALIGNMENTS: &[&str] = &[
    "left",
    "center",
    "right",
    "wide",
    "full",
    "top",
    "bottom",
    "space-between",
];

const ALLOWED_URL_SCHEMES: &[&str] = &["http", "https", "mailto", "tel", "sms", "ftp", "ftps"];

static HEX_COLOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("valid regex")
});
static COLOR_SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").expect("valid regex"));
static CSS_IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[_a-zA-Z][_a-zA-Z0-9-]*$").expect("valid regex"));
static ATTR_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"));
static NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").expect("valid regex"));
static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("valid regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Base used only to validate relative references.
static RELATIVE_BASE: LazyLock<Url> =
    LazyLock::new(|| Url::parse("https://localhost/").expect("valid base url"));

/// Semantic class of an attribute, inferred from its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    RichText,
    Url,
    ClassName,
    Color,
    Alignment,
    Plain,
}

pub fn classify_key(key: &str) -> KeyClass {
    if RICH_TEXT_KEYS.contains(&key) {
        KeyClass::RichText
    } else if URL_KEYS.contains(&key) {
        KeyClass::Url
    } else if key == "className" {
        KeyClass::ClassName
    } else if COLOR_KEYS.contains(&key) {
        KeyClass::Color
    } else if ALIGNMENT_KEYS.contains(&key) {
        KeyClass::Alignment
    } else {
        KeyClass::Plain
    }
}

/// Attribute keys are kept verbatim when they are plain identifiers and
/// dropped otherwise.
pub fn is_valid_key(key: &str) -> bool {
    ATTR_KEY_RE.is_match(key)
}

/// Sanitize an attribute bag. Entries with invalid keys or values that fail
/// their class check (colors) are removed.
pub fn sanitize_attributes(attrs: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in attrs {
        if !is_valid_key(key) {
            tracing::debug!(key = %key, "Dropping attribute with invalid key");
            continue;
        }
        match sanitize_value(key, value) {
            Some(clean) => {
                out.insert(key.clone(), clean);
            }
            None => tracing::debug!(key = %key, "Dropping attribute that failed sanitization"),
        }
    }
    out
}

/// Sanitize one value under `key`. Returns `None` when the value must be
/// dropped.
///
/// Arrays are sanitized element-wise under the parent key; objects recurse
/// with their own keys.
pub fn sanitize_value(key: &str, value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => sanitize_string(key, s),
        Value::Object(map) => Some(Value::Object(sanitize_attributes(map))),
        Value::Array(items) => Some(Value::Array(
            items.iter().filter_map(|v| sanitize_value(key, v)).collect(),
        )),
        Value::Bool(_) | Value::Null | Value::Number(_) => Some(value.clone()),
    }
}

fn sanitize_string(key: &str, raw: &str) -> Option<Value> {
    let clean = match classify_key(key) {
        KeyClass::RichText => Value::String(sanitize_rich_text(raw)),
        KeyClass::Url => Value::String(sanitize_url(raw)),
        KeyClass::ClassName => Value::String(sanitize_class_names(raw)),
        KeyClass::Color => Value::String(sanitize_color(raw)?),
        KeyClass::Alignment => Value::String(sanitize_alignment(raw)),
        KeyClass::Plain => {
            let text = sanitize_text(raw);
            coerce_numeric(&text).unwrap_or(Value::String(text))
        }
    };
    Some(clean)
}

/// Keep a safe HTML subset. Script and style elements are removed together
/// with their content, event-handler attributes and unknown tags are stripped.
pub fn sanitize_rich_text(raw: &str) -> String {
    ammonia::clean(raw)
}

/// Strip all markup and normalise whitespace.
pub fn sanitize_text(raw: &str) -> String {
    let without_blocks = SCRIPT_STYLE_RE.replace_all(raw, "");
    let without_tags = TAG_RE.replace_all(&without_blocks, "");
    without_tags
        .chars()
        .filter(|c| !matches!(c, '<' | '>') && (!c.is_control() || c.is_whitespace()))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Accept scheme-validated absolute URLs and same-document relative
/// references. Anything else becomes the empty string.
pub fn sanitize_url(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty()
        || s.chars().any(|c| {
            c.is_control() || c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>' | '`' | '\\')
        })
    {
        return String::new();
    }

    if s.starts_with('#') || s.starts_with('?') || (s.starts_with('/') && !s.starts_with("//")) {
        return match RELATIVE_BASE.join(s) {
            Ok(_) => s.to_string(),
            Err(_) => String::new(),
        };
    }

    match Url::parse(s) {
        Ok(url) => {
            if is_acceptable_url(&url) {
                url.to_string()
            } else {
                String::new()
            }
        }
        // Bare host such as `example.com/pricing`: assume http.
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            match Url::parse(&format!("http://{}", s.trim_start_matches('/'))) {
                Ok(url)
                    if url
                        .host_str()
                        .is_some_and(|h| h.contains('.') || h == "localhost") =>
                {
                    url.to_string()
                }
                _ => String::new(),
            }
        }
        Err(_) => String::new(),
    }
}

fn is_acceptable_url(url: &Url) -> bool {
    let scheme = url.scheme();
    if !ALLOWED_URL_SCHEMES.contains(&scheme) {
        return false;
    }
    match scheme {
        "http" | "https" | "ftp" | "ftps" => url.has_host(),
        _ => true,
    }
}

/// Keep only tokens that are valid CSS identifiers.
pub fn sanitize_class_names(raw: &str) -> String {
    raw.split_whitespace()
        .filter(|token| CSS_IDENT_RE.is_match(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `#rgb`, `#rrggbb` or a lowercase palette slug; `None` otherwise.
pub fn sanitize_color(raw: &str) -> Option<String> {
    let s = raw.trim();
    if HEX_COLOR_RE.is_match(s) || COLOR_SLUG_RE.is_match(s) {
        Some(s.to_string())
    } else {
        None
    }
}

pub fn sanitize_alignment(raw: &str) -> String {
    let s = raw.trim();
    if ALLOWED_ALIGNMENTS.contains(&s) {
        s.to_string()
    } else {
        String::new()
    }
}

/// `"12"` → `12`, `"-0.5"` → `-0.5`. Non-numeric strings return `None`.
pub fn coerce_numeric(s: &str) -> Option<Value> {
    if !NUMERIC_RE.is_match(s) {
        return None;
    }
    if s.contains('.') {
        s.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
    } else {
        s.parse::<i64>().ok().map(|n| Value::Number(n.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_key() {
        assert_eq!(classify_key("content"), KeyClass::RichText);
        assert_eq!(classify_key("href"), KeyClass::Url);
        assert_eq!(classify_key("className"), KeyClass::ClassName);
        assert_eq!(classify_key("textColor"), KeyClass::Color);
        assert_eq!(classify_key("justifyContent"), KeyClass::Alignment);
        assert_eq!(classify_key("alt"), KeyClass::Plain);
    }

    #[test]
    fn test_rich_text_strips_scripts_and_handlers() {
        let out = sanitize_rich_text(r#"<strong>Hi</strong><script>alert(1)</script><a href="https://x.io" onclick="evil()">x</a>"#);
        assert!(out.contains("<strong>Hi</strong>"));
        assert!(!out.contains("script"));
        assert!(!out.contains("alert"));
        assert!(!out.contains("onclick"));
        assert!(out.contains("https://x.io"));
    }

    #[test]
    fn test_rich_text_drops_unknown_tags_keeps_text() {
        let out = sanitize_rich_text("<blink>Sale</blink> today");
        assert_eq!(out, "Sale today");
    }

    #[test]
    fn test_plain_text_strips_markup() {
        assert_eq!(sanitize_text("  <b>Bold</b>\n\ttext  "), "Bold text");
        assert_eq!(sanitize_text("<script>alert(1)</script>ok"), "ok");
        assert_eq!(sanitize_text("<<a>b>"), "b");
        assert_eq!(sanitize_text("40px"), "40px");
    }

    #[test]
    fn test_url_sanitization() {
        assert_eq!(sanitize_url("https://example.com/path?q=1"), "https://example.com/path?q=1");
        assert_eq!(sanitize_url("https://example.com"), "https://example.com/");
        assert_eq!(sanitize_url("#"), "#");
        assert_eq!(sanitize_url("/contact"), "/contact");
        assert_eq!(sanitize_url("mailto:hello@example.com"), "mailto:hello@example.com");
        assert_eq!(sanitize_url("example.com/pricing"), "http://example.com/pricing");
        assert_eq!(sanitize_url("javascript:alert(1)"), "");
        assert_eq!(sanitize_url("JavaScript:alert(1)"), "");
        assert_eq!(sanitize_url("data:text/html;base64,xyz"), "");
        assert_eq!(sanitize_url("https://example.com/\"onmouseover=x"), "");
        assert_eq!(sanitize_url("not a url"), "");
        assert_eq!(sanitize_url(""), "");
    }

    #[test]
    fn test_class_names() {
        assert_eq!(sanitize_class_names("hero  is-style-wide"), "hero is-style-wide");
        assert_eq!(sanitize_class_names("ok 1bad \"><x good_2"), "ok good_2");
        assert_eq!(sanitize_class_names("-foo --bar"), "-foo");
    }

    #[test]
    fn test_colors() {
        assert_eq!(sanitize_color("#abc"), Some("#abc".into()));
        assert_eq!(sanitize_color("#AABBCC"), Some("#AABBCC".into()));
        assert_eq!(sanitize_color("vivid-red"), Some("vivid-red".into()));
        assert_eq!(sanitize_color("#abcd"), None);
        assert_eq!(sanitize_color("red; background:url(x)"), None);
        assert_eq!(sanitize_color("Red"), None);
    }

    #[test]
    fn test_alignment() {
        assert_eq!(sanitize_alignment("center"), "center");
        assert_eq!(sanitize_alignment("space-between"), "space-between");
        assert_eq!(sanitize_alignment("diagonal"), "");
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(coerce_numeric("600"), Some(json!(600)));
        assert_eq!(coerce_numeric("-3"), Some(json!(-3)));
        assert_eq!(coerce_numeric("33.5"), Some(json!(33.5)));
        assert_eq!(coerce_numeric("40px"), None);
        assert_eq!(coerce_numeric("1e3"), None);
    }

    #[test]
    fn test_sanitize_attributes_recurses() {
        let attrs = json!({
            "align": "full",
            "backgroundColor": "not a color!",
            "bad key": "x",
            "style": {
                "spacing": {"padding": {"top": "40px"}},
                "typography": {"fontWeight": "600"},
                "color": {"background": "#f5f5f5"}
            },
            "dropCap": true,
            "anchor": null,
            "items": ["<b>one</b>", "two"],
            "columns": 3
        });
        let out = sanitize_attributes(attrs.as_object().unwrap());
        let out = Value::Object(out);

        assert_eq!(out["align"], "full");
        assert!(out.get("backgroundColor").is_none());
        assert!(out.get("bad key").is_none());
        assert_eq!(out["style"]["spacing"]["padding"]["top"], "40px");
        assert_eq!(out["style"]["typography"]["fontWeight"], 600);
        assert_eq!(out["style"]["color"]["background"], "#f5f5f5");
        assert_eq!(out["dropCap"], true);
        assert_eq!(out["anchor"], Value::Null);
        assert_eq!(out["items"], json!(["one", "two"]));
        assert_eq!(out["columns"], 3);
    }

    #[test]
    fn test_sanitize_attributes_is_idempotent() {
        let attrs = json!({
            "content": "Tom & Jerry <em>forever</em><img src=x onerror=alert(1)>",
            "url": "https://example.com",
            "className": "a b 9c",
            "alt": " spaced   <i>out</i> ",
            "textAlign": "middle",
            "height": "12"
        });
        let once = sanitize_attributes(attrs.as_object().unwrap());
        let twice = sanitize_attributes(&once);
        assert_eq!(once, twice);
    }
}
