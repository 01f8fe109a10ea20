//! Block-comment serialization.
//!
//! A node renders as `<!-- wp:name {attrs} -->inner<!-- /wp:name -->`, or as
//! the void form `<!-- wp:name {attrs} /-->` when it has no inner markup. The
//! `core/` namespace is elided. `inner` is either the concatenation of the
//! children or, for childless leaf types, generated HTML.
//!
//! [`parse_blocks`] reverses the format back into a tree.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::processor::clamp_heading_level;
use super::types::BlockNode;
use crate::error::AppError;

const CORE_NAMESPACE: &str = "core/";

static MARKER_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:([a-z][a-z0-9_-]*)/)?([a-z][a-z0-9_-]*)$").expect("valid regex")
});

pub fn serialize(node: &BlockNode) -> String {
    let mut out = String::new();
    serialize_into(node, &mut out);
    out
}

/// Serialize a sequence of top-level blocks, separated by blank lines.
pub fn serialize_all(nodes: &[BlockNode]) -> String {
    nodes.iter().map(serialize).collect::<Vec<_>>().join("\n\n")
}

fn serialize_into(node: &BlockNode, out: &mut String) {
    let name = node
        .name
        .strip_prefix(CORE_NAMESPACE)
        .unwrap_or(&node.name);

    let attrs = if node.attributes.is_empty() {
        String::new()
    } else {
        let mut json = String::new();
        write_json_object(&node.attributes, &mut json);
        json.push(' ');
        json
    };

    let inner = if node.children.is_empty() {
        leaf_markup(node)
    } else {
        let mut children = String::new();
        for child in &node.children {
            serialize_into(child, &mut children);
        }
        children
    };

    if inner.is_empty() {
        let _ = write!(out, "<!-- wp:{name} {attrs}/-->");
    } else {
        let _ = write!(out, "<!-- wp:{name} {attrs}-->{inner}<!-- /wp:{name} -->");
    }
}

// =============================================================================
// Leaf markup
// =============================================================================

fn leaf_markup(node: &BlockNode) -> String {
    let attr = |key: &str| node.attr_str(key).unwrap_or("");
    let align_style = |key: &str| match node.attr_str(key) {
        Some(a) if !a.is_empty() => format!(" style=\"text-align:{}\"", escape_attr(a)),
        _ => String::new(),
    };

    match node.name.as_str() {
        "core/paragraph" => format!("<p{}>{}</p>", align_style("align"), attr("content")),
        "core/heading" => {
            let level = node
                .attributes
                .get("level")
                .map(clamp_heading_level)
                .unwrap_or(2);
            format!(
                "<h{level}{}>{}</h{level}>",
                align_style("textAlign"),
                attr("content")
            )
        }
        "core/button" => {
            let url = match attr("url") {
                "" => "#",
                u => u,
            };
            format!(
                "<div class=\"wp-block-button\"><a class=\"wp-block-button__link wp-element-button\" href=\"{}\">{}</a></div>",
                escape_attr(url),
                escape_html(attr("text"))
            )
        }
        "core/image" => {
            let caption = match attr("caption") {
                "" => String::new(),
                c => format!("<figcaption class=\"wp-element-caption\">{}</figcaption>", c),
            };
            format!(
                "<figure class=\"wp-block-image\"><img src=\"{}\" alt=\"{}\"/>{}</figure>",
                escape_attr(attr("url")),
                escape_attr(attr("alt")),
                caption
            )
        }
        "core/spacer" => {
            let height = match node.attributes.get("height") {
                Some(Value::Number(n)) => format!("{}px", n),
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                _ => "40px".to_string(),
            };
            format!(
                "<div style=\"height:{}\" aria-hidden=\"true\" class=\"wp-block-spacer\"></div>",
                escape_attr(&height)
            )
        }
        "core/separator" => {
            "<hr class=\"wp-block-separator has-alpha-channel-opacity\"/>".to_string()
        }
        "core/quote" => {
            let cite = match attr("citation") {
                "" => String::new(),
                c => format!("<cite>{}</cite>", c),
            };
            format!(
                "<blockquote class=\"wp-block-quote\"><p>{}</p>{}</blockquote>",
                attr("value"),
                cite
            )
        }
        "core/list" => {
            let tag = if node.attributes.get("ordered").and_then(Value::as_bool) == Some(true) {
                "ol"
            } else {
                "ul"
            };
            format!("<{tag}>{}</{tag}>", attr("values"))
        }
        _ => String::new(),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_attr(text: &str) -> String {
    escape_html(text)
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

// =============================================================================
// Attribute JSON
//
// Standard JSON, except that characters which could terminate or confuse an
// HTML comment are written as unicode escapes: `--`, `<`, `>`, `&` and `"`
// inside strings.
// =============================================================================

fn write_json(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::String(s) => write_json_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => write_json_object(map, out),
    }
}

fn write_json_object(map: &Map<String, Value>, out: &mut String) {
    out.push('{');
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_json_string(key, out);
        out.push(':');
        write_json(value, out);
    }
    out.push('}');
}

fn write_json_string(s: &str, out: &mut String) {
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '-' if chars.peek() == Some(&'-') => {
                chars.next();
                out.push_str("\\u002d\\u002d");
            }
            '"' => out.push_str("\\u0022"),
            '\\' => out.push_str("\\\\"),
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

// =============================================================================
// Parser
// =============================================================================

enum Marker {
    Open { node: BlockNode, void: bool },
    Close { name: String },
}

/// Parse block-comment markup into top-level nodes.
///
/// HTML between markers is not retained; comments that are not block
/// markers are skipped.
pub fn parse_blocks(markup: &str) -> Result<Vec<BlockNode>, AppError> {
    let mut roots = Vec::new();
    let mut stack: Vec<BlockNode> = Vec::new();
    let mut rest = markup;

    while let Some(start) = rest.find("<!--") {
        let after_open = &rest[start + 4..];
        let end = after_open
            .find("-->")
            .ok_or_else(|| AppError::Markup("unterminated comment".into()))?;
        let body = &after_open[..end];
        rest = &after_open[end + 3..];

        let Some(marker) = parse_marker(body)? else {
            continue;
        };

        match marker {
            Marker::Open { node, void: true } => attach(&mut stack, &mut roots, node),
            Marker::Open { node, void: false } => stack.push(node),
            Marker::Close { name } => {
                let node = stack.pop().ok_or_else(|| {
                    AppError::Markup(format!("closing marker for {name} without an opener"))
                })?;
                if node.name != name {
                    return Err(AppError::Markup(format!(
                        "closing marker for {name} does not match open block {}",
                        node.name
                    )));
                }
                attach(&mut stack, &mut roots, node);
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(AppError::Markup(format!("block {} is never closed", open.name)));
    }
    Ok(roots)
}

fn attach(stack: &mut [BlockNode], roots: &mut Vec<BlockNode>, node: BlockNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

fn parse_marker(body: &str) -> Result<Option<Marker>, AppError> {
    let body = body.trim();
    let (closer, body) = match body.strip_prefix("/wp:") {
        Some(b) => (true, b),
        None => match body.strip_prefix("wp:") {
            Some(b) => (false, b),
            None => return Ok(None),
        },
    };

    let (body, void) = match body.strip_suffix('/') {
        Some(b) => (b.trim_end(), true),
        None => (body, false),
    };

    let (raw_name, raw_attrs) = match body.find(char::is_whitespace) {
        Some(i) => (&body[..i], body[i..].trim()),
        None => (body, ""),
    };

    let caps = MARKER_NAME_RE
        .captures(raw_name)
        .ok_or_else(|| AppError::Markup(format!("invalid block name in marker: {raw_name}")))?;
    let namespace = caps.get(1).map_or("core", |m| m.as_str());
    let name = format!("{}/{}", namespace, &caps[2]);

    if closer {
        return Ok(Some(Marker::Close { name }));
    }

    let attributes = if raw_attrs.is_empty() {
        Map::new()
    } else {
        match serde_json::from_str::<Value>(raw_attrs) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(AppError::Markup(format!(
                    "attributes of {name} are not an object"
                )))
            }
            Err(e) => {
                return Err(AppError::Markup(format!(
                    "invalid attributes for {name}: {e}"
                )))
            }
        }
    };

    Ok(Some(Marker::Open {
        node: BlockNode {
            name,
            attributes,
            children: Vec::new(),
        },
        void,
    }))
}
