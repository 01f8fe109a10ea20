//! Tree processor: validation, sanitization and structural repair in one pass.
//!
//! Input is untrusted JSON decoded from model output. Recursion depth is
//! bounded by [`MAX_DEPTH`] and checked before descending into a child.

use serde_json::{json, Map, Value};

use super::sanitize::sanitize_attributes;
use super::types::{BlockNode, BlockPath};
use crate::error::AppError;
use crate::validation::{is_allowed_block_name, is_well_formed_block_name};

/// Maximum nesting depth. The root is depth 0.
pub const MAX_DEPTH: usize = 10;

const NAME_KEYS: &[&str] = &["blockName", "type"];
const ATTR_KEYS: &[&str] = &["attrs", "attributes"];
const CHILD_KEYS: &[&str] = &["innerBlocks", "children"];

/// Validate, sanitize and repair a decoded block tree.
pub fn process(value: &Value) -> Result<BlockNode, AppError> {
    process_at(value, 0, &BlockPath::new().enter(None))
}

fn process_at(value: &Value, depth: usize, path: &BlockPath) -> Result<BlockNode, AppError> {
    if depth > MAX_DEPTH {
        return Err(AppError::MaxDepthExceeded {
            max: MAX_DEPTH,
            path: path.clone(),
        });
    }

    let obj = value.as_object().ok_or_else(|| AppError::InvalidStructure {
        path: path.clone(),
    })?;

    let raw_name = first_of(obj, NAME_KEYS).ok_or_else(|| AppError::MissingTypeName {
        path: path.clone(),
    })?;
    let name = match raw_name.as_str() {
        Some(n) if is_allowed_block_name(n) => n.to_string(),
        Some(n) => {
            if is_well_formed_block_name(n) {
                tracing::warn!(block = %n, path = %path, "Rejected block outside the allow-list");
            }
            return Err(AppError::InvalidTypeName {
                name: n.to_string(),
                path: path.clone(),
            });
        }
        None => {
            return Err(AppError::InvalidTypeName {
                name: raw_name.to_string(),
                path: path.clone(),
            })
        }
    };
    let path = path.clone().named(&name);

    let mut attributes = match first_of(obj, ATTR_KEYS) {
        Some(Value::Object(attrs)) => sanitize_attributes(attrs),
        _ => Map::new(),
    };

    if name == "core/heading" {
        if let Some(level) = attributes.get("level") {
            let clamped = clamp_heading_level(level);
            attributes.insert("level".into(), Value::from(clamped));
        }
    }

    let raw_children: &[Value] = match first_of(obj, CHILD_KEYS) {
        Some(Value::Array(items)) => items,
        _ => &[],
    };

    let mut children = Vec::with_capacity(raw_children.len());
    for (index, child) in raw_children.iter().enumerate() {
        children.push(process_at(child, depth + 1, &path.enter(Some(index)))?);
    }

    let node = BlockNode {
        name,
        attributes,
        children,
    };

    if depth == 0 {
        return Ok(wrap_standalone_root(node));
    }
    Ok(node)
}

fn first_of<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

/// Integer heading level clamped to 1..=6. Non-numeric values become 1.
pub fn clamp_heading_level(level: &Value) -> i64 {
    let raw = match level {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(1),
        Value::String(s) => s.trim().parse::<f64>().map(|f| f.trunc() as i64).unwrap_or(1),
        Value::Bool(true) => 1,
        _ => 1,
    };
    raw.clamp(1, 6)
}

/// Wrap root-level blocks that require a container.
///
/// Only applied at the root so that properly nested occurrences are never
/// double-wrapped.
fn wrap_standalone_root(node: BlockNode) -> BlockNode {
    match node.name.as_str() {
        "core/button" => {
            tracing::debug!("Wrapping root core/button in core/buttons");
            let mut attributes = Map::new();
            attributes.insert(
                "layout".into(),
                json!({ "type": "flex", "justifyContent": "center" }),
            );
            BlockNode {
                name: "core/buttons".into(),
                attributes,
                children: vec![node],
            }
        }
        "core/column" => {
            tracing::debug!("Wrapping root core/column in core/columns");
            BlockNode {
                name: "core/columns".into(),
                attributes: Map::new(),
                children: vec![node],
            }
        }
        _ => node,
    }
}
