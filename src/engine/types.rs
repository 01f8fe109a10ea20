use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Block tree
// =============================================================================

/// One block instance: a namespaced type, a sanitized attribute bag and an
/// ordered list of children.
///
/// LLM output and stored markup use `blockName` / `attrs` / `innerBlocks`;
/// the outbound JSON shape uses `type` / `attributes` / `children`. Both are
/// accepted when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockNode {
    #[serde(rename = "type", alias = "blockName")]
    pub name: String,
    #[serde(default, alias = "attrs")]
    pub attributes: Map<String, Value>,
    #[serde(default, alias = "innerBlocks")]
    pub children: Vec<BlockNode>,
}

impl BlockNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Map::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_child(mut self, child: BlockNode) -> Self {
        self.children.push(child);
        self
    }

    /// Convenience accessor for string attributes.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    /// Depth of the deepest descendant (a leaf has depth 0).
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(BlockNode::count).sum::<usize>()
    }
}

// =============================================================================
// BlockPath: locates a node inside a tree for error reporting
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct PathSegment {
    index: Option<usize>,
    name: Option<String>,
}

/// Chain of `(child index, type name)` pairs from the root to a node.
///
/// Displays as `core/group > [1] core/columns > [0] core/column`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockPath {
    segments: Vec<PathSegment>,
}

impl BlockPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path consisting of a named root node.
    pub fn root(name: &str) -> Self {
        Self::new().enter(None).named(name)
    }

    /// Path to the named child at `index` of the node this path points to.
    pub fn child(&self, index: usize, name: &str) -> Self {
        self.enter(Some(index)).named(name)
    }

    /// Descend one level. The new segment has no name until [`named`](Self::named).
    pub fn enter(&self, index: Option<usize>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment { index, name: None });
        Self { segments }
    }

    /// Attach a type name to the last segment.
    pub fn named(mut self, name: &str) -> Self {
        if let Some(last) = self.segments.last_mut() {
            last.name = Some(name.to_string());
        }
        self
    }

    /// Child indices from the root down (the root itself has none).
    pub fn indices(&self) -> Vec<usize> {
        self.segments.iter().filter_map(|s| s.index).collect()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for BlockPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("root");
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(" > ")?;
            }
            match (seg.index, seg.name.as_deref()) {
                (None, Some(name)) => write!(f, "{name}")?,
                (None, None) => f.write_str("root")?,
                (Some(idx), Some(name)) => write!(f, "[{idx}] {name}")?,
                (Some(idx), None) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

// =============================================================================
// AI response envelope
// =============================================================================

/// Provider-independent completion result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    pub content: String,
    pub tokens_used: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub model: String,
}

// =============================================================================
// Generation request / result
// =============================================================================

/// Optional structured context sent along with the user's request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub existing_blocks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_colors: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
}

impl GenerationContext {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub context: GenerationContext,
    #[serde(default)]
    pub user_id: u64,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// Token accounting attached to a generated tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationMeta {
    pub tokens_used: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub model: String,
    /// Set when the result was served from the response cache.
    #[serde(default)]
    pub cached: bool,
}

impl From<&AiResponse> for GenerationMeta {
    fn from(r: &AiResponse) -> Self {
        Self {
            tokens_used: r.tokens_used,
            prompt_tokens: r.prompt_tokens,
            completion_tokens: r.completion_tokens,
            model: r.model.clone(),
            cached: false,
        }
    }
}

/// Outbound result of `generate`: `{type, attributes, children, meta}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedBlock {
    #[serde(flatten)]
    pub block: BlockNode,
    pub meta: GenerationMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_node_accepts_llm_field_names() {
        let json = r#"{"blockName":"core/paragraph","attrs":{"content":"Hi"},"innerBlocks":[]}"#;
        let node: BlockNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.name, "core/paragraph");
        assert_eq!(node.attr_str("content"), Some("Hi"));

        let out = serde_json::to_value(&node).unwrap();
        assert_eq!(out["type"], "core/paragraph");
        assert!(out.get("blockName").is_none());
    }

    #[test]
    fn test_depth_and_count() {
        let tree = BlockNode::new("core/group")
            .with_child(BlockNode::new("core/columns").with_child(BlockNode::new("core/column")))
            .with_child(BlockNode::new("core/paragraph"));
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.count(), 4);
    }

    #[test]
    fn test_block_path_display() {
        assert_eq!(BlockPath::new().to_string(), "root");
        let path = BlockPath::root("core/group").child(2, "core/columns").enter(Some(0));
        assert_eq!(path.to_string(), "core/group > [2] core/columns > [0]");
        assert_eq!(path.indices(), vec![2, 0]);
    }

    #[test]
    fn test_generated_block_flattens_tree() {
        let generated = GeneratedBlock {
            block: BlockNode::new("core/heading").with_attr("level", 2),
            meta: GenerationMeta {
                tokens_used: 10,
                model: "gpt-4".into(),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&generated).unwrap();
        assert_eq!(json["type"], "core/heading");
        assert_eq!(json["attributes"]["level"], 2);
        assert_eq!(json["meta"]["tokens_used"], 10);
    }

    #[test]
    fn test_context_is_empty() {
        assert!(GenerationContext::default().is_empty());
        let ctx = GenerationContext {
            tone: Some("friendly".into()),
            ..Default::default()
        };
        assert!(!ctx.is_empty());
    }
}
