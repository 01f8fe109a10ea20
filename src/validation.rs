use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;

/// `namespace/name`, both parts lowercase, starting with a letter.
static BLOCK_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*/[a-z][a-z0-9-]*$").expect("valid regex"));

/// Namespaces accepted wholesale.
pub const WILDCARD_NAMESPACES: &[&str] = &["core/", "app/"];

/// Blocks outside the wildcard namespaces that are still accepted.
pub const CUSTOM_BLOCKS: &[&str] = &[
    "genblocks/cta",
    "genblocks/hero",
    "genblocks/features",
    "genblocks/testimonial",
    "genblocks/pricing",
];

pub fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Config(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Whether `name` has the `namespace/name` shape.
pub fn is_well_formed_block_name(name: &str) -> bool {
    BLOCK_NAME_RE.is_match(name)
}

/// Whether `name` is well formed and on the allow-list.
pub fn is_allowed_block_name(name: &str) -> bool {
    if !is_well_formed_block_name(name) {
        return false;
    }
    WILDCARD_NAMESPACES.iter().any(|ns| name.starts_with(ns)) || CUSTOM_BLOCKS.contains(&name)
}
