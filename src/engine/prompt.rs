use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::sanitize::sanitize_text;
use super::types::GenerationContext;
use crate::error::AppError;

pub const MIN_PROMPT_CHARS: usize = 10;
pub const MAX_PROMPT_CHARS: usize = 2000;

/// Heuristic deny-list for script-injection attempts. Not a security boundary:
/// model output is sanitized independently by the tree processor.
static BLOCKED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(script|javascript|onclick|onerror)\b",
        r"(?i)\b(eval|exec|system)\s*\(",
        r"(?i)<\s*script",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static LAYOUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)column|grid|layout|side by side").expect("valid regex"));
static INTERACTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)button|link|image").expect("valid regex"));

const VAGUE_TERMS: &[&str] = &["nice", "good", "cool", "awesome", "beautiful"];

const GENERATE_DIRECTIVE: &str = "Generate the Gutenberg block JSON now:";

const SYSTEM_PROMPT: &str = r##"You are an expert WordPress Gutenberg block generator. Convert the user's description into a single Gutenberg block tree expressed as JSON.

## OUTPUT RULES
1. Respond with exactly one JSON object and nothing else: no markdown fences, no prose before or after.
2. The response starts with { and ends with }.
3. Prefer WordPress core blocks. Produce semantic, accessible structures.
4. Nesting must not exceed 10 levels.

## ALLOWED BLOCKS
Any block in the core/ or app/ namespace, plus genblocks/cta, genblocks/hero, genblocks/features, genblocks/testimonial and genblocks/pricing.

### Containers
- core/group: generic container. attrs: className, align (left|center|right|wide|full), backgroundColor, textColor, style. Holds innerBlocks.
- core/columns: multi-column row. attrs: columns (number), align (wide|full). innerBlocks are core/column only.
- core/column: one column, only inside core/columns. attrs: width (e.g. "33.33%"), verticalAlignment (top|center|bottom).
- core/cover: background image with overlay. attrs: url, dimRatio (0-100), overlayColor, minHeight. Holds innerBlocks.

### Content
- core/heading: attrs: level (1-6), content, textAlign (left|center|right).
- core/paragraph: attrs: content (inline HTML such as <strong> and <em> allowed), align, dropCap (boolean).
- core/list: attrs: ordered (boolean), values ("<li>item</li><li>item</li>").
- core/quote: attrs: value, citation.

### Buttons
- core/buttons: container for buttons; always wrap core/button in it. attrs: layout { type: "flex", justifyContent: left|center|right }.
- core/button: attrs: text, url, backgroundColor, textColor. Only inside core/buttons.

### Media and utility
- core/image: attrs: url, alt, caption, align.
- core/spacer: attrs: height (e.g. "40px").
- core/separator: attrs: className (is-style-wide|is-style-dots).

## STYLING
Use the style attribute for spacing, color, border and typography, for example:
{"style": {"spacing": {"padding": {"top": "40px", "bottom": "40px"}}, "color": {"background": "#f5f5f5", "text": "#333333"}, "border": {"radius": "8px"}, "typography": {"fontSize": "18px", "fontWeight": "600"}}}
Colors are hex values (#rgb or #rrggbb) or lowercase palette slugs.
Full-width sections use "align": "full" on a group or cover. Cards are groups with a background color and border radius. Calls to action are groups holding a heading, a paragraph and core/buttons.

## SHAPE
{
  "blockName": "core/group",
  "attrs": {},
  "innerBlocks": []
}

Return ONLY the JSON object."##;

/// Canned request templates keyed by block kind. `{{name}}` placeholders are
/// substituted by [`block_type_prompt`].
const BLOCK_TYPE_PROMPTS: &[(&str, &str)] = &[
    ("cta", "Create a call-to-action section with the headline \"{{title}}\", supporting text \"{{description}}\" and a primary button labeled \"{{button_text}}\" linking to \"{{button_url}}\". Center the content on a contrasting background color."),
    ("hero", "Create a hero section with a large headline \"{{title}}\", the subtitle \"{{subtitle}}\" and {{button_count}} call-to-action buttons. Make it visually impactful with generous spacing."),
    ("features", "Create a {{columns}}-column features section. Each feature has a heading and a description. The features are: {{features_list}}"),
    ("testimonial", "Create a testimonial with the quote \"{{quote}}\" attributed to \"{{author}}\", \"{{role}}\" at \"{{company}}\". Style it elegantly."),
    ("pricing", "Create a pricing card for the \"{{plan_name}}\" plan at \"{{price}}\" per {{period}}. Include these features: {{features}}. Add a \"{{button_text}}\" button."),
    ("faq", "Create an FAQ section with these questions and answers: {{qa_pairs}}"),
    ("team", "Create a team member card for \"{{name}}\", \"{{role}}\", with an image placeholder and the short bio \"{{bio}}\"."),
    ("stats", "Create a statistics section showing these metrics: {{stats}}. Make the numbers prominent and label each one."),
    ("contact", "Create a contact section with the email \"{{email}}\", the phone number \"{{phone}}\" and the address \"{{address}}\". Include a call to action."),
    ("newsletter", "Create a newsletter signup section with the headline \"{{title}}\" and the description \"{{description}}\". The form itself is added separately."),
];

/// Builds the instruction text sent to the model.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    extensions: Vec<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an extra section to the system prompt.
    pub fn extend_system_prompt(mut self, section: impl Into<String>) -> Self {
        self.extensions.push(section.into());
        self
    }

    pub fn system_prompt(&self) -> String {
        let mut prompt = SYSTEM_PROMPT.to_string();
        for section in &self.extensions {
            prompt.push_str("\n\n");
            prompt.push_str(section);
        }
        prompt
    }

    /// Context block (if any), then the request, then the generation directive.
    pub fn build_user_prompt(&self, user_text: &str, context: &GenerationContext) -> String {
        let mut parts = Vec::with_capacity(3);

        let context_text = format_context(context);
        if !context_text.is_empty() {
            parts.push(format!("CONTEXT:\n{}", context_text));
        }
        parts.push(format!("USER REQUEST:\n{}", user_text));
        parts.push(GENERATE_DIRECTIVE.to_string());

        parts.join("\n\n")
    }
}

fn format_context(context: &GenerationContext) -> String {
    let mut lines = Vec::new();

    let mut push = |label: &str, value: &str| {
        let clean = sanitize_text(value);
        if !clean.is_empty() {
            lines.push(format!("- {}: {}", label, clean));
        }
    };

    if let Some(page_type) = &context.page_type {
        push("Page type", page_type);
    }
    if !context.existing_blocks.is_empty() {
        push("Existing blocks on page", &context.existing_blocks.join(", "));
    }
    match &context.theme_colors {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => push("Theme colors available", s),
        Some(other) => push("Theme colors available", &other.to_string()),
    }
    if let Some(industry) = &context.site_industry {
        push("Website industry", industry);
    }
    if let Some(tone) = &context.tone {
        push("Desired tone", tone);
    }
    if let Some(brand) = &context.brand_name {
        push("Brand/Company name", brand);
    }

    lines.join("\n")
}

/// Reject prompts that are too short, too long or match the deny-list.
pub fn validate_prompt(text: &str) -> Result<(), AppError> {
    if text.trim().chars().count() < MIN_PROMPT_CHARS {
        return Err(AppError::PromptTooShort);
    }
    if text.chars().count() > MAX_PROMPT_CHARS {
        return Err(AppError::PromptTooLong {
            max: MAX_PROMPT_CHARS,
        });
    }
    if BLOCKED_PATTERNS.iter().any(|re| re.is_match(text)) {
        tracing::warn!("Prompt rejected by deny-list");
        return Err(AppError::InvalidPrompt);
    }
    Ok(())
}

/// Append soft guidance lines when heuristics match. Never fails.
pub fn enhance_prompt(text: &str) -> String {
    let mut extra: Vec<&str> = Vec::new();

    let lower = text.to_lowercase();
    if VAGUE_TERMS.iter().any(|t| lower.contains(t)) {
        extra.push("Use professional styling with good contrast and spacing");
    }
    if LAYOUT_RE.is_match(text) {
        extra.push("Ensure the layout works well on different screen sizes");
    }
    if INTERACTIVE_RE.is_match(text) {
        extra.push("Include appropriate accessibility attributes");
    }

    if extra.is_empty() {
        return text.to_string();
    }
    format!("{}\n\nAdditional requirements:\n- {}", text, extra.join("\n- "))
}

/// Kinds accepted by [`block_type_prompt`].
pub fn block_type_kinds() -> impl Iterator<Item = &'static str> {
    BLOCK_TYPE_PROMPTS.iter().map(|(kind, _)| *kind)
}

/// Fill a canned template. Placeholders without a value are left in place.
pub fn block_type_prompt(kind: &str, vars: &HashMap<String, String>) -> Option<String> {
    let (_, template) = BLOCK_TYPE_PROMPTS.iter().find(|(k, _)| *k == kind)?;
    let mut prompt = template.to_string();
    for (key, value) in vars {
        prompt = prompt.replace(&format!("{{{{{}}}}}", key), value);
    }
    Some(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_lists_rules_and_blocks() {
        let prompt = PromptBuilder::new().system_prompt();
        assert!(prompt.contains("core/heading"));
        assert!(prompt.contains("core/buttons"));
        assert!(prompt.contains("exactly one JSON object"));
    }

    #[test]
    fn test_system_prompt_extension() {
        let prompt = PromptBuilder::new()
            .extend_system_prompt("## SITE RULES\nAlways use the brand palette.")
            .system_prompt();
        assert!(prompt.ends_with("Always use the brand palette."));
        assert!(prompt.starts_with(SYSTEM_PROMPT));
    }

    #[test]
    fn test_user_prompt_without_context() {
        let prompt = PromptBuilder::new()
            .build_user_prompt("Create a hero section", &GenerationContext::default());
        assert_eq!(
            prompt,
            "USER REQUEST:\nCreate a hero section\n\nGenerate the Gutenberg block JSON now:"
        );
    }

    #[test]
    fn test_user_prompt_with_context() {
        let context = GenerationContext {
            page_type: Some("landing".into()),
            existing_blocks: vec!["core/cover".into(), "core/columns".into()],
            theme_colors: Some(serde_json::json!(["#000000", "#ffffff"])),
            tone: Some("<b>friendly</b>".into()),
            brand_name: Some("   ".into()),
            ..Default::default()
        };
        let prompt = PromptBuilder::new().build_user_prompt("Create a pricing table", &context);
        assert!(prompt.starts_with("CONTEXT:\n- Page type: landing\n"));
        assert!(prompt.contains("- Existing blocks on page: core/cover, core/columns"));
        assert!(prompt.contains(r##"- Theme colors available: ["#000000","#ffffff"]"##));
        assert!(prompt.contains("- Desired tone: friendly"));
        assert!(!prompt.contains("Brand/Company name"));
        assert!(prompt.contains("\n\nUSER REQUEST:\nCreate a pricing table\n\n"));
        assert!(prompt.ends_with(GENERATE_DIRECTIVE));
    }

    #[test]
    fn test_validate_prompt_lengths() {
        assert!(matches!(validate_prompt("   hero   "), Err(AppError::PromptTooShort)));
        assert!(validate_prompt("Create a hero").is_ok());
        let long = "a".repeat(MAX_PROMPT_CHARS + 1);
        assert!(matches!(validate_prompt(&long), Err(AppError::PromptTooLong { max: 2000 })));
        assert!(validate_prompt(&"a".repeat(MAX_PROMPT_CHARS)).is_ok());
    }

    #[test]
    fn test_validate_prompt_deny_list() {
        for bad in [
            "Add a button with onclick handler",
            "Create a block that calls eval (something)",
            "Insert < script>alert(1)</script> please",
            "Use JavaScript to animate it",
        ] {
            assert!(
                matches!(validate_prompt(bad), Err(AppError::InvalidPrompt)),
                "should reject: {}",
                bad
            );
        }
        assert!(validate_prompt("Describe our ecosystem in a hero section").is_ok());
        assert!(validate_prompt("Create a manuscript-style quote block").is_ok());
    }

    #[test]
    fn test_enhance_prompt() {
        assert_eq!(enhance_prompt("Create a hero section"), "Create a hero section");

        let enhanced = enhance_prompt("A nice two column layout with a button");
        assert_eq!(
            enhanced,
            "A nice two column layout with a button\n\nAdditional requirements:\n\
             - Use professional styling with good contrast and spacing\n\
             - Ensure the layout works well on different screen sizes\n\
             - Include appropriate accessibility attributes"
        );
    }

    #[test]
    fn test_block_type_prompt() {
        let mut vars = HashMap::new();
        vars.insert("title".to_string(), "Join us".to_string());
        vars.insert("description".to_string(), "Weekly tips".to_string());
        let prompt = block_type_prompt("newsletter", &vars).unwrap();
        assert!(prompt.contains("\"Join us\""));
        assert!(prompt.contains("\"Weekly tips\""));
        assert!(!prompt.contains("{{"));

        let partial = block_type_prompt("cta", &vars).unwrap();
        assert!(partial.contains("{{button_text}}"));

        assert!(block_type_prompt("carousel", &vars).is_none());
        assert_eq!(block_type_kinds().count(), 10);
    }
}
