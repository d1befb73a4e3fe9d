// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Prompt Template Engine
//!
//! Renders the user prompts for content generation with Handlebars.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Turn a named template plus request fields into prompt text
//! - **Integration:** `application::content` → LLM input
//!
//! Prompts are plain text, so HTML escaping is switched off and missing
//! fields render as empty strings.
//!
//! # Usage
//!
//! ```ignore
//! let engine = PromptTemplateEngine::with_builtin_templates()?;
//! let context = PromptContext::new().field("title", "Guitar lessons");
//! let prompt = engine.render("listing", &context)?;
//! ```

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::{Map, Value};

const BUILTIN_TEMPLATES: [(&str, &str); 8] = [
    ("listing", include_str!("../application/prompts/listing.hbs")),
    ("event", include_str!("../application/prompts/event.hbs")),
    ("message", include_str!("../application/prompts/message.hbs")),
    ("bio", include_str!("../application/prompts/bio.hbs")),
    ("newsletter", include_str!("../application/prompts/newsletter.hbs")),
    ("newsletter_system", include_str!("../application/prompts/newsletter_system.hbs")),
    ("blog", include_str!("../application/prompts/blog.hbs")),
    ("page", include_str!("../application/prompts/page.hbs")),
];

// ============================================================================
// Template Context
// ============================================================================

/// Fields available to a prompt template
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct PromptContext {
    fields: Map<String, Value>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter; values that fail to serialize are skipped
    pub fn field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.fields.insert(key.into(), value);
        }
        self
    }

    /// Set a field only when the value is present and non-blank
    pub fn optional(self, key: impl Into<String>, value: Option<&str>) -> Self {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => self.field(key, v),
            None => self,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

// ============================================================================
// Template Engine
// ============================================================================

pub struct PromptTemplateEngine {
    handlebars: Handlebars<'static>,
}

impl PromptTemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    /// Engine with every content kind's prompt registered
    pub fn with_builtin_templates() -> Result<Self> {
        let mut engine = Self::new();
        for (name, source) in BUILTIN_TEMPLATES {
            engine.register(name, source)?;
        }
        Ok(engine)
    }

    pub fn register(&mut self, name: &str, source: &str) -> Result<()> {
        self.handlebars
            .register_template_string(name, source)
            .with_context(|| format!("Invalid prompt template '{}'", name))
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.has_template(name)
    }

    /// Render a registered template
    pub fn render(&self, name: &str, context: &PromptContext) -> Result<String> {
        self.handlebars
            .render(name, context)
            .with_context(|| format!("Failed to render prompt template '{}'", name))
    }

    /// Render an ad-hoc template string
    pub fn render_template(&self, template: &str, context: &PromptContext) -> Result<String> {
        self.handlebars
            .render_template(template, context)
            .context("Failed to render prompt template")
    }

    /// Validate template syntax without rendering
    pub fn validate_template(&self, template: &str) -> Result<()> {
        handlebars::template::Template::compile(template)
            .map(|_| ())
            .context("Invalid Handlebars template syntax")
    }
}

impl Default for PromptTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_templates_register() {
        let engine = PromptTemplateEngine::with_builtin_templates().unwrap();
        for (name, _) in BUILTIN_TEMPLATES {
            assert!(engine.has_template(name), "missing {}", name);
        }
    }

    #[test]
    fn test_listing_offer_vs_request() {
        let engine = PromptTemplateEngine::with_builtin_templates().unwrap();

        let offer = PromptContext::new().field("title", "Guitar lessons").field("is_offer", true);
        let text = engine.render("listing", &offer).unwrap();
        assert!(text.contains("**Title:** \"Guitar lessons\""));
        assert!(text.contains("an OFFER"));
        assert!(!text.contains("## EXISTING DRAFT"));

        let request = PromptContext::new().field("title", "Help moving").field("is_offer", false);
        let text = engine.render("listing", &request).unwrap();
        assert!(text.contains("a REQUEST"));
    }

    #[test]
    fn test_section_templates_render_only_the_chosen_section() {
        let engine = PromptTemplateEngine::with_builtin_templates().unwrap();
        let ctx = PromptContext::new()
            .field("variant", "subject_ab")
            .field("subject", "Spring swap day")
            .field("platform_name", "Riverside TimeBank");
        let text = engine.render("newsletter", &ctx).unwrap();
        assert!(text.contains("**Original Subject (A):** Spring swap day"));
        assert!(!text.contains("Newsletter Body Content"));

        let ctx = PromptContext::new().field("variant", "faq");
        let text = engine.render("page", &ctx).unwrap();
        assert!(text.contains("Frequently Asked Questions"));
        assert!(!text.contains("Hero Section"));
    }

    #[test]
    fn test_newsletter_system_keeps_merge_tag() {
        let engine = PromptTemplateEngine::with_builtin_templates().unwrap();
        let ctx = PromptContext::new()
            .field("platform_name", "Riverside TimeBank")
            .field("first_name_tag", "{{first_name}}");
        let text = engine.render("newsletter_system", &ctx).unwrap();
        assert!(text.contains("newsletter writer for Riverside TimeBank"));
        assert!(text.contains("Use {{first_name}} for recipient personalization"));
    }

    #[test]
    fn test_lists_are_comma_joined() {
        let engine = PromptTemplateEngine::with_builtin_templates().unwrap();
        let ctx = PromptContext::new()
            .field("title", "Repair cafe")
            .field("is_offer", true)
            .field("attributes", vec!["Beginner friendly", "Tools provided"]);
        let text = engine.render("listing", &ctx).unwrap();
        assert!(
            text.contains("**Service Features Selected:** Beginner friendly, Tools provided\n")
        );
    }

    #[test]
    fn test_no_html_escaping() {
        let engine = PromptTemplateEngine::new();
        let ctx = PromptContext::new().field("q", "Tom & Jerry's <b>");
        assert_eq!(engine.render_template("{{q}}", &ctx).unwrap(), "Tom & Jerry's <b>");
    }

    #[test]
    fn test_missing_fields_render_empty() {
        let engine = PromptTemplateEngine::new();
        let ctx = PromptContext::new().optional("tone", Some("   "));
        assert!(ctx.get("tone").is_none());
        assert_eq!(engine.render_template("[{{tone}}]", &ctx).unwrap(), "[]");
    }

    #[test]
    fn test_validate_template() {
        let engine = PromptTemplateEngine::new();
        assert!(engine.validate_template("{{title}}").is_ok());
        assert!(engine.validate_template("{{title").is_err());
    }
}
