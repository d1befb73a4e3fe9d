// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Content Generation Service
//!
//! Drafts listing and event descriptions, message replies and member bios,
//! and for admins newsletter, blog and page copy.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Validate input, render the kind's prompt template and run
//!   it through the fallback chain

use crate::application::ai_service::{AiServiceError, AiServiceFactory};
use crate::application::usage_service::UsageService;
use crate::domain::ai_settings::Feature;
use crate::domain::llm::{ChatMessage, ChatOptions, ProviderKind};
use crate::domain::tenant::{TenantId, UserId};
use crate::infrastructure::prompt_template_engine::{PromptContext, PromptTemplateEngine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

const LISTING_SYSTEM_PROMPT: &str = include_str!("prompts/listing_system.txt");
const EVENT_SYSTEM_PROMPT: &str = include_str!("prompts/event_system.txt");
const MESSAGE_SYSTEM_PROMPT: &str = "You help timebank community members communicate effectively. \
Write natural, friendly messages that sound like they come from a real person, not a bot.";
const BIO_SYSTEM_PROMPT: &str = "You write authentic, friendly bios for community members. \
Keep them genuine and avoid clichés.";
const BLOG_SYSTEM_PROMPT: &str = include_str!("prompts/blog_system.txt");
const PAGE_SYSTEM_PROMPT: &str = include_str!("prompts/page_system.txt");

pub const DEFAULT_PLATFORM_NAME: &str = "NEXUS TimeBank";

/// Mail merge placeholder the newsletter sender fills per recipient
const FIRST_NAME_TAG: &str = "{{first_name}}";

/// Characters of existing copy quoted back to the model
const PREVIEW_CHARS: usize = 500;

// Sections each admin kind can write; the first is used when none is named
const NEWSLETTER_SECTIONS: &[&str] = &["subject", "preview", "content", "subject_ab"];
const BLOG_SECTIONS: &[&str] = &["content", "title", "excerpt", "seo", "improve"];
const PAGE_SECTIONS: &[&str] = &[
    "section",
    "hero",
    "cta",
    "features",
    "testimonials",
    "faq",
    "text",
    "seo",
    "full",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Listing,
    Event,
    Message,
    Bio,
    Newsletter,
    Blog,
    Page,
}

enum SystemPrompt {
    Fixed(&'static str),
    Template(&'static str),
}

impl ContentKind {
    pub const ALL: [ContentKind; 7] = [
        ContentKind::Listing,
        ContentKind::Event,
        ContentKind::Message,
        ContentKind::Bio,
        ContentKind::Newsletter,
        ContentKind::Blog,
        ContentKind::Page,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Listing => "listing",
            ContentKind::Event => "event",
            ContentKind::Message => "message",
            ContentKind::Bio => "bio",
            ContentKind::Newsletter => "newsletter",
            ContentKind::Blog => "blog",
            ContentKind::Page => "page",
        }
    }

    /// Newsletter, blog and page copy is written from the admin console only
    pub fn requires_admin(&self) -> bool {
        matches!(self, ContentKind::Newsletter | ContentKind::Blog | ContentKind::Page)
    }

    /// Sections this kind can produce, default first. Empty for member kinds.
    pub fn sections(&self) -> &'static [&'static str] {
        match self {
            ContentKind::Newsletter => NEWSLETTER_SECTIONS,
            ContentKind::Blog => BLOG_SECTIONS,
            ContentKind::Page => PAGE_SECTIONS,
            _ => &[],
        }
    }

    fn system_prompt(&self) -> SystemPrompt {
        match self {
            ContentKind::Listing => SystemPrompt::Fixed(LISTING_SYSTEM_PROMPT),
            ContentKind::Event => SystemPrompt::Fixed(EVENT_SYSTEM_PROMPT),
            ContentKind::Message => SystemPrompt::Fixed(MESSAGE_SYSTEM_PROMPT),
            ContentKind::Bio => SystemPrompt::Fixed(BIO_SYSTEM_PROMPT),
            ContentKind::Newsletter => SystemPrompt::Template("newsletter_system"),
            ContentKind::Blog => SystemPrompt::Fixed(BLOG_SYSTEM_PROMPT),
            ContentKind::Page => SystemPrompt::Fixed(PAGE_SYSTEM_PROMPT),
        }
    }

    /// (temperature, max_tokens). Long-form sections get a larger budget.
    pub fn sampling(&self, section: Option<&str>) -> (f32, u32) {
        match (self, section) {
            (ContentKind::Listing | ContentKind::Event, _) => (0.7, 800),
            (ContentKind::Message, _) => (0.8, 300),
            (ContentKind::Bio, _) => (0.7, 250),
            (ContentKind::Newsletter, Some("content")) => (0.7, 2000),
            (ContentKind::Newsletter, _) => (0.7, 500),
            (ContentKind::Blog, Some("content" | "improve")) => (0.7, 3000),
            (ContentKind::Blog, _) => (0.7, 500),
            (ContentKind::Page, Some("full")) => (0.7, 3000),
            (ContentKind::Page, _) => (0.7, 1000),
        }
    }

    fn usage_action(&self) -> String {
        format!("generate_{}", self.as_str())
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = AiServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AiServiceError::InvalidInput(format!("Unknown content type: {}", s)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingSummary {
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Input for any content kind; each kind reads the fields it needs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentRequest {
    #[serde(default)]
    pub title: Option<String>,

    /// "offer" or "request" for listings; the section to write for
    /// newsletter, blog and page
    #[serde(rename = "type", default)]
    pub variant: Option<String>,

    #[serde(default)]
    pub user_prompt: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub sdg_goals: Vec<String>,

    /// Background on the author or host
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub existing_description: Option<String>,

    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub group_name: Option<String>,

    #[serde(default)]
    pub original_message: Option<String>,
    #[serde(default)]
    pub listing_title: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,

    #[serde(default)]
    pub existing_bio: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub listings: Vec<ListingSummary>,

    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    /// Newsletter template the copy is written for ("welcome", "digest", ...)
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub existing_content: Option<String>,
    #[serde(default, alias = "prompt")]
    pub purpose: Option<String>,
    #[serde(default)]
    pub platform_name: Option<String>,
    /// Real community activity summarised by the caller, quoted verbatim
    #[serde(default)]
    pub platform_data: Option<String>,

    #[serde(default)]
    pub provider: Option<ProviderKind>,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(value: Option<&'a str>, message: &str) -> Result<&'a str, AiServiceError> {
    present(value).ok_or_else(|| AiServiceError::InvalidInput(message.to_string()))
}

/// Plain text of an HTML fragment, whitespace collapsed and cut to `max_chars`
fn text_preview(html: &str, max_chars: usize) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_chars)
        .collect()
}

fn template_focus(template: &str) -> &'static str {
    match template {
        "welcome" => "Welcome new members and explain how to post a first listing.",
        "digest" | "weekly_digest" | "monthly_digest" => {
            "Summarise recent activity: new listings, upcoming events and milestones."
        }
        "event" | "event_promo" => "Promote the upcoming events in the data and how to join.",
        "announcement" => "Lead with the announcement, then explain what it means for members.",
        _ => "Keep the structure simple and focused on the topic.",
    }
}

impl ContentRequest {
    /// The section an admin kind writes, validated against the kind.
    /// `None` for member kinds.
    pub fn section(&self, kind: ContentKind) -> Result<Option<&'static str>, AiServiceError> {
        let sections = kind.sections();
        let Some(default) = sections.first() else {
            return Ok(None);
        };
        match present(self.variant.as_deref()) {
            None => Ok(Some(*default)),
            Some(wanted) => sections
                .iter()
                .find(|s| s.eq_ignore_ascii_case(wanted))
                .map(|s| Some(*s))
                .ok_or_else(|| {
                    AiServiceError::InvalidInput(format!("Unknown {} type: {}", kind, wanted))
                }),
        }
    }

    /// Template fields for a kind, after checking its required input
    pub fn prompt_context(&self, kind: ContentKind) -> Result<PromptContext, AiServiceError> {
        let ctx = PromptContext::new();
        let section = self.section(kind)?;
        let ctx = match section {
            Some(section) => ctx.field("variant", section),
            None => ctx,
        };
        let preview = self
            .existing_content
            .as_deref()
            .map(|c| text_preview(c, PREVIEW_CHARS));
        Ok(match kind {
            ContentKind::Listing => {
                let title = required(self.title.as_deref(), "Title is required")?;
                let is_offer = !self
                    .variant
                    .as_deref()
                    .is_some_and(|t| t.trim().eq_ignore_ascii_case("request"));
                ctx.field("title", title)
                    .field("is_offer", is_offer)
                    .optional("user_prompt", self.user_prompt.as_deref())
                    .optional("category", self.category.as_deref())
                    .field("attributes", &self.attributes)
                    .field("sdg_goals", &self.sdg_goals)
                    .optional("about", self.about.as_deref())
                    .optional("existing_description", self.existing_description.as_deref())
            }
            ContentKind::Event => {
                let title = required(self.title.as_deref(), "Title is required")?;
                ctx.field("title", title)
                    .optional("category", self.category.as_deref())
                    .optional("location", self.location.as_deref())
                    .optional("start_time", self.start_time.as_deref())
                    .optional("end_time", self.end_time.as_deref())
                    .optional("group_name", self.group_name.as_deref())
                    .field("sdg_goals", &self.sdg_goals)
                    .optional("about", self.about.as_deref())
                    .optional("existing_description", self.existing_description.as_deref())
            }
            ContentKind::Message => {
                let original =
                    required(self.original_message.as_deref(), "Original message is required")?;
                let tone = self
                    .tone
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .unwrap_or("friendly");
                ctx.field("original_message", original)
                    .field("tone", tone)
                    .optional("listing_title", self.listing_title.as_deref())
            }
            ContentKind::Bio => ctx
                .optional("existing_bio", self.existing_bio.as_deref())
                .field("interests", &self.interests)
                .field("skills", &self.skills)
                .field("listings", self.listings.iter().take(5).collect::<Vec<_>>()),
            ContentKind::Newsletter => {
                if section == Some("subject_ab") {
                    required(self.subject.as_deref(), "Original subject is required")?;
                }
                let template = present(self.template.as_deref());
                ctx.field(
                    "platform_name",
                    present(self.platform_name.as_deref()).unwrap_or(DEFAULT_PLATFORM_NAME),
                )
                .field("first_name_tag", FIRST_NAME_TAG)
                .field(
                    "audience",
                    present(self.audience.as_deref()).unwrap_or("community members"),
                )
                .field(
                    "tone",
                    present(self.tone.as_deref()).unwrap_or("friendly and engaging"),
                )
                .optional("platform_data", self.platform_data.as_deref())
                .optional("user_prompt", self.user_prompt.as_deref())
                .optional("topic", self.topic.as_deref())
                .optional("subject", self.subject.as_deref())
                .optional("existing_content", self.existing_content.as_deref())
                .optional("template_name", template.map(str::to_uppercase).as_deref())
                .optional("template_focus", template.map(template_focus))
            }
            ContentKind::Blog => {
                if section == Some("improve") {
                    required(self.existing_content.as_deref(), "Existing content is required")?;
                }
                ctx.optional("title", self.title.as_deref())
                    .optional("topic", self.topic.as_deref())
                    .optional("category", self.category.as_deref())
                    .optional("keywords", self.keywords.as_deref())
                    .optional("content_preview", preview.as_deref())
                    .optional("existing_content", self.existing_content.as_deref())
            }
            ContentKind::Page => {
                let purpose = present(self.purpose.as_deref()).or(self.user_prompt.as_deref());
                ctx.optional("title", self.title.as_deref())
                    .optional("purpose", purpose)
                    .optional("content_preview", preview.as_deref())
            }
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedContent {
    pub kind: ContentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<&'static str>,
    pub content: String,
    pub provider: ProviderKind,
    pub model: String,
    pub used_fallback: bool,
    pub tokens_used: u32,
}

pub struct ContentService {
    ai: Arc<AiServiceFactory>,
    usage: Arc<UsageService>,
    templates: PromptTemplateEngine,
}

impl ContentService {
    pub fn new(ai: Arc<AiServiceFactory>, usage: Arc<UsageService>) -> anyhow::Result<Self> {
        Ok(Self {
            ai,
            usage,
            templates: PromptTemplateEngine::with_builtin_templates()?,
        })
    }

    /// The system and user messages sent for a request
    pub fn build_messages(
        &self,
        kind: ContentKind,
        request: &ContentRequest,
    ) -> Result<Vec<ChatMessage>, AiServiceError> {
        let context = request.prompt_context(kind)?;
        let system = match kind.system_prompt() {
            SystemPrompt::Fixed(text) => text.to_string(),
            SystemPrompt::Template(name) => self.render(name, &context)?,
        };
        let prompt = self.render(kind.as_str(), &context)?;
        Ok(vec![ChatMessage::system(system), ChatMessage::user(prompt)])
    }

    fn render(&self, name: &str, context: &PromptContext) -> Result<String, AiServiceError> {
        self.templates
            .render(name, context)
            .map(|text| text.trim().to_string())
            .map_err(|e| AiServiceError::Template(format!("{:#}", e)))
    }

    /// Draft content of `kind`. Admin kinds are refused unless `is_admin`.
    pub async fn generate(
        &self,
        tenant: TenantId,
        user: UserId,
        is_admin: bool,
        kind: ContentKind,
        request: ContentRequest,
    ) -> Result<GeneratedContent, AiServiceError> {
        if kind.requires_admin() && !is_admin {
            warn!("User {} in tenant {} denied {} generation", user, tenant, kind);
            return Err(AiServiceError::Forbidden("Admin access required".into()));
        }
        let resolved = self.ai.resolve(tenant).await?;
        if !resolved.is_feature_enabled(Feature::ContentGeneration) {
            return Err(AiServiceError::FeatureDisabled(Feature::ContentGeneration));
        }
        self.usage.ensure_allowed(tenant, user, &resolved).await?;

        let section = request.section(kind)?;
        let messages = self.build_messages(kind, &request)?;
        let (temperature, max_tokens) = kind.sampling(section);
        let options = ChatOptions::with_limits(temperature, max_tokens);

        info!("Generating {} for user {} in tenant {}", kind, user, tenant);
        let result = self
            .ai
            .run_chain(&resolved, &messages, &options, request.provider)
            .await?;
        let response = result.response;

        let pricing = resolved.provider(response.provider).pricing;
        if let Err(e) = self
            .usage
            .record(tenant, user, response.provider, &kind.usage_action(), response.usage, pricing)
            .await
        {
            warn!("Failed to record {} usage: {}", kind, e);
        }

        Ok(GeneratedContent {
            kind,
            section,
            content: response.content.trim().to_string(),
            provider: response.provider,
            model: response.model,
            used_fallback: result.used_fallback,
            tokens_used: response.usage.total_tokens,
        })
    }
}
