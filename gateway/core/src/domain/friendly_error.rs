// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

//! User-facing wording for provider failures. Raw vendor errors stay in the
//! logs; members only ever see one of these sentences.

use crate::domain::llm::LLMError;

pub const RATE_LIMITED: &str =
    "I'm getting a lot of requests right now. Please wait a moment and try again.";
pub const CONFIGURATION: &str =
    "There's a configuration issue with the AI service. Please contact an administrator.";
pub const MODEL_UNAVAILABLE: &str =
    "The AI model is temporarily unavailable. Please try again later.";
pub const CONNECTION: &str =
    "I couldn't connect to the AI service. Please check your internet connection and try again.";
pub const CONTENT_FILTER: &str =
    "I couldn't process that request. Please try rephrasing your message.";
pub const TOO_LONG: &str = "Your message is too long. Please try a shorter message.";
pub const SERVER_DOWN: &str =
    "The AI service is temporarily down. Please try again in a few minutes.";
pub const GENERIC: &str =
    "Something went wrong. Please try again. If the problem persists, contact support.";

pub fn friendly_message(err: &LLMError) -> &'static str {
    match err {
        LLMError::RateLimit => RATE_LIMITED,
        LLMError::Authentication(_) | LLMError::NotConfigured(_) => CONFIGURATION,
        LLMError::ModelNotFound(_) => MODEL_UNAVAILABLE,
        LLMError::Network(_) | LLMError::Timeout => CONNECTION,
        LLMError::ContentFilter(_) => CONTENT_FILTER,
        LLMError::Server { .. } => SERVER_DOWN,
        LLMError::InvalidInput(msg) | LLMError::Provider(msg) => classify_text(msg),
    }
}

// Vendors report some conditions only in the body text.
fn classify_text(message: &str) -> &'static str {
    let lower = message.to_lowercase();

    if lower.contains("429") || lower.contains("quota") || lower.contains("rate") {
        RATE_LIMITED
    } else if lower.contains("api key") || lower.contains("unauthorized") || lower.contains("401") {
        CONFIGURATION
    } else if lower.contains("not found") && lower.contains("model") {
        MODEL_UNAVAILABLE
    } else if lower.contains("connection") || lower.contains("timeout") {
        CONNECTION
    } else if lower.contains("safety") || lower.contains("blocked") || lower.contains("filter") {
        CONTENT_FILTER
    } else if lower.contains("token") || lower.contains("length") || lower.contains("too long") {
        TOO_LONG
    } else if lower.contains("500") || lower.contains("502") || lower.contains("503") {
        SERVER_DOWN
    } else {
        GENERIC
    }
}
