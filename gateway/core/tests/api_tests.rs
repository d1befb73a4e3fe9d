// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use nexus_ai_core::application::ai_service::AiServiceFactory;
use nexus_ai_core::application::chat::ChatService;
use nexus_ai_core::application::content::ContentService;
use nexus_ai_core::application::conversations::ConversationService;
use nexus_ai_core::application::settings_admin::SettingsAdminService;
use nexus_ai_core::application::usage_service::UsageService;
use nexus_ai_core::domain::ai_settings::AiSettings;
use nexus_ai_core::domain::gateway_config::GatewayConfig;
use nexus_ai_core::domain::llm::{
    AIProvider, ChatMessage, ChatOptions, ChatResponse, FinishReason, LLMError, ProviderKind,
    TokenUsage,
};
use nexus_ai_core::domain::repository::AiSettingsRepository;
use nexus_ai_core::domain::tenant::TenantId;
use nexus_ai_core::infrastructure::llm::{ProviderFactory, ProviderSettings};
use nexus_ai_core::infrastructure::repositories::{
    InMemoryAiSettingsRepository, InMemoryConversationRepository, InMemoryUsageRepository,
};
use nexus_ai_core::infrastructure::secret_box::SecretBox;
use nexus_ai_core::presentation::{app, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;

/// Echoes the last user message back, with the number of messages it saw
struct EchoProvider {
    kind: ProviderKind,
    configured: bool,
}

#[async_trait]
impl AIProvider for EchoProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        "echo-1"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        _: &ChatOptions,
    ) -> Result<ChatResponse, LLMError> {
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(ChatResponse {
            content: format!("  echo: {} [seen {}]  ", last, messages.len()),
            usage: TokenUsage::new(12, 8),
            provider: self.kind,
            model: "echo-1".into(),
            finish_reason: FinishReason::Stop,
        })
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        Ok(())
    }
}

struct EchoFactory;

impl ProviderFactory for EchoFactory {
    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn AIProvider>, LLMError> {
        Ok(Arc::new(EchoProvider {
            kind: settings.kind,
            configured: settings.is_configured(),
        }))
    }
}

struct TestApp {
    router: Router,
    usage: Arc<InMemoryUsageRepository>,
}

async fn test_app(stored: &[(&str, &str)]) -> TestApp {
    let settings = Arc::new(InMemoryAiSettingsRepository::new());
    settings
        .save(TenantId(1), &AiSettings::from_pairs(stored.iter().copied()))
        .await
        .unwrap();
    let usage_repo = Arc::new(InMemoryUsageRepository::new());
    let secrets = SecretBox::new(Some("api-test-passphrase"));

    let ai = Arc::new(
        AiServiceFactory::new(
            Arc::new(GatewayConfig::default()),
            settings.clone(),
            secrets.clone(),
            Arc::new(EchoFactory),
        )
        .with_env(|_| None),
    );
    let usage = Arc::new(UsageService::new(usage_repo.clone()));
    let conversations = Arc::new(ConversationService::new(Arc::new(
        InMemoryConversationRepository::new(),
    )));
    let state = AppState {
        chat: Arc::new(ChatService::new(ai.clone(), usage.clone(), conversations.clone())),
        conversations,
        content: Arc::new(ContentService::new(ai.clone(), usage.clone()).unwrap()),
        admin: Arc::new(SettingsAdminService::new(settings, secrets)),
        ai,
        usage,
        start_time: Instant::now(),
    };
    TestApp {
        router: app(state),
        usage: usage_repo,
    }
}

/// Who the platform says is calling
#[derive(Debug, Clone, Copy)]
enum Caller {
    Anonymous,
    Member(i64),
    WithRole(i64, &'static str),
}

const MEMBER: Caller = Caller::Member(7);
const ADMIN: Caller = Caller::WithRole(1, "admin");

async fn send(
    router: &Router,
    caller: Caller,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    match caller {
        Caller::Anonymous => {}
        Caller::Member(user) => {
            builder = builder.header("X-Tenant-Id", "1").header("X-User-Id", user.to_string());
        }
        Caller::WithRole(user, role) => {
            builder = builder
                .header("X-Tenant-Id", "1")
                .header("X-User-Id", user.to_string())
                .header("X-User-Role", role);
        }
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn send_as(
    router: &Router,
    caller: Caller,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, bytes) = send(router, caller, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn send_json(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send_as(router, MEMBER, method, uri, body).await
}

fn sse_events(bytes: Vec<u8>) -> Vec<Value> {
    String::from_utf8(bytes)
        .unwrap()
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

const OLLAMA_DEFAULT: [(&str, &str); 1] = [("ai_provider", "ollama")];

#[tokio::test]
async fn test_health() {
    let app = test_app(&[]).await;
    let (status, bytes) = send(&app.router, Caller::Anonymous, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let app = test_app(&OLLAMA_DEFAULT).await;
    let (status, _) = send(
        &app.router,
        Caller::Anonymous,
        Method::POST,
        "/api/ai/chat",
        Some(json!({ "message": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_chat_answers_and_records_usage() {
    let app = test_app(&OLLAMA_DEFAULT).await;
    let (status, body) = send_json(
        &app.router,
        Method::POST,
        "/api/ai/chat",
        Some(json!({ "message": "How do I earn credits?", "history": [] })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["conversation_id"].as_i64().is_some());
    assert!(body["message"]["id"].as_i64().is_some());
    assert_eq!(body["message"]["role"], "assistant");
    assert!(body["message"]["content"].as_str().unwrap().contains("How do I earn credits?"));
    assert_eq!(body["provider"], "ollama");
    assert_eq!(body["used_fallback"], false);
    assert_eq!(body["tokens_used"], 20);
    assert_eq!(body["limits"]["daily_remaining"], 49);

    let records = app.usage.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, "chat");
}

#[tokio::test]
async fn test_chat_continues_stored_conversation() {
    let app = test_app(&OLLAMA_DEFAULT).await;
    let (_, first) = send_json(
        &app.router,
        Method::POST,
        "/api/ai/chat",
        Some(json!({ "message": "  How do I   earn credits?  " })),
    )
    .await;
    let id = first["conversation_id"].as_i64().unwrap();

    let (status, second) = send_json(
        &app.router,
        Method::POST,
        "/api/ai/chat",
        Some(json!({ "message": "And spend them?", "conversation_id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["conversation_id"], id);

    // The stored question and answer are replayed ahead of the new turn
    let seen = |body: &Value| -> usize {
        let content = body["message"]["content"].as_str().unwrap();
        let count = content.rsplit("[seen ").next().unwrap().trim_end_matches(']');
        count.parse().unwrap()
    };
    assert_eq!(seen(&second), seen(&first) + 2);

    let (status, detail) =
        send_json(&app.router, Method::GET, &format!("/api/ai/conversations/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["data"]["title"], "How do I earn credits?");
    assert_eq!(detail["data"]["provider"], "ollama");
    let messages = detail["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[3]["role"], "assistant");
}

#[tokio::test]
async fn test_chat_in_another_members_conversation_is_not_found() {
    let app = test_app(&OLLAMA_DEFAULT).await;
    let (_, created) = send_json(&app.router, Method::POST, "/api/ai/conversations", None).await;
    let id = created["conversation_id"].as_i64().unwrap();

    let (status, body) = send_as(
        &app.router,
        Caller::Member(8),
        Method::POST,
        "/api/ai/chat",
        Some(json!({ "message": "hello", "conversation_id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Conversation not found");
    assert!(app.usage.records().is_empty());
}

#[tokio::test]
async fn test_conversation_routes() {
    let app = test_app(&OLLAMA_DEFAULT).await;
    let (status, created) = send_json(
        &app.router,
        Method::POST,
        "/api/ai/conversations",
        Some(json!({ "title": "Garden plans", "context_type": "listing", "context_id": 42 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["conversation_id"].as_i64().unwrap();
    send_json(&app.router, Method::POST, "/api/ai/conversations", None).await;

    let (status, list) = send_json(&app.router, Method::GET, "/api/ai/conversations", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["meta"]["total"], 2);
    assert_eq!(list["data"].as_array().unwrap().len(), 2);

    let (_, page) =
        send_json(&app.router, Method::GET, "/api/ai/conversations?limit=1&offset=1", None).await;
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
    assert_eq!(page["meta"]["limit"], 1);

    let (_, others) = send_as(
        &app.router,
        Caller::Member(8),
        Method::GET,
        "/api/ai/conversations",
        None,
    )
    .await;
    assert_eq!(others["meta"]["total"], 0);

    let uri = format!("/api/ai/conversations/{}", id);
    let (status, detail) = send_json(&app.router, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["data"]["title"], "Garden plans");
    assert_eq!(detail["data"]["context_type"], "listing");
    assert_eq!(detail["data"]["messages"], json!([]));

    let (status, _) = send_as(&app.router, Caller::Member(8), Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_as(&app.router, Caller::Member(8), Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send_json(&app.router, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let (status, _) = send_json(&app.router, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blank_message_is_bad_request() {
    let app = test_app(&OLLAMA_DEFAULT).await;
    let (status, body) = send_json(
        &app.router,
        Method::POST,
        "/api/ai/chat",
        Some(json!({ "message": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Message is required");
}

#[tokio::test]
async fn test_disabled_tenant_is_forbidden() {
    let app = test_app(&[("ai_enabled", "0")]).await;
    let (status, _) = send_json(
        &app.router,
        Method::POST,
        "/api/ai/chat",
        Some(json!({ "message": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_daily_limit_returns_429() {
    let app = test_app(&[("ai_provider", "ollama"), ("default_daily_limit", "1")]).await;
    let chat = |message: &str| Some(json!({ "message": message }));
    let (first, _) = send_json(&app.router, Method::POST, "/api/ai/chat", chat("one")).await;
    assert_eq!(first, StatusCode::OK);

    let (second, body) = send_json(&app.router, Method::POST, "/api/ai/chat", chat("two")).await;
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["reason"], "Daily limit reached");
    assert_eq!(body["limits"]["daily_remaining"], 0);
    assert_eq!(app.usage.records().len(), 1);
}

#[tokio::test]
async fn test_stream_emits_chunks_then_done() {
    let app = test_app(&OLLAMA_DEFAULT).await;
    let (status, bytes) = send(
        &app.router,
        MEMBER,
        Method::POST,
        "/api/ai/chat/stream",
        Some(json!({ "message": "stream please" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let events = sse_events(bytes);
    assert_eq!(events.len(), 2);
    assert!(events[0]["content"].as_str().unwrap().contains("stream please"));
    assert_eq!(events[1]["done"], true);
    assert_eq!(events[1]["provider"], "ollama");
    assert_eq!(app.usage.records()[0].action, "chat_stream");

    // The streamed reply is stored once the stream completes
    let id = events[1]["conversation_id"].as_i64().unwrap();
    let (_, detail) =
        send_json(&app.router, Method::GET, &format!("/api/ai/conversations/{}", id), None).await;
    let messages = detail["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages[1]["content"].as_str().unwrap().contains("stream please"));
    assert_eq!(detail["data"]["title"], "stream please");
}

#[tokio::test]
async fn test_stream_with_unconfigured_provider_sends_error_event() {
    let app = test_app(&[("ai_provider", "openai")]).await;
    let (status, bytes) = send(
        &app.router,
        MEMBER,
        Method::POST,
        "/api/ai/chat/stream",
        Some(json!({ "message": "hello" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains(
        "AI provider is not configured. Please configure API keys in Admin > AI Settings."
    ));
    assert!(!text.contains("\"done\":true"));
    assert!(app.usage.records().is_empty());

    let (_, list) = send_json(&app.router, Method::GET, "/api/ai/conversations", None).await;
    assert_eq!(list["meta"]["total"], 0);
}

#[tokio::test]
async fn test_providers_lists_every_kind() {
    let app =
        test_app(&[("ai_provider", "ollama"), ("openai_api_key", "sk-plain-test-key")]).await;
    let (status, body) = send_json(&app.router, Method::GET, "/api/ai/providers", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["default"], "ollama");
    let providers = body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 4);
    let openai = providers.iter().find(|p| p["id"] == "openai").unwrap();
    assert_eq!(openai["configured"], true);
    let anthropic = providers.iter().find(|p| p["id"] == "anthropic").unwrap();
    assert_eq!(anthropic["configured"], false);
}

#[tokio::test]
async fn test_generate_listing() {
    let app = test_app(&OLLAMA_DEFAULT).await;
    let (status, body) = send_json(
        &app.router,
        Method::POST,
        "/api/ai/generate/listing",
        Some(json!({ "title": "Garden help", "type": "offer", "category": "Gardening" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let content = body["content"].as_str().unwrap();
    assert!(content.starts_with("echo:"));
    assert!(content.contains("Garden help"));
    assert_eq!(app.usage.records()[0].action, "generate_listing");
}

#[tokio::test]
async fn test_generate_rejects_unknown_kind_and_missing_title() {
    let app = test_app(&OLLAMA_DEFAULT).await;
    let (status, _) =
        send_json(&app.router, Method::POST, "/api/ai/generate/poem", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) =
        send_json(&app.router, Method::POST, "/api/ai/generate/event", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Title is required");
}

#[tokio::test]
async fn test_admin_content_kinds_require_admin_role() {
    let app = test_app(&OLLAMA_DEFAULT).await;
    for kind in ["newsletter", "blog", "page"] {
        let uri = format!("/api/ai/generate/{}", kind);
        let (status, body) = send_json(&app.router, Method::POST, &uri, Some(json!({}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", kind);
        assert_eq!(body["error"], "Admin access required");
    }
    assert!(app.usage.records().is_empty());
}

#[tokio::test]
async fn test_admin_generates_newsletter_section() {
    let app = test_app(&OLLAMA_DEFAULT).await;
    let (status, body) = send_as(
        &app.router,
        ADMIN,
        Method::POST,
        "/api/ai/generate/newsletter",
        Some(json!({ "type": "content", "topic": "Spring swap day" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "newsletter");
    assert_eq!(body["section"], "content");
    let content = body["content"].as_str().unwrap();
    assert!(content.contains("Newsletter Body Content"));
    assert!(content.contains("Spring swap day"));
    assert_eq!(app.usage.records()[0].action, "generate_newsletter");

    let (status, body) = send_as(
        &app.router,
        ADMIN,
        Method::POST,
        "/api/ai/generate/page",
        Some(json!({ "type": "carousel" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown page type: carousel");
}

#[tokio::test]
async fn test_admin_routes_refuse_members() {
    let app = test_app(&OLLAMA_DEFAULT).await;
    let (status, body) = send_json(
        &app.router,
        Method::PUT,
        "/api/admin/ai-settings",
        Some(json!({ "default_daily_limit": 1000000, "ai_enabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Admin access required");

    let (status, _) = send_json(&app.router, Method::GET, "/api/admin/ai-settings", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send_as(
        &app.router,
        Caller::WithRole(7, "member"),
        Method::POST,
        "/api/ai/test-provider",
        Some(json!({ "provider": "ollama" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The refused update left the limit untouched
    let (status, body) =
        send_as(&app.router, ADMIN, Method::GET, "/api/admin/ai-settings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["settings"]["default_daily_limit"], "1000000");
}

#[tokio::test]
async fn test_admin_roles_reach_admin_routes() {
    let app = test_app(&OLLAMA_DEFAULT).await;
    for role in ["admin", "Tenant_Admin", "super_admin"] {
        let (status, body) = send_as(
            &app.router,
            Caller::WithRole(1, role),
            Method::POST,
            "/api/ai/test-provider",
            Some(json!({ "provider": "ollama" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", role);
        assert_eq!(body["provider"], "ollama");
    }

    let (status, _) = send(
        &app.router,
        Caller::Anonymous,
        Method::GET,
        "/api/admin/ai-settings",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_settings_mask_keys() {
    let app = test_app(&[]).await;
    let (status, body) = send_as(
        &app.router,
        ADMIN,
        Method::PUT,
        "/api/admin/ai-settings",
        Some(json!({
            "gemini_api_key": "AIza-secret-value-9876",
            "ai_enabled": true,
            "default_daily_limit": 25,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 3);

    let (status, body) =
        send_as(&app.router, ADMIN, Method::GET, "/api/admin/ai-settings", None).await;
    assert_eq!(status, StatusCode::OK);
    let key = body["settings"]["gemini_api_key"].as_str().unwrap();
    assert!(key.ends_with("9876"));
    assert!(!key.contains("secret"));
    assert_eq!(body["settings"]["ai_enabled"], "1");
    assert_eq!(body["settings"]["default_daily_limit"], "25");
}

#[tokio::test]
async fn test_admin_rejects_unknown_setting() {
    let app = test_app(&[]).await;
    let (status, _) = send_as(
        &app.router,
        ADMIN,
        Method::PUT,
        "/api/admin/ai-settings",
        Some(json!({ "shell": "rm" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
