// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! HTTP API
//!
//! axum router for the member-facing AI endpoints and the tenant admin
//! settings page. The platform's auth layer sits in front of this service
//! and passes the caller's identity in `X-Tenant-Id` and `X-User-Id`, and
//! their role in `X-User-Role`. Admin routes require an admin role.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::application::ai_service::{AiServiceError, AiServiceFactory, ProviderTestResult};
use crate::application::chat::{ChatRequest, ChatService};
use crate::application::content::{ContentKind, ContentRequest, ContentService};
use crate::application::conversations::ConversationService;
use crate::application::settings_admin::SettingsAdminService;
use crate::application::usage_service::UsageService;
use crate::domain::conversation::{ConversationId, NewConversation};
use crate::domain::friendly_error::{friendly_message, GENERIC};
use crate::domain::llm::{LLMError, ProviderKind};
use crate::domain::tenant::{TenantId, UserId};

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";

/// Roles allowed on the admin routes and admin content kinds
const ADMIN_ROLES: [&str; 3] = ["admin", "tenant_admin", "super_admin"];

pub struct AppState {
    pub ai: Arc<AiServiceFactory>,
    pub usage: Arc<UsageService>,
    pub chat: Arc<ChatService>,
    pub conversations: Arc<ConversationService>,
    pub content: Arc<ContentService>,
    pub admin: Arc<SettingsAdminService>,
    pub start_time: Instant,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/ai/chat", post(chat_handler))
        .route("/api/ai/chat/stream", post(stream_chat_handler))
        .route(
            "/api/ai/conversations",
            get(list_conversations_handler).post(create_conversation_handler),
        )
        .route(
            "/api/ai/conversations/{id}",
            get(get_conversation_handler).delete(delete_conversation_handler),
        )
        .route("/api/ai/providers", get(providers_handler))
        .route("/api/ai/limits", get(limits_handler))
        .route("/api/ai/test-provider", post(test_provider_handler))
        .route("/api/ai/generate/{kind}", post(generate_handler))
        .route(
            "/api/admin/ai-settings",
            get(get_settings_handler).put(update_settings_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<AiServiceError> for ApiError {
    fn from(err: AiServiceError) -> Self {
        match err {
            AiServiceError::Disabled | AiServiceError::FeatureDisabled(_) => {
                ApiError::new(StatusCode::FORBIDDEN, err.to_string())
            }
            AiServiceError::LimitExceeded(check) => ApiError {
                status: StatusCode::TOO_MANY_REQUESTS,
                body: json!({
                    "error": "Usage limit reached",
                    "reason": check.reason,
                    "limits": check,
                }),
            },
            AiServiceError::InvalidInput(message) => {
                ApiError::new(StatusCode::BAD_REQUEST, message)
            }
            AiServiceError::NotFound(message) => ApiError::new(StatusCode::NOT_FOUND, message),
            AiServiceError::Forbidden(message) => ApiError::new(StatusCode::FORBIDDEN, message),
            AiServiceError::Provider(e) => {
                error!("AI provider error: {}", e);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, friendly_message(&e))
            }
            other => {
                error!("AI service error: {}", other);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, GENERIC)
            }
        }
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Caller identity forwarded by the platform
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub tenant: TenantId,
    pub user: UserId,
    pub is_admin: bool,
}

/// An [`Identity`] whose role allows tenant administration
#[derive(Debug, Clone, Copy)]
pub struct AdminIdentity(pub Identity);

fn header_id(parts: &Parts, name: &str) -> Option<i64> {
    parts
        .headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match (header_id(parts, TENANT_HEADER), header_id(parts, USER_HEADER)) {
            (Some(tenant), Some(user)) => Ok(Identity {
                tenant: TenantId(tenant),
                user: UserId(user),
                is_admin: header_role(parts).is_some_and(|role| {
                    ADMIN_ROLES.iter().any(|admin| admin.eq_ignore_ascii_case(role))
                }),
            }),
            _ => Err(ApiError::new(StatusCode::UNAUTHORIZED, "Authentication required")),
        }
    }
}

fn header_role(parts: &Parts) -> Option<&str> {
    parts.headers.get(ROLE_HEADER)?.to_str().ok().map(str::trim)
}

impl<S: Send + Sync> FromRequestParts<S> for AdminIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = Identity::from_request_parts(parts, state).await?;
        if !identity.is_admin {
            warn!(
                "User {} in tenant {} refused admin route {}",
                identity.user,
                identity.tenant,
                parts.uri.path()
            );
            return Err(ApiError::new(StatusCode::FORBIDDEN, "Admin access required"));
        }
        Ok(AdminIdentity(identity))
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let reply = state.chat.chat(identity.tenant, identity.user, request).await?;
    Ok(Json(json!({
        "success": true,
        "conversation_id": reply.conversation_id,
        "message": {
            "id": reply.message_id,
            "role": "assistant",
            "content": reply.content,
        },
        "provider": reply.provider,
        "model": reply.model,
        "used_fallback": reply.used_fallback,
        "tokens_used": reply.tokens_used,
        "limits": reply.limits,
    })))
}

fn sse_event(value: Value) -> Result<Event, Infallible> {
    Ok(Event::default().data(value.to_string()))
}

async fn stream_chat_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(request): Json<ChatRequest>,
) -> Response {
    let start = match state.chat.stream(identity.tenant, identity.user, request).await {
        Ok(start) => start,
        Err(AiServiceError::Provider(e)) => {
            warn!("Stream for user {} failed to start: {}", identity.user, e);
            let message = match &e {
                LLMError::NotConfigured(msg) => msg.clone(),
                other => friendly_message(other).to_string(),
            };
            let events = stream::once(async move { sse_event(json!({ "error": message })) });
            return Sse::new(events).into_response();
        }
        Err(e) => return ApiError::from(e).into_response(),
    };

    let conversation_id = start.conversation_id;
    let provider = start.provider;
    let model = start.model;
    let chunks = start
        .stream
        .scan(false, move |failed, item| {
            let out = if *failed {
                None
            } else {
                match item {
                    Ok(chunk) if chunk.content.is_empty() => Some(None),
                    Ok(chunk) => Some(Some(json!({ "content": chunk.content, "done": false }))),
                    Err(e) => {
                        *failed = true;
                        warn!("Stream from {} failed: {}", provider, e);
                        Some(Some(json!({ "error": friendly_message(&e) })))
                    }
                }
            };
            futures::future::ready(out)
        })
        .filter_map(futures::future::ready);

    let finished = stream::once(async move {
        json!({
            "done": true,
            "conversation_id": conversation_id,
            "provider": provider,
            "model": model,
        })
    });

    // After an error event the closing event is still sent so clients stop reading
    let events = chunks.chain(finished).map(sse_event);
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

#[derive(Debug, Deserialize)]
struct PageParams {
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn list_conversations_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(page): Query<PageParams>,
) -> Result<Json<Value>, ApiError> {
    let page = state
        .conversations
        .list(identity.tenant, identity.user, page.limit, page.offset)
        .await?;
    Ok(Json(json!({
        "success": true,
        "data": page.conversations,
        "meta": { "total": page.total, "limit": page.limit, "offset": page.offset },
    })))
}

async fn create_conversation_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    body: Option<Json<NewConversation>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let new = body.map(|Json(b)| b).unwrap_or_default();
    let conversation = state
        .conversations
        .create(identity.tenant, identity.user, &new)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "conversation_id": conversation.id })),
    ))
}

async fn get_conversation_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let detail = state
        .conversations
        .get(identity.tenant, identity.user, ConversationId(id))
        .await?;
    Ok(Json(json!({ "success": true, "data": detail })))
}

async fn delete_conversation_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state
        .conversations
        .delete(identity.tenant, identity.user, ConversationId(id))
        .await?;
    Ok(Json(json!({ "success": true })))
}

async fn providers_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Value>, ApiError> {
    let resolved = state.ai.resolve(identity.tenant).await?;
    let providers = state.ai.available_providers(identity.tenant).await?;
    Ok(Json(json!({
        "success": true,
        "enabled": resolved.enabled,
        "default": resolved.default_provider,
        "welcome_message": resolved.welcome_message,
        "providers": providers,
    })))
}

async fn limits_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Value>, ApiError> {
    let resolved = state.ai.resolve(identity.tenant).await?;
    let check = state
        .usage
        .check(identity.tenant, identity.user, resolved.limits)
        .await
        .map_err(AiServiceError::from)?;
    Ok(Json(json!({ "success": true, "limits": check })))
}

#[derive(Debug, Deserialize)]
struct TestProviderRequest {
    provider: ProviderKind,
}

async fn test_provider_handler(
    State(state): State<Arc<AppState>>,
    AdminIdentity(identity): AdminIdentity,
    Json(request): Json<TestProviderRequest>,
) -> Result<Json<ProviderTestResult>, ApiError> {
    let result = state.ai.test_provider(identity.tenant, request.provider).await?;
    Ok(Json(result))
}

async fn generate_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(kind): Path<String>,
    Json(request): Json<ContentRequest>,
) -> Result<Json<Value>, ApiError> {
    let kind: ContentKind = kind.parse()?;
    let generated = state
        .content
        .generate(identity.tenant, identity.user, identity.is_admin, kind, request)
        .await?;
    Ok(Json(json!({
        "success": true,
        "type": generated.kind,
        "section": generated.section,
        "content": generated.content,
        "provider": generated.provider,
        "model": generated.model,
        "used_fallback": generated.used_fallback,
        "tokens_used": generated.tokens_used,
    })))
}

async fn get_settings_handler(
    State(state): State<Arc<AppState>>,
    AdminIdentity(identity): AdminIdentity,
) -> Result<Json<Value>, ApiError> {
    let settings = state.admin.masked(identity.tenant).await?;
    Ok(Json(json!({ "success": true, "settings": settings })))
}

/// Form values arrive as strings, booleans or numbers
fn setting_string(value: Value) -> String {
    match value {
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

async fn update_settings_handler(
    State(state): State<Arc<AppState>>,
    AdminIdentity(identity): AdminIdentity,
    Json(body): Json<BTreeMap<String, Value>>,
) -> Result<Json<Value>, ApiError> {
    let updates = body
        .into_iter()
        .map(|(k, v)| (k, setting_string(v)))
        .collect();
    let updated = state.admin.update(identity.tenant, updates).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}
