use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

use atendo_contract::{AtendoError, SessionRecord, SuggestionRecord};
use atendo_core::current_unix_timestamp_ms;
use atendo_engine::{InboundSuggestionRequest, SuggestionPipeline, DEFAULT_PENDING_LIMIT};
use atendo_session::SessionManager;

pub const HEALTH_ENDPOINT: &str = "/health";
pub const SESSIONS_ENDPOINT: &str = "/sessions";
pub const SESSION_ENDPOINT: &str = "/sessions/{session_id}";
pub const SESSION_SEND_ENDPOINT: &str = "/sessions/{session_id}/send";
pub const SUGGESTIONS_INBOUND_ENDPOINT: &str = "/suggestions/inbound";
pub const SUGGESTION_APPROVE_ENDPOINT: &str = "/suggestions/{suggestion_id}/approve";
pub const SUGGESTION_REJECT_ENDPOINT: &str = "/suggestions/{suggestion_id}/reject";
pub const SUGGESTIONS_PENDING_ENDPOINT: &str = "/suggestions/pending";
pub const ACCOUNT_AUTO_RESPOND_ENDPOINT: &str = "/accounts/{account_id}/auto-respond";

const SERVICE_NAME: &str = "atendo";

#[derive(Clone)]
/// Public struct `GatewayState` used across Atendo components.
pub struct GatewayState {
    pub sessions: Arc<SessionManager>,
    pub pipeline: Arc<SuggestionPipeline>,
}

struct GatewayError(AtendoError);

impl From<AtendoError> for GatewayError {
    fn from(error: AtendoError) -> Self {
        Self(error)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AtendoError::Validation(_) => StatusCode::BAD_REQUEST,
            AtendoError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AtendoError::NotFound(_) => StatusCode::NOT_FOUND,
            AtendoError::NotConnected(_) => StatusCode::CONFLICT,
            AtendoError::Transport(_) => StatusCode::BAD_GATEWAY,
            AtendoError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": self.0.reason_code(),
            "detail": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    tenant_id: String,
    owner_account_id: String,
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    conversation_ref: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApproveRequest {
    tenant_id: String,
    #[serde(default)]
    approved_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RejectRequest {
    tenant_id: String,
    #[serde(default)]
    feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PendingQuery {
    tenant_id: String,
    account_id: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct AutoRespondToggleRequest {
    tenant_id: String,
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct TenantQuery {
    tenant_id: String,
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "timestamp_unix_ms": current_unix_timestamp_ms(),
    }))
}

/// Creation is accepted, pairing proceeds asynchronously; callers poll
/// the session resource for the pairing code.
async fn handle_create_session(
    State(state): State<GatewayState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionRecord>), GatewayError> {
    let record = state
        .sessions
        .create_session(&request.owner_account_id, &request.tenant_id)?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

async fn handle_get_session(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionRecord>, GatewayError> {
    let record = state
        .sessions
        .get_session(&session_id)
        .ok_or_else(|| AtendoError::NotFound(format!("session {session_id}")))?;
    Ok(Json(record))
}

async fn handle_remove_session(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    state.sessions.remove_session(&session_id).await?;
    Ok(Json(json!({ "status": "removed", "session_id": session_id })))
}

async fn handle_send_message(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    state
        .sessions
        .send(&session_id, &request.conversation_ref, &request.text)
        .await?;
    Ok(Json(json!({ "status": "sent", "session_id": session_id })))
}

/// Ingress for inbound messages, either forwarded by a session loop or
/// posted by an external webhook. The outbound message of an auto-sent
/// suggestion is persisted before this handler responds.
async fn handle_inbound_suggestion(
    State(state): State<GatewayState>,
    Json(request): Json<InboundSuggestionRequest>,
) -> Result<Json<SuggestionRecord>, GatewayError> {
    let record = state.pipeline.handle_inbound(request).await?;
    Ok(Json(record))
}

async fn handle_approve_suggestion(
    State(state): State<GatewayState>,
    Path(suggestion_id): Path<String>,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<SuggestionRecord>, GatewayError> {
    let record = state
        .pipeline
        .approve(&request.tenant_id, &suggestion_id, request.approved_text)
        .await?;
    Ok(Json(record))
}

async fn handle_reject_suggestion(
    State(state): State<GatewayState>,
    Path(suggestion_id): Path<String>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<SuggestionRecord>, GatewayError> {
    let record = state
        .pipeline
        .reject(&request.tenant_id, &suggestion_id, request.feedback)?;
    Ok(Json(record))
}

async fn handle_pending_suggestions(
    State(state): State<GatewayState>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<SuggestionRecord>>, GatewayError> {
    let records = state.pipeline.pending_suggestions(
        &query.tenant_id,
        &query.account_id,
        query.limit.unwrap_or(DEFAULT_PENDING_LIMIT),
    )?;
    Ok(Json(records))
}

async fn handle_set_auto_respond(
    State(state): State<GatewayState>,
    Path(account_id): Path<String>,
    Json(request): Json<AutoRespondToggleRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let profile = state
        .pipeline
        .set_auto_respond(&request.tenant_id, &account_id, request.enabled)?;
    Ok(Json(auto_respond_payload(&profile)))
}

async fn handle_auto_respond_status(
    State(state): State<GatewayState>,
    Path(account_id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let profile = state
        .pipeline
        .auto_respond_status(&query.tenant_id, &account_id)?;
    Ok(Json(auto_respond_payload(&profile)))
}

fn auto_respond_payload(profile: &atendo_contract::TrustProfile) -> serde_json::Value {
    json!({
        "account_id": profile.account_id,
        "auto_respond_enabled": profile.auto_respond_enabled,
        "confidence_score": profile.confidence_score,
        "total_approvals": profile.total_approvals,
    })
}

pub fn build_gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route(HEALTH_ENDPOINT, get(handle_health))
        .route(SESSIONS_ENDPOINT, post(handle_create_session))
        .route(
            SESSION_ENDPOINT,
            get(handle_get_session).delete(handle_remove_session),
        )
        .route(SESSION_SEND_ENDPOINT, post(handle_send_message))
        .route(SUGGESTIONS_INBOUND_ENDPOINT, post(handle_inbound_suggestion))
        .route(SUGGESTION_APPROVE_ENDPOINT, post(handle_approve_suggestion))
        .route(SUGGESTION_REJECT_ENDPOINT, post(handle_reject_suggestion))
        .route(SUGGESTIONS_PENDING_ENDPOINT, get(handle_pending_suggestions))
        .route(
            ACCOUNT_AUTO_RESPOND_ENDPOINT,
            post(handle_set_auto_respond).get(handle_auto_respond_status),
        )
        .with_state(state)
}

/// Binds the listener and serves the gateway until the process exits.
pub async fn run_gateway_server(bind_address: &str, state: GatewayState) -> Result<()> {
    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("failed to bind gateway listener on {bind_address}"))?;
    let local_address = listener
        .local_addr()
        .context("failed to resolve gateway local address")?;
    println!("gateway listening on {local_address}");
    axum::serve(listener, build_gateway_router(state))
        .await
        .context("gateway server terminated")?;
    Ok(())
}
