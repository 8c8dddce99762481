//! Axum route handlers for the Chat API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::codec::{encode_turn_metadata, reconstruct_turn};
use crate::chat::merge::merge_transcript;
use crate::chat::models::{ChatRecord, ChatRole, ChatTurn, Part};
use crate::chat::store::NewMessage;
use crate::errors::AppError;
use crate::models::chat::ChatSessionRow;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub before: Option<Uuid>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HistoryPageResponse {
    pub turns: Vec<ChatTurn>,
    pub has_more: bool,
    /// Pass as `before` to fetch the next older page.
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppendMessageRequest {
    pub role: ChatRole,
    #[serde(default)]
    pub parts: Vec<Part>,
    /// Plain-text body. Defaults to the concatenated text parts.
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    #[serde(default)]
    pub historical: Vec<ChatTurn>,
    #[serde(default)]
    pub live: Vec<ChatTurn>,
}

#[derive(Debug, Deserialize)]
pub struct DecodeRequest {
    pub records: Vec<ChatRecord>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/resumes/:resume_id/chat/sessions
pub async fn handle_list_sessions(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
) -> Result<Json<Vec<ChatSessionRow>>, AppError> {
    Ok(Json(state.store.list_sessions(resume_id).await?))
}

/// POST /api/v1/resumes/:resume_id/chat/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<ChatSessionRow>), AppError> {
    let title = req
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let session = state.store.create_session(resume_id, title).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// DELETE /api/v1/chat/sessions/:session_id
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.store.delete_session(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/chat/sessions/:session_id/messages?before=&limit=
///
/// Returns one page of history already decoded into turns, oldest first.
pub async fn handle_history_page(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryPageResponse>, AppError> {
    let limit = state.config.page_limit(params.limit);
    let page = state
        .store
        .fetch_page(session_id, params.before, limit)
        .await?;

    let turns: Vec<ChatTurn> = page
        .messages
        .into_iter()
        .map(|row| reconstruct_turn(&ChatRecord::from(row)))
        .collect();

    let next_cursor = if page.has_more {
        turns.first().map(|t| t.id.clone())
    } else {
        None
    };

    Ok(Json(HistoryPageResponse {
        turns,
        has_more: page.has_more,
        next_cursor,
    }))
}

/// POST /api/v1/chat/sessions/:session_id/messages
///
/// Persists a completed turn. Parts are stored in the ordered schema.
pub async fn handle_append_message(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<AppendMessageRequest>,
) -> Result<(StatusCode, Json<ChatTurn>), AppError> {
    let content = req.content.unwrap_or_else(|| {
        req.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<String>()
    });

    if content.is_empty() && req.parts.is_empty() {
        return Err(AppError::Validation(
            "message needs content or at least one part".to_string(),
        ));
    }

    let metadata = (!req.parts.is_empty()).then(|| encode_turn_metadata(&req.parts));

    let row = state
        .store
        .append_message(
            session_id,
            NewMessage {
                role: req.role,
                content,
                metadata,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(reconstruct_turn(&ChatRecord::from(row))),
    ))
}

/// POST /api/v1/chat/transcript/merge
pub async fn handle_merge_transcript(Json(req): Json<MergeRequest>) -> Json<Vec<ChatTurn>> {
    Json(merge_transcript(req.historical, req.live))
}

/// POST /api/v1/chat/transcript/decode
///
/// Decodes raw stored records of any schema vintage into turns.
pub async fn handle_decode_records(Json(req): Json<DecodeRequest>) -> Json<Vec<ChatTurn>> {
    Json(req.records.iter().map(reconstruct_turn).collect())
}
