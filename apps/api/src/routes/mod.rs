pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::chat::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Sessions
        .route(
            "/api/v1/resumes/:resume_id/chat/sessions",
            get(handlers::handle_list_sessions).post(handlers::handle_create_session),
        )
        .route(
            "/api/v1/chat/sessions/:session_id",
            delete(handlers::handle_delete_session),
        )
        // Messages
        .route(
            "/api/v1/chat/sessions/:session_id/messages",
            get(handlers::handle_history_page).post(handlers::handle_append_message),
        )
        // Transcript transforms
        .route(
            "/api/v1/chat/transcript/merge",
            post(handlers::handle_merge_transcript),
        )
        .route(
            "/api/v1/chat/transcript/decode",
            post(handlers::handle_decode_records),
        )
        .with_state(state)
}
