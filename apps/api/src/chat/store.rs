//! Chat Store — session and message persistence behind a swappable trait.
//!
//! `AppState` carries an `Arc<dyn ChatStore>`; `PgChatStore` is the production backend.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::chat::models::ChatRole;
use crate::errors::AppError;
use crate::models::chat::{ChatMessageRow, ChatSessionRow};

/// A completed turn ready to be written.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: ChatRole,
    pub content: String,
    pub metadata: Option<Value>,
}

/// One page of history, oldest first.
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<ChatMessageRow>,
    /// True when older messages exist before the first one in this page.
    pub has_more: bool,
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Sessions for a resume, most recently updated first.
    async fn list_sessions(&self, resume_id: Uuid) -> Result<Vec<ChatSessionRow>, AppError>;

    async fn create_session(
        &self,
        resume_id: Uuid,
        title: Option<String>,
    ) -> Result<ChatSessionRow, AppError>;

    /// Deletes a session and its messages.
    async fn delete_session(&self, session_id: Uuid) -> Result<(), AppError>;

    /// Up to `limit` messages strictly older than `before`, or the newest ones
    /// when no cursor is given.
    async fn fetch_page(
        &self,
        session_id: Uuid,
        before: Option<Uuid>,
        limit: u32,
    ) -> Result<MessagePage, AppError>;

    async fn append_message(
        &self,
        session_id: Uuid,
        message: NewMessage,
    ) -> Result<ChatMessageRow, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// PgChatStore
// ────────────────────────────────────────────────────────────────────────────

pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_session(&self, session_id: Uuid) -> Result<(), AppError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM chat_sessions WHERE id = $1)")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;
        if !exists {
            return Err(AppError::NotFound(format!(
                "Chat session {session_id} not found"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn list_sessions(&self, resume_id: Uuid) -> Result<Vec<ChatSessionRow>, AppError> {
        Ok(sqlx::query_as::<_, ChatSessionRow>(
            "SELECT * FROM chat_sessions WHERE resume_id = $1 ORDER BY updated_at DESC",
        )
        .bind(resume_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_session(
        &self,
        resume_id: Uuid,
        title: Option<String>,
    ) -> Result<ChatSessionRow, AppError> {
        let session = sqlx::query_as::<_, ChatSessionRow>(
            r#"
            INSERT INTO chat_sessions (id, resume_id, title)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(resume_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await?;

        info!("Created chat session {} for resume {resume_id}", session.id);
        Ok(session)
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<(), AppError> {
        // chat_messages rows go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Chat session {session_id} not found")));
        }

        info!("Deleted chat session {session_id}");
        Ok(())
    }

    async fn fetch_page(
        &self,
        session_id: Uuid,
        before: Option<Uuid>,
        limit: u32,
    ) -> Result<MessagePage, AppError> {
        self.ensure_session(session_id).await?;

        // One extra row tells us whether anything older remains.
        let fetch = i64::from(limit) + 1;

        let mut rows = match before {
            Some(cursor) => {
                let cursor_at: Option<chrono::DateTime<chrono::Utc>> = sqlx::query_scalar(
                    "SELECT created_at FROM chat_messages WHERE id = $1 AND session_id = $2",
                )
                .bind(cursor)
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;

                let cursor_at = cursor_at.ok_or_else(|| {
                    AppError::Validation(format!("Unknown cursor {cursor} for session {session_id}"))
                })?;

                sqlx::query_as::<_, ChatMessageRow>(
                    r#"
                    SELECT * FROM chat_messages
                    WHERE session_id = $1 AND (created_at, id) < ($2, $3)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $4
                    "#,
                )
                .bind(session_id)
                .bind(cursor_at)
                .bind(cursor)
                .bind(fetch)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ChatMessageRow>(
                    r#"
                    SELECT * FROM chat_messages
                    WHERE session_id = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT $2
                    "#,
                )
                .bind(session_id)
                .bind(fetch)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let has_more = rows.len() > limit as usize;
        rows.truncate(limit as usize);
        rows.reverse();

        Ok(MessagePage {
            messages: rows,
            has_more,
        })
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        message: NewMessage,
    ) -> Result<ChatMessageRow, AppError> {
        self.ensure_session(session_id).await?;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ChatMessageRow>(
            r#"
            INSERT INTO chat_messages (id, session_id, role, content, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(message.role.as_str())
        .bind(message.content)
        .bind(message.metadata)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE chat_sessions SET updated_at = now() WHERE id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row)
    }
}
