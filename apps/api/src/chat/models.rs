use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::chat::codec::normalize_timestamp;
use crate::models::chat::ChatMessageRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }

    /// Maps a stored role column back to a role. Unknown values read as `user`.
    pub fn from_db(role: &str) -> Self {
        match role {
            "assistant" => ChatRole::Assistant,
            "system" => ChatRole::System,
            _ => ChatRole::User,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolState {
    Pending,
    Succeeded,
    Failed,
}

/// A named tool call with its arguments and, once resolved, its outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub input: Value,
    pub state: ToolState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

/// One renderable unit of a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text { text: String },
    ToolInvocation(ToolInvocation),
}

impl Part {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            Part::ToolInvocation(_) => None,
        }
    }

    pub fn as_tool(&self) -> Option<&ToolInvocation> {
        match self {
            Part::ToolInvocation(tool) => Some(tool),
            Part::Text { .. } => None,
        }
    }
}

/// Creation time as it arrives from the store or the client: epoch
/// milliseconds, an RFC 3339 string, or something unusable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawTimestamp {
    EpochMillis(i64),
    EpochMillisFloat(f64),
    Time(DateTime<Utc>),
    Unrecognized(Value),
}

/// A persisted conversation turn before reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    pub role: ChatRole,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub created_at: Option<RawTimestamp>,
}

impl From<ChatMessageRow> for ChatRecord {
    fn from(row: ChatMessageRow) -> Self {
        ChatRecord {
            id: row.id.to_string(),
            role: ChatRole::from_db(&row.role),
            content: row.content,
            metadata: row.metadata,
            created_at: Some(RawTimestamp::Time(row.created_at)),
        }
    }
}

/// A turn ready for rendering: identity plus its ordered parts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub id: String,
    pub role: ChatRole,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    /// Accepts the same forms as `RawTimestamp`; unusable values read as the epoch.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
    Ok(normalize_timestamp(raw.as_ref()))
}
