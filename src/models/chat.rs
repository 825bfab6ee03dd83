use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::schema::{chat_messages, chat_sessions};

// Diesel traits for the manual enum <-> text mapping
use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use std::io::Write;

/// Who authored a turn. Stored as lowercase text in `chat_messages.role`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl ToSql<Text, Pg> for MessageRole {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            MessageRole::User => out.write_all(b"user")?,
            MessageRole::Assistant => out.write_all(b"assistant")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for MessageRole {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"user" => Ok(MessageRole::User),
            b"assistant" => Ok(MessageRole::Assistant),
            unrecognized => {
                error!(
                    "Unrecognized role value from DB: {:?}",
                    String::from_utf8_lossy(unrecognized)
                );
                Err("Unrecognized role value from database".into())
            }
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One persisted turn of a conversation.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, Serialize)]
#[diesel(table_name = chat_messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ChatMessage {
    pub id: i32,
    pub session_id: String,
    pub message_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Insertable row for `chat_messages`; `id` and `created_at` are
/// server-assigned.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = chat_messages)]
pub struct NewChatMessage {
    pub session_id: String,
    pub message_id: String,
    pub role: MessageRole,
    pub content: String,
}

/// Session metadata. The streaming pipeline only threads the session id
/// through; rows in this table are optional bookkeeping.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, Serialize)]
#[diesel(table_name = chat_sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ChatSession {
    pub id: i32,
    pub session_id: String,
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// --- API request/response structures ---

/// Body of `POST /api/v1/chat/stream`.
#[derive(Deserialize, Debug, Clone)]
pub struct StreamChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i32,
    /// Accepted for schema compatibility; responses always stream.
    #[serde(default = "default_stream")]
    pub stream: bool,
}

const fn default_temperature() -> f32 {
    0.7
}
const fn default_max_tokens() -> i32 {
    1000
}
const fn default_stream() -> bool {
    true
}

/// One server-sent event frame of a streamed response. Every frame of a
/// turn carries the same `session_id` and assistant `message_id`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StreamChatChunk {
    pub content: String,
    pub is_complete: bool,
    pub session_id: String,
    pub message_id: String,
}

impl StreamChatChunk {
    pub fn content(content: String, session_id: &str, message_id: &str) -> Self {
        Self {
            content,
            is_complete: false,
            session_id: session_id.to_string(),
            message_id: message_id.to_string(),
        }
    }

    pub fn terminal(session_id: &str, message_id: &str) -> Self {
        Self {
            content: String::new(),
            is_complete: true,
            session_id: session_id.to_string(),
            message_id: message_id.to_string(),
        }
    }
}

/// Response of `GET /api/v1/chat/health`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthCheck {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub database: bool,
    pub redis: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_role_serde_lowercase() {
        assert_eq!(serde_json::to_string(&MessageRole::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
        let role: MessageRole = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, MessageRole::Assistant);
    }

    #[test]
    fn test_message_role_display() {
        assert_eq!(MessageRole::User.to_string(), "user");
        assert_eq!(MessageRole::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_stream_chat_request_defaults() {
        let request: StreamChatRequest =
            serde_json::from_value(json!({ "message": "hello" })).unwrap();
        assert_eq!(request.message, "hello");
        assert!(request.session_id.is_none());
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, 1000);
        assert!(request.stream);
    }

    #[test]
    fn test_stream_chat_request_explicit_fields() {
        let request: StreamChatRequest = serde_json::from_value(json!({
            "message": "hi",
            "session_id": "abc",
            "temperature": 0.2,
            "max_tokens": 50,
            "stream": false
        }))
        .unwrap();
        assert_eq!(request.session_id.as_deref(), Some("abc"));
        assert!((request.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, 50);
        assert!(!request.stream);
    }

    #[test]
    fn test_stream_chat_request_missing_message_rejected() {
        let result = serde_json::from_value::<StreamChatRequest>(json!({ "session_id": "abc" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_chunk_wire_shape() {
        let chunk = StreamChatChunk::content("Hel".to_string(), "sess-1", "msg-1");
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(
            value,
            json!({
                "content": "Hel",
                "is_complete": false,
                "session_id": "sess-1",
                "message_id": "msg-1"
            })
        );
    }

    #[test]
    fn test_terminal_chunk_has_empty_content() {
        let chunk = StreamChatChunk::terminal("sess-1", "msg-1");
        assert!(chunk.content.is_empty());
        assert!(chunk.is_complete);
        assert_eq!(chunk.session_id, "sess-1");
        assert_eq!(chunk.message_id, "msg-1");
    }
}
