//! Wire types for the chat backend

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// User id the backend records for assistant messages
pub const ASSISTANT_USER_ID: &str = "bot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "bot")]
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Persisted transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: None,
        }
    }
}

/// Conversation summary as listed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => "(untitled)",
        }
    }
}

/// The backend emits either RFC 3339 or naive ISO timestamps; naive ones
/// are read as UTC. Anything unparseable is dropped rather than failing
/// the whole page.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

// ============================================================================
// Requests and responses
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CreateConversationRequest<'a> {
    pub user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedConversation {
    pub conversation_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveMessageRequest<'a> {
    pub conversation_id: &'a str,
    pub user_id: &'a str,
    pub role: Role,
    pub content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameRequest<'a> {
    pub title: &'a str,
}

/// Body of `POST /ask`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskRequest {
    pub conversation_id: String,
    pub question: String,
}

/// History window, newest-first offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessagePage {
    pub offset: usize,
    pub limit: usize,
}
