//! Core data models used throughout IntelliSphere.
//!
//! These types represent the loaded documents, chunks, conversation turns,
//! sessions, and users that flow through ingestion and serving.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One loaded unit of raw text: a PDF page, a CSV row, or a whole text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub text: String,
    pub source_path: String,
    /// Indivisible unit (a CSV row). Kept whole even when it exceeds the chunk size.
    pub atomic: bool,
}

impl SourceDocument {
    pub fn new(text: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_path: source_path.into(),
            atomic: false,
        }
    }

    pub fn atomic(text: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_path: source_path.into(),
            atomic: true,
        }
    }
}

/// A bounded-length span of source text; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub source_path: String,
}

/// One completed chat exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub user: String,
    pub bot: String,
}

impl Message {
    pub fn new(user: impl Into<String>, bot: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            bot: bot.into(),
        }
    }
}

/// The `(user_email, domain, session_id)` triple addressing one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_email: String,
    pub domain: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(user_email: &str, domain: &str, session_id: &str) -> Self {
        Self {
            user_email: user_email.to_string(),
            domain: domain.to_string(),
            session_id: session_id.to_string(),
        }
    }
}

/// A full conversation record.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSession {
    pub user_email: String,
    pub domain: String,
    pub session_id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Listing entry returned by `list_sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub message_count: usize,
}

/// A registered user. `password_hash` is opaque to this crate.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub firstname: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}
