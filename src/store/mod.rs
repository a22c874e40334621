//! Conversation persistence.
//!
//! The [`ConversationStore`] trait keeps an append-only log of exchanges
//! per `(user_email, domain, session_id)`. Two backends:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SqliteConversationStore`] | durable, shared by the CLI and the server |
//! | [`InMemoryConversationStore`] | tests and throwaway sessions |
//!
//! Messages are returned in insertion order; nothing is ever reordered or
//! deduplicated. Reading a session that does not exist yields an empty
//! log rather than an error.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ConversationSession, Message, SessionKey, SessionSummary};

pub use memory::InMemoryConversationStore;
pub use sqlite::SqliteConversationStore;

/// Mint a fresh session id: 16 lowercase hex characters.
pub fn new_session_id() -> String {
    let id = uuid::Uuid::new_v4();
    hex::encode(&id.as_bytes()[..8])
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Register an empty session. Creating an existing session keeps its messages.
    async fn create(&self, key: &SessionKey) -> Result<()>;

    /// Append one exchange, creating the session if needed, and bump `last_updated`.
    async fn append(&self, key: &SessionKey, message: &Message) -> Result<()>;

    /// Every message of the session in insertion order; empty if it does not exist.
    async fn read(&self, key: &SessionKey) -> Result<Vec<Message>>;

    /// The last `n` messages, still in insertion order.
    async fn read_recent(&self, key: &SessionKey, n: usize) -> Result<Vec<Message>>;

    /// Delete one session, or every session of `(user_email, domain)` when
    /// `session_id` is `None`. Returns the number of sessions removed.
    async fn delete(&self, user_email: &str, domain: &str, session_id: Option<&str>)
        -> Result<u64>;

    /// Sessions of `(user_email, domain)`, oldest first.
    async fn list_sessions(&self, user_email: &str, domain: &str) -> Result<Vec<SessionSummary>>;

    /// The full session record, if it exists.
    async fn get_session(&self, key: &SessionKey) -> Result<Option<ConversationSession>>;
}
