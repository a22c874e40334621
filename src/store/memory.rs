//! In-memory [`ConversationStore`] for tests and ephemeral use.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. A monotonically increasing
//! counter records creation order so listings stay oldest-first even when
//! two sessions share a timestamp.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{ConversationSession, Message, SessionKey, SessionSummary};

use super::ConversationStore;

struct StoredSession {
    order: u64,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    messages: Vec<Message>,
}

pub struct InMemoryConversationStore {
    sessions: RwLock<HashMap<SessionKey, StoredSession>>,
    next_order: AtomicU64,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_order: AtomicU64::new(0),
        }
    }

    fn fresh(&self) -> StoredSession {
        let now = Utc::now();
        StoredSession {
            order: self.next_order.fetch_add(1, Ordering::SeqCst),
            created_at: now,
            last_updated: now,
            messages: Vec::new(),
        }
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self, key: &SessionKey) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if !sessions.contains_key(key) {
            let session = self.fresh();
            sessions.insert(key.clone(), session);
        }
        Ok(())
    }

    async fn append(&self, key: &SessionKey, message: &Message) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let session = sessions.entry(key.clone()).or_insert_with(|| self.fresh());
        session.messages.push(message.clone());
        session.last_updated = Utc::now().max(session.created_at);
        Ok(())
    }

    async fn read(&self, key: &SessionKey) -> Result<Vec<Message>> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        Ok(sessions
            .get(key)
            .map(|s| s.messages.clone())
            .unwrap_or_default())
    }

    async fn read_recent(&self, key: &SessionKey, n: usize) -> Result<Vec<Message>> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        Ok(sessions
            .get(key)
            .map(|s| {
                let start = s.messages.len().saturating_sub(n);
                s.messages[start..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn delete(
        &self,
        user_email: &str,
        domain: &str,
        session_id: Option<&str>,
    ) -> Result<u64> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|k, _| {
            let matches = k.user_email == user_email
                && k.domain == domain
                && session_id.map_or(true, |id| k.session_id == id);
            !matches
        });
        Ok((before - sessions.len()) as u64)
    }

    async fn list_sessions(&self, user_email: &str, domain: &str) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<(u64, SessionSummary)> = sessions
            .iter()
            .filter(|(k, _)| k.user_email == user_email && k.domain == domain)
            .map(|(k, s)| {
                (
                    s.order,
                    SessionSummary {
                        session_id: k.session_id.clone(),
                        created_at: s.created_at,
                        last_updated: s.last_updated,
                        message_count: s.messages.len(),
                    },
                )
            })
            .collect();
        found.sort_by_key(|(order, _)| *order);
        Ok(found.into_iter().map(|(_, summary)| summary).collect())
    }

    async fn get_session(&self, key: &SessionKey) -> Result<Option<ConversationSession>> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        Ok(sessions.get(key).map(|s| ConversationSession {
            user_email: key.user_email.clone(),
            domain: key.domain.clone(),
            session_id: key.session_id.clone(),
            messages: s.messages.clone(),
            created_at: s.created_at,
            last_updated: s.last_updated,
        }))
    }
}
