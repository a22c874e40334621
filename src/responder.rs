//! Retrieval-augmented responder.
//!
//! One call of [`Responder::answer`] runs the whole request pipeline in
//! sequence:
//!
//! ```text
//! registry.get(domain) → similarity_search(query, top_k)
//!     → store.read_recent(session, history_turns) → build_prompt
//!     → generator.generate → store.append → store.read
//! ```
//!
//! The conversation only grows on success: every failure before the
//! append leaves the session exactly as it was.

use serde::Serialize;
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::error::AnswerError;
use crate::generation::Generator;
use crate::models::{Message, SessionKey};
use crate::prompt::build_prompt;
use crate::registry::IndexRegistry;
use crate::store::ConversationStore;

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Domain actually served (unknown requests resolve to the default).
    pub domain: String,
    pub session_id: String,
    pub bot_text: String,
    /// The session's full history, including this exchange.
    pub history: Vec<Message>,
}

pub struct Responder {
    registry: Arc<IndexRegistry>,
    store: Arc<dyn ConversationStore>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    history_turns: usize,
}

impl Responder {
    pub fn new(
        registry: Arc<IndexRegistry>,
        store: Arc<dyn ConversationStore>,
        generator: Arc<dyn Generator>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            registry,
            store,
            generator,
            top_k: retrieval.top_k,
            history_turns: retrieval.history_turns,
        }
    }

    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub async fn answer(
        &self,
        user_email: &str,
        domain: &str,
        session_id: &str,
        query: &str,
    ) -> Result<Answer, AnswerError> {
        if query.trim().is_empty() {
            return Err(AnswerError::EmptyQuery);
        }

        let domain = self.registry.domains().resolve(domain).name;
        let index = self
            .registry
            .get(&domain)
            .await
            .map_err(|source| AnswerError::IndexUnavailable {
                domain: domain.clone(),
                source,
            })?;

        let context = index
            .similarity_search(query, self.top_k)
            .await
            .map_err(|source| AnswerError::Retrieval {
                domain: domain.clone(),
                source,
            })?;

        let key = SessionKey::new(user_email, &domain, session_id);
        let store_err = |source| AnswerError::Store {
            domain: domain.clone(),
            session_id: session_id.to_string(),
            source,
        };

        let recent = self
            .store
            .read_recent(&key, self.history_turns)
            .await
            .map_err(store_err)?;

        let prompt = build_prompt(&domain, &context, &recent, query);
        tracing::debug!(
            domain = %domain,
            session_id,
            chunks = context.len(),
            history = recent.len(),
            prompt_chars = prompt.len(),
            "generating answer"
        );

        let bot_text = self.generator.generate(&prompt).await.map_err(|source| {
            tracing::warn!(domain = %domain, session_id, error = %source, "generation failed");
            AnswerError::Generation {
                domain: domain.clone(),
                session_id: session_id.to_string(),
                source,
            }
        })?;

        self.store
            .append(&key, &Message::new(query, bot_text.clone()))
            .await
            .map_err(store_err)?;
        let history = self.store.read(&key).await.map_err(store_err)?;

        Ok(Answer {
            domain,
            session_id: session_id.to_string(),
            bot_text,
            history,
        })
    }
}
