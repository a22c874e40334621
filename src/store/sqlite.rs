//! SQLite-backed [`ConversationStore`].
//!
//! Sessions and messages live in the `sessions` / `messages` tables created
//! by [`migrate`](crate::migrate::migrate). Timestamps are Unix
//! milliseconds. `append` runs in one transaction: upsert the session row,
//! then insert the message with the next sequence number.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::models::{ConversationSession, Message, SessionKey, SessionSummary};

use super::ConversationStore;

pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message> {
    Ok(Message {
        user: row.try_get("user_text")?,
        bot: row.try_get("bot_text")?,
    })
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn create(&self, key: &SessionKey) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO sessions (user_email, domain, session_id, created_at, last_updated)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_email, domain, session_id) DO NOTHING
            "#,
        )
        .bind(&key.user_email)
        .bind(&key.domain)
        .bind(&key.session_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append(&self, key: &SessionKey, message: &Message) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sessions (user_email, domain, session_id, created_at, last_updated)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_email, domain, session_id) DO UPDATE SET
                last_updated = MAX(sessions.last_updated, excluded.last_updated)
            "#,
        )
        .bind(&key.user_email)
        .bind(&key.domain)
        .bind(&key.session_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let session_row: i64 = sqlx::query_scalar(
            "SELECT id FROM sessions WHERE user_email = ? AND domain = ? AND session_id = ?",
        )
        .bind(&key.user_email)
        .bind(&key.domain)
        .bind(&key.session_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO messages (session_row, seq, user_text, bot_text, created_at)
            SELECT ?, COALESCE(MAX(seq), 0) + 1, ?, ?, ?
            FROM messages WHERE session_row = ?
            "#,
        )
        .bind(session_row)
        .bind(&message.user)
        .bind(&message.bot)
        .bind(now)
        .bind(session_row)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn read(&self, key: &SessionKey) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT m.user_text, m.bot_text
            FROM messages m
            JOIN sessions s ON s.id = m.session_row
            WHERE s.user_email = ? AND s.domain = ? AND s.session_id = ?
            ORDER BY m.seq ASC
            "#,
        )
        .bind(&key.user_email)
        .bind(&key.domain)
        .bind(&key.session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    async fn read_recent(&self, key: &SessionKey, n: usize) -> Result<Vec<Message>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT m.user_text, m.bot_text
            FROM messages m
            JOIN sessions s ON s.id = m.session_row
            WHERE s.user_email = ? AND s.domain = ? AND s.session_id = ?
            ORDER BY m.seq DESC
            LIMIT ?
            "#,
        )
        .bind(&key.user_email)
        .bind(&key.domain)
        .bind(&key.session_id)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .iter()
            .map(row_to_message)
            .collect::<Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn delete(
        &self,
        user_email: &str,
        domain: &str,
        session_id: Option<&str>,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        // `?3 IS NULL` selects every session of the (user, domain) pair.
        sqlx::query(
            r#"
            DELETE FROM messages WHERE session_row IN (
                SELECT id FROM sessions
                WHERE user_email = ?1 AND domain = ?2 AND (?3 IS NULL OR session_id = ?3)
            )
            "#,
        )
        .bind(user_email)
        .bind(domain)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "DELETE FROM sessions WHERE user_email = ?1 AND domain = ?2 AND (?3 IS NULL OR session_id = ?3)",
        )
        .bind(user_email)
        .bind(domain)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn list_sessions(&self, user_email: &str, domain: &str) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT s.session_id, s.created_at, s.last_updated, COUNT(m.seq) AS message_count
            FROM sessions s
            LEFT JOIN messages m ON m.session_row = s.id
            WHERE s.user_email = ? AND s.domain = ?
            GROUP BY s.id
            ORDER BY s.created_at ASC, s.id ASC
            "#,
        )
        .bind(user_email)
        .bind(domain)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let count: i64 = row.try_get("message_count")?;
                Ok(SessionSummary {
                    session_id: row.try_get("session_id")?,
                    created_at: from_millis(row.try_get("created_at")?),
                    last_updated: from_millis(row.try_get("last_updated")?),
                    message_count: count as usize,
                })
            })
            .collect()
    }

    async fn get_session(&self, key: &SessionKey) -> Result<Option<ConversationSession>> {
        let row = sqlx::query(
            r#"
            SELECT created_at, last_updated FROM sessions
            WHERE user_email = ? AND domain = ? AND session_id = ?
            "#,
        )
        .bind(&key.user_email)
        .bind(&key.domain)
        .bind(&key.session_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ConversationSession {
            user_email: key.user_email.clone(),
            domain: key.domain.clone(),
            session_id: key.session_id.clone(),
            messages: self.read(key).await?,
            created_at: from_millis(row.try_get("created_at")?),
            last_updated: from_millis(row.try_get("last_updated")?),
        }))
    }
}
