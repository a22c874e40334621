use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // Registered users; email is stored lowercased
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            email TEXT PRIMARY KEY,
            firstname TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per (user, domain, session)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_email TEXT NOT NULL,
            domain TEXT NOT NULL,
            session_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            last_updated INTEGER NOT NULL,
            UNIQUE(user_email, domain, session_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Exchanges, ordered by seq within a session
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            session_row INTEGER NOT NULL,
            seq INTEGER NOT NULL,
            user_text TEXT NOT NULL,
            bot_text TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (session_row, seq),
            FOREIGN KEY (session_row) REFERENCES sessions(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sessions_user_domain ON sessions(user_email, domain)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
