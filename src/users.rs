//! Registered users.
//!
//! Emails are trimmed and lowercased before they are stored or looked up,
//! so `Ana@Example.com` and `ana@example.com ` name the same account.
//! `password_hash` is opaque here: hashing and verification belong to
//! whatever fronts the API.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::UserError;
use crate::models::User;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Register a user. Every field must be non-empty after trimming.
pub async fn create_user(
    pool: &SqlitePool,
    firstname: &str,
    email: &str,
    password_hash: &str,
) -> Result<User, UserError> {
    let firstname = firstname.trim();
    let email = normalize_email(email);
    if firstname.is_empty() {
        return Err(UserError::MissingField("firstname"));
    }
    if email.is_empty() {
        return Err(UserError::MissingField("email"));
    }
    if password_hash.trim().is_empty() {
        return Err(UserError::MissingField("password"));
    }

    let created_at = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO users (email, firstname, password_hash, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(email) DO NOTHING
        "#,
    )
    .bind(&email)
    .bind(firstname)
    .bind(password_hash)
    .bind(created_at.timestamp_millis())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(UserError::EmailExists(email));
    }

    tracing::info!(email = %email, "registered user");
    Ok(User {
        firstname: firstname.to_string(),
        email,
        password_hash: password_hash.to_string(),
        created_at,
    })
}

pub async fn find_user(pool: &SqlitePool, email: &str) -> Result<Option<User>, UserError> {
    let row = sqlx::query(
        "SELECT email, firstname, password_hash, created_at FROM users WHERE email = ?",
    )
    .bind(normalize_email(email))
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let created_ms: i64 = row.try_get("created_at")?;
    Ok(Some(User {
        firstname: row.try_get("firstname")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: DateTime::from_timestamp_millis(created_ms).unwrap_or_default(),
    }))
}
