//! Implementations of the `isx` subcommands.
//!
//! Each `run_*` function loads what it needs from [`Config`], does one
//! thing, and prints a human-readable result to stdout. Logs go to stderr
//! through `tracing`.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::domain::DomainMap;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::indexer::index_domain;
use crate::migrate;
use crate::models::SessionKey;
use crate::registry::IndexRegistry;
use crate::responder::Responder;
use crate::store::{new_session_id, ConversationStore, SqliteConversationStore};
use crate::users::{create_user, normalize_email};
use crate::vector_index::VectorIndex;

async fn open_store(config: &Config) -> Result<(SqlitePool, SqliteConversationStore)> {
    let pool = db::connect(config).await?;
    migrate::migrate(&pool).await?;
    Ok((pool.clone(), SqliteConversationStore::new(pool)))
}

/// `isx domains`: list configured domains and whether their index is built.
pub fn run_domains(config: &Config) -> Result<()> {
    let domains = DomainMap::from_config(config);
    println!("{:<12} {:<8} LOCATION", "DOMAIN", "STATUS");
    for name in domains.names() {
        let location = domains.resolve(name).location;
        let status = if VectorIndex::exists(&location) {
            "ready"
        } else {
            "missing"
        };
        let marker = if name == domains.default_domain() {
            " (default)"
        } else {
            ""
        };
        println!(
            "{:<12} {:<8} {}{}",
            name,
            status,
            location.display(),
            marker
        );
    }
    Ok(())
}

/// `isx index <domain|all>`: rebuild one or every domain index.
pub async fn run_index(config: &Config, target: &str) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Indexing requires embeddings. Set [embedding] provider in config.");
    }
    let embedder = create_embedder(&config.embedding)?;

    let targets: Vec<String> = if target == "all" {
        config.domains.keys().cloned().collect()
    } else {
        vec![target.to_string()]
    };

    let mut failed = Vec::new();
    for domain in &targets {
        match index_domain(config, domain, embedder.as_ref()).await {
            Ok(report) => {
                println!("index {}", report.domain);
                println!("  files loaded: {}", report.files_loaded);
                println!("  files skipped (unreadable): {}", report.files_failed);
                println!("  files skipped (duplicate name): {}", report.duplicate_files);
                println!("  documents: {}", report.index.documents);
                println!(
                    "  chunks: {} ({} duplicates dropped)",
                    report.index.chunks, report.index.duplicate_chunks
                );
                println!(
                    "  model: {} ({} dims)",
                    report.index.model, report.index.dims
                );
                println!("  location: {}", report.index.location.display());
            }
            Err(e) => {
                println!("index {}", domain);
                println!("  error: {:#}", e);
                failed.push(domain.clone());
            }
        }
    }

    if !failed.is_empty() {
        bail!("Indexing failed for: {}", failed.join(", "));
    }
    println!("ok");
    Ok(())
}

/// `isx search <domain> <query>`: show the chunks a question would retrieve.
pub async fn run_search(config: &Config, domain: &str, query: &str, limit: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let registry = IndexRegistry::new(
        DomainMap::from_config(config),
        create_embedder(&config.embedding)?,
    );
    let index = registry.get(domain).await?;
    let hits = index
        .search_scored(query, limit.unwrap_or(config.retrieval.top_k))
        .await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!("domain: {}", index.domain());
    for (i, hit) in hits.iter().enumerate() {
        let snippet: String = hit.chunk.text.chars().take(200).collect();
        println!("{}. [{:.4}] {}", i + 1, hit.score, hit.chunk.source_path);
        println!("    {}", snippet.replace('\n', " "));
    }
    Ok(())
}

/// `isx ask`: answer one question inside a session and print the reply.
pub async fn run_ask(
    config: &Config,
    user: &str,
    domain: &str,
    session: Option<String>,
    query: &str,
) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let registry = Arc::new(IndexRegistry::new(
        DomainMap::from_config(config),
        create_embedder(&config.embedding)?,
    ));
    let responder = Responder::new(
        registry,
        Arc::new(store),
        create_generator(&config.generation)?,
        &config.retrieval,
    );

    let session_id = session.unwrap_or_else(new_session_id);
    let answer = responder
        .answer(&normalize_email(user), domain, &session_id, query)
        .await?;

    println!("session: {}", answer.session_id);
    println!("domain: {}", answer.domain);
    println!();
    println!("{}", answer.bot_text);

    pool.close().await;
    Ok(())
}

/// `isx session new`
pub async fn run_session_new(config: &Config, user: &str, domain: &str) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let domain = DomainMap::from_config(config).resolve(domain).name;
    let session_id = new_session_id();
    store
        .create(&SessionKey::new(&normalize_email(user), &domain, &session_id))
        .await?;
    println!("{}", session_id);
    pool.close().await;
    Ok(())
}

/// `isx session list`
pub async fn run_session_list(config: &Config, user: &str, domain: &str) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let domain = DomainMap::from_config(config).resolve(domain).name;
    let sessions = store.list_sessions(&normalize_email(user), &domain).await?;

    if sessions.is_empty() {
        println!("No sessions.");
    }
    for s in &sessions {
        println!(
            "{}  messages: {}  created: {}  updated: {}",
            s.session_id,
            s.message_count,
            s.created_at.format("%Y-%m-%d %H:%M:%S"),
            s.last_updated.format("%Y-%m-%d %H:%M:%S")
        );
    }
    pool.close().await;
    Ok(())
}

/// `isx session history`
pub async fn run_session_history(
    config: &Config,
    user: &str,
    domain: &str,
    session: &str,
) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let domain = DomainMap::from_config(config).resolve(domain).name;
    let Some(session) = store
        .get_session(&SessionKey::new(&normalize_email(user), &domain, session))
        .await?
    else {
        println!("No such session.");
        pool.close().await;
        return Ok(());
    };

    println!(
        "session {}  created: {}  updated: {}",
        session.session_id,
        session.created_at.format("%Y-%m-%d %H:%M:%S"),
        session.last_updated.format("%Y-%m-%d %H:%M:%S")
    );
    if session.messages.is_empty() {
        println!("No messages.");
    }
    for m in &session.messages {
        println!("User: {}", m.user);
        println!("Bot: {}", m.bot);
        println!();
    }
    pool.close().await;
    Ok(())
}

/// `isx session delete`: one session, or all of them without `--session`.
pub async fn run_session_delete(
    config: &Config,
    user: &str,
    domain: &str,
    session: Option<&str>,
) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let domain = DomainMap::from_config(config).resolve(domain).name;
    let deleted = store
        .delete(&normalize_email(user), &domain, session)
        .await?;
    println!("deleted {} session(s)", deleted);
    pool.close().await;
    Ok(())
}

/// `isx user add`
pub async fn run_user_add(
    config: &Config,
    firstname: &str,
    email: &str,
    password_hash: &str,
) -> Result<()> {
    let (pool, _) = open_store(config).await?;
    let user = create_user(&pool, firstname, email, password_hash).await?;
    println!("created user {}", user.email);
    pool.close().await;
    Ok(())
}
