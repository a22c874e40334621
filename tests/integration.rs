//! Library-level end-to-end scenarios: build indexes on disk, serve them
//! through the registry, and drive conversations against a persistent store.

use async_trait::async_trait;
use intellisphere::config::{self, Config};
use intellisphere::db;
use intellisphere::domain::DomainMap;
use intellisphere::embedding::create_embedder;
use intellisphere::error::{AnswerError, GenerationError, RegistryError};
use intellisphere::generation::Generator;
use intellisphere::indexer::index_domain;
use intellisphere::migrate;
use intellisphere::models::{Message, SessionKey};
use intellisphere::registry::IndexRegistry;
use intellisphere::responder::Responder;
use intellisphere::store::{ConversationStore, SqliteConversationStore};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Replies "R1", "R2", ... in call order.
struct CountingGenerator {
    calls: AtomicUsize,
}

impl CountingGenerator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Generator for CountingGenerator {
    fn model_name(&self) -> &str {
        "counting"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("R{}", n))
    }
}

fn test_config(tmp: &TempDir) -> Config {
    let root = tmp.path();
    let law = root.join("sources/law");
    fs::create_dir_all(&law).unwrap();
    fs::write(law.join("contracts.txt"), "Contract law basics").unwrap();
    fs::write(law.join("torts.txt"), "Tort law basics").unwrap();
    fs::write(law.join("property.txt"), "Property law basics").unwrap();
    fs::write(law.join("criminal.txt"), "Criminal procedure overview").unwrap();

    let content = format!(
        r#"[db]
path = "{root}/data/isx.sqlite"

[index]
root = "{root}/indexes"
default_domain = "home"

[embedding]
provider = "hash"
dims = 128

[retrieval]
top_k = 3
history_turns = 5

[domains.home]
dir = "general"

[domains.law]
sources = ["{root}/sources/law"]
"#,
        root = root.display()
    );
    let path = root.join("isx.toml");
    fs::write(&path, content).unwrap();
    config::load_config(&path).unwrap()
}

async fn responder(cfg: &Config) -> (Responder, Arc<SqliteConversationStore>) {
    let pool = db::connect(cfg).await.unwrap();
    migrate::migrate(&pool).await.unwrap();
    let store = Arc::new(SqliteConversationStore::new(pool));
    let registry = Arc::new(IndexRegistry::new(
        DomainMap::from_config(cfg),
        create_embedder(&cfg.embedding).unwrap(),
    ));
    let responder = Responder::new(
        registry,
        store.clone(),
        Arc::new(CountingGenerator::new()),
        &cfg.retrieval,
    );
    (responder, store)
}

#[tokio::test]
async fn test_indexed_domain_ranks_relevant_chunk_first() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let embedder = create_embedder(&cfg.embedding).unwrap();

    let report = index_domain(&cfg, "law", embedder.as_ref()).await.unwrap();
    assert_eq!(report.files_loaded, 4);
    assert_eq!(report.index.chunks, 4);

    let registry = IndexRegistry::new(DomainMap::from_config(&cfg), embedder);
    let index = registry.get("law").await.unwrap();
    let hits = index.similarity_search("what is tort law", 3).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0], "Tort law basics");
}

#[tokio::test]
async fn test_conversation_accumulates_in_order() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let embedder = create_embedder(&cfg.embedding).unwrap();
    index_domain(&cfg, "law", embedder.as_ref()).await.unwrap();

    let (responder, store) = responder(&cfg).await;
    responder
        .answer("ana@example.com", "law", "s1", "Q1")
        .await
        .unwrap();
    let answer = responder
        .answer("ana@example.com", "law", "s1", "Q2")
        .await
        .unwrap();

    let expected = vec![Message::new("Q1", "R1"), Message::new("Q2", "R2")];
    assert_eq!(answer.history, expected);

    let key = SessionKey::new("ana@example.com", "law", "s1");
    assert_eq!(store.read(&key).await.unwrap(), expected);
    assert_eq!(
        store.read_recent(&key, 1).await.unwrap(),
        vec![Message::new("Q2", "R2")]
    );
}

#[tokio::test]
async fn test_delete_all_sessions_in_domain() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let embedder = create_embedder(&cfg.embedding).unwrap();
    index_domain(&cfg, "law", embedder.as_ref()).await.unwrap();

    let (responder, store) = responder(&cfg).await;
    for session in ["a", "b", "c"] {
        responder
            .answer("ana@example.com", "law", session, "what is tort law")
            .await
            .unwrap();
    }
    assert_eq!(
        store
            .list_sessions("ana@example.com", "law")
            .await
            .unwrap()
            .len(),
        3
    );

    let deleted = store.delete("ana@example.com", "law", None).await.unwrap();
    assert_eq!(deleted, 3);
    assert!(store
        .list_sessions("ana@example.com", "law")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_missing_index_leaves_no_phantom_turn() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let (responder, store) = responder(&cfg).await;

    let err = responder
        .answer("ana@example.com", "law", "s1", "what is tort law")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AnswerError::IndexUnavailable {
            source: RegistryError::NotFound { .. },
            ..
        }
    ));

    let key = SessionKey::new("ana@example.com", "law", "s1");
    assert!(store.read(&key).await.unwrap().is_empty());
    assert!(store
        .list_sessions("ana@example.com", "law")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_unknown_domain_served_as_default() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let general = tmp.path().join("sources/general");
    fs::create_dir_all(&general).unwrap();
    fs::write(general.join("welcome.txt"), "General knowledge overview").unwrap();

    let mut cfg = cfg;
    cfg.domains.get_mut("home").unwrap().sources = vec![general];
    let embedder = create_embedder(&cfg.embedding).unwrap();
    index_domain(&cfg, "home", embedder.as_ref()).await.unwrap();

    let (responder, store) = responder(&cfg).await;
    let answer = responder
        .answer("ana@example.com", "astrology", "s1", "hello")
        .await
        .unwrap();
    assert_eq!(answer.domain, "home");

    let home = responder.registry().get("home").await.unwrap();
    let unknown = responder.registry().get("astrology").await.unwrap();
    assert!(Arc::ptr_eq(&home, &unknown));

    let key = SessionKey::new("ana@example.com", "home", "s1");
    assert_eq!(store.read(&key).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reindex_then_invalidate_serves_new_content() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let embedder = create_embedder(&cfg.embedding).unwrap();
    index_domain(&cfg, "law", embedder.as_ref()).await.unwrap();

    let registry = IndexRegistry::new(DomainMap::from_config(&cfg), embedder.clone());
    assert_eq!(registry.get("law").await.unwrap().len(), 4);

    fs::write(
        tmp.path().join("sources/law/equity.txt"),
        "Equity and trusts",
    )
    .unwrap();
    index_domain(&cfg, "law", embedder.as_ref()).await.unwrap();

    // The cached instance is served until invalidated.
    assert_eq!(registry.get("law").await.unwrap().len(), 4);
    assert!(registry.invalidate("law"));
    assert_eq!(registry.get("law").await.unwrap().len(), 5);
}
