//! HTTP API tests against a live server on a free port.

use async_trait::async_trait;
use intellisphere::db;
use intellisphere::domain::DomainMap;
use intellisphere::embedding::HashEmbedder;
use intellisphere::error::GenerationError;
use intellisphere::generation::Generator;
use intellisphere::indexer::{build_index, BuildOptions};
use intellisphere::migrate;
use intellisphere::models::SourceDocument;
use intellisphere::registry::IndexRegistry;
use intellisphere::responder::Responder;
use intellisphere::server::{self, AppState, USER_HEADER};
use intellisphere::store::SqliteConversationStore;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

const DIMS: usize = 128;
const EMAIL: &str = "ana@example.com";

/// Replies with the size of the prompt it was given.
struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        Ok(format!("echo ({} chars)", prompt.len()))
    }
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Start a server with a built `law` index and a missing `home` index.
async fn start_server(tmp: &TempDir) -> String {
    let embedder = Arc::new(HashEmbedder::new(DIMS));
    let docs = vec![
        SourceDocument::new("Contract law basics", "contracts.txt"),
        SourceDocument::new("Tort law basics", "torts.txt"),
    ];
    let options = BuildOptions {
        max_chars: 1000,
        overlap_chars: 200,
        batch_size: 8,
    };
    build_index(&docs, embedder.as_ref(), &tmp.path().join("law"), &options)
        .await
        .unwrap();

    let mut locations = BTreeMap::new();
    locations.insert("law".to_string(), tmp.path().join("law"));
    locations.insert("home".to_string(), tmp.path().join("general"));
    let registry = Arc::new(IndexRegistry::new(
        DomainMap::new("home", locations),
        embedder,
    ));

    let pool = db::connect_path(&tmp.path().join("isx.sqlite"))
        .await
        .unwrap();
    migrate::migrate(&pool).await.unwrap();

    let responder = Arc::new(Responder::new(
        registry,
        Arc::new(SqliteConversationStore::new(pool.clone())),
        Arc::new(EchoGenerator),
        &Default::default(),
    ));

    let port = find_free_port();
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap();
    let state = AppState::new(responder, pool);
    tokio::spawn(async move {
        let _ = server::serve(listener, state).await;
    });
    wait_for_server(port).await;
    format!("http://127.0.0.1:{}", port)
}

async fn signup(client: &reqwest::Client, base: &str) {
    let resp = client
        .post(format!("{}/signup", base))
        .json(&json!({"firstname": "Ana", "email": EMAIL, "password_hash": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
}

async fn post(client: &reqwest::Client, base: &str, path: &str, body: Value) -> (u16, Value) {
    let resp = client
        .post(format!("{}{}", base, path))
        .header(USER_HEADER, EMAIL)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn test_health() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;

    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_signup_duplicate_is_conflict() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();
    signup(&client, &base).await;

    let resp = client
        .post(format!("{}/signup", base))
        .json(&json!({"firstname": "Ana", "email": "ANA@example.com", "password_hash": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "conflict");
}

#[tokio::test]
async fn test_chat_requires_registered_user() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let (status, body) = post(&client, &base, "/chat", json!({"query": "hi"})).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "unauthorized");
    assert_eq!(body["error"]["message"], "Please log in to continue");

    let resp = client
        .post(format!("{}/chat", base))
        .json(&json!({"query": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_chat_then_history() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();
    signup(&client, &base).await;

    let (status, first) = post(
        &client,
        &base,
        "/chat",
        json!({"query": "what is tort law", "domain": "law"}),
    )
    .await;
    assert_eq!(status, 200, "body: {}", first);
    assert_eq!(first["domain"], "law");
    let session_id = first["session_id"].as_str().unwrap().to_string();
    assert_eq!(session_id.len(), 16);
    assert_eq!(first["history"].as_array().unwrap().len(), 1);

    let (_, second) = post(
        &client,
        &base,
        "/chat",
        json!({"query": "and contracts?", "domain": "law", "session_id": session_id}),
    )
    .await;
    let history = second["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["user"], "what is tort law");
    assert_eq!(history[1]["user"], "and contracts?");

    let (status, body) = post(
        &client,
        &base,
        "/sessions/history",
        json!({"domain": "law", "session_id": session_id}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["history"], second["history"]);
    assert!(body["created_at"].is_string());
    assert!(body["last_updated"].is_string());
}

#[tokio::test]
async fn test_domain_from_referrer() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();
    signup(&client, &base).await;

    let resp = client
        .post(format!("{}/chat", base))
        .header(USER_HEADER, EMAIL)
        .header("referer", "https://intellisphere.example/law?tab=chat")
        .json(&json!({"query": "what is tort law"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["domain"], "law");
}

#[tokio::test]
async fn test_missing_index_is_unavailable_and_records_nothing() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();
    signup(&client, &base).await;

    let (status, body) = post(
        &client,
        &base,
        "/chat",
        json!({"query": "hello", "domain": "home", "session_id": "s1"}),
    )
    .await;
    assert_eq!(status, 503);
    assert_eq!(body["error"]["code"], "index_unavailable");

    let (_, body) = post(
        &client,
        &base,
        "/sessions/history",
        json!({"domain": "home", "session_id": "s1"}),
    )
    .await;
    assert_eq!(body["history"], json!([]));
    assert!(body["created_at"].is_null());
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();
    signup(&client, &base).await;

    let (status, body) = post(&client, &base, "/chat", json!({"query": "  ", "domain": "law"})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_session_new_list_delete() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();
    signup(&client, &base).await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let (status, body) = post(&client, &base, "/sessions/new", json!({"domain": "law"})).await;
        assert_eq!(status, 200);
        ids.push(body["session_id"].as_str().unwrap().to_string());
    }

    let (_, body) = post(&client, &base, "/sessions/list", json!({"domain": "law"})).await;
    let listed: Vec<&str> = body["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["session_id"].as_str().unwrap())
        .collect();
    assert_eq!(listed.len(), 3);
    for id in &ids {
        assert!(listed.contains(&id.as_str()));
    }

    let (status, body) = post(
        &client,
        &base,
        "/sessions/delete",
        json!({"domain": "law", "session_id": ids[0]}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["deleted"], 1);

    let (_, body) = post(&client, &base, "/sessions/delete", json!({"domain": "law"})).await;
    assert_eq!(body["deleted"], 2);

    let (_, body) = post(&client, &base, "/sessions/list", json!({"domain": "law"})).await;
    assert_eq!(body["sessions"], json!([]));
}

#[tokio::test]
async fn test_history_requires_session_id() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();
    signup(&client, &base).await;

    let (status, _) = post(&client, &base, "/sessions/history", json!({"domain": "law"})).await;
    assert_eq!(status, 400);
}
