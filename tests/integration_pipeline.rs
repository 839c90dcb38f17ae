#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end pipeline against a mock OpenAI-compatible API:
// build an index from files on disk, load it back, then answer a question

use course_rag::answer::{Assistant, ChatModel, QueryError};
use course_rag::config::{Config, OpenAiConfig};
use course_rag::embeddings::Embedder;
use course_rag::index::IndexStore;
use course_rag::indexer::build_index;
use course_rag::openai::OpenAiClient;
use course_rag::retriever::Retriever;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Three-dimensional "topic" embedding: docker, forum, everything else
fn topic_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    vec![
        if lower.contains("docker") { 1.0 } else { 0.0 },
        if lower.contains("forum") { 1.0 } else { 0.0 },
        0.1,
    ]
}

fn embedding_response(request: &Request) -> ResponseTemplate {
    let body: Value = match serde_json::from_slice(&request.body) {
        Ok(body) => body,
        Err(_) => return ResponseTemplate::new(400),
    };
    let input = body["input"].as_str().unwrap_or_default();
    if input.contains("BROKEN") {
        return ResponseTemplate::new(500).set_body_string("model overloaded");
    }
    ResponseTemplate::new(200).set_body_json(json!({
        "object": "list",
        "data": [{ "object": "embedding", "index": 0, "embedding": topic_vector(input) }],
        "model": "text-embedding-3-small"
    }))
}

async fn mock_api() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(embedding_response)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Relevant Materials:"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "role": "assistant", "content": "Install Docker Desktop or use Podman." }
            }]
        })))
        .mount(&server)
        .await;
    server
}

fn write_corpus(base: &Path) {
    let course = base.join("data/course_content");
    fs::create_dir_all(course.join("tools")).expect("create course dir");
    fs::write(
        course.join("tools/docker.md"),
        "Docker lets you package the project with its dependencies. \
         Install Docker Desktop, or use Podman as a drop-in replacement for every assignment.",
    )
    .expect("write docker.md");
    fs::write(
        course.join("tools/python.py"),
        "# Python setup\n# Use uv to create a virtual environment and install the requirements \
         listed for the graded assignments in this course.\n",
    )
    .expect("write python.py");
    fs::write(
        course.join("tools/broken.txt"),
        "BROKEN file that the embedding service refuses to process no matter how often it is \
         retried by the indexer during the build.",
    )
    .expect("write broken.txt");

    let forum = base.join("data/discourse");
    fs::create_dir_all(&forum).expect("create forum dir");
    let topics = json!([{
        "id": 155,
        "title": "Where to ask questions",
        "url": "https://discourse.example.com/t/where-to-ask/155",
        "created_at": "2025-02-01T10:00:00Z",
        "posts": [
            { "username": "ta", "cooked": "<p>Please post graded assignment questions on the <b>forum</b> thread.</p>" },
            { "username": "student", "cooked": "<p>ok</p>" }
        ]
    }]);
    fs::write(forum.join("discourse_posts.json"), topics.to_string()).expect("write forum dump");
}

fn test_config(base: &Path, server: &MockServer) -> Config {
    Config {
        base_dir: base.to_path_buf(),
        openai: OpenAiConfig {
            base_url: format!("{}/v1", server.uri()),
            api_key: "sk-integration".to_string(),
            retry_attempts: 1,
            ..OpenAiConfig::default()
        },
        ..Config::default()
    }
}

fn client(config: &Config) -> Arc<OpenAiClient> {
    Arc::new(
        OpenAiClient::new(&config.openai)
            .expect("client should be created")
            .with_retry_delay(Duration::from_millis(1)),
    )
}

#[tokio::test]
async fn build_load_and_ask() {
    let server = mock_api().await;
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    write_corpus(temp_dir.path());
    let config = test_config(temp_dir.path(), &server);
    let client = client(&config);

    let report = build_index(&config, Arc::clone(&client) as Arc<dyn Embedder>)
        .await
        .expect("build should succeed");

    assert_eq!(report.collected, 4);
    assert_eq!(report.stored, 3);
    assert_eq!(report.dimension, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(
        report.failures[0].source_id,
        "data/course_content/tools/broken.txt"
    );

    let knowledge = IndexStore::new(config.index_root())
        .load()
        .expect("index should load");
    assert_eq!(knowledge.len(), 3);
    assert_eq!(knowledge.index().len(), knowledge.chunks().len());

    let retriever = Retriever::new(Arc::new(knowledge), Arc::clone(&client) as Arc<dyn Embedder>);
    let top = retriever
        .retrieve("How do I install Docker?", 2)
        .await
        .expect("retrieval should succeed");
    assert_eq!(top[0].source, "data/course_content/tools/docker.md");

    let assistant = Assistant::from_config(&config, retriever, client as Arc<dyn ChatModel>);
    let answer = assistant
        .ask("How do I install Docker?")
        .await
        .expect("question should be answered");

    assert_eq!(answer.text, "Install Docker Desktop or use Podman.");
    assert_eq!(answer.links.len(), 3);
    assert_eq!(answer.links[0].url, "data/course_content/tools/docker.md");
    assert!(answer.links[0].text.chars().count() <= 100);
    assert!(
        answer
            .links
            .iter()
            .any(|link| link.url == "https://discourse.example.com/t/where-to-ask/155")
    );
}

#[tokio::test]
async fn query_time_embedding_failure_is_reported() {
    let server = mock_api().await;
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    write_corpus(temp_dir.path());
    let config = test_config(temp_dir.path(), &server);
    let client = client(&config);

    build_index(&config, Arc::clone(&client) as Arc<dyn Embedder>)
        .await
        .expect("build should succeed");
    let knowledge = IndexStore::new(config.index_root())
        .load()
        .expect("index should load");
    let retriever = Retriever::new(Arc::new(knowledge), Arc::clone(&client) as Arc<dyn Embedder>);
    let assistant = Assistant::from_config(&config, retriever, client as Arc<dyn ChatModel>);

    let error = assistant
        .ask("BROKEN question")
        .await
        .expect_err("embedding should fail");

    assert!(matches!(error, QueryError::Embedding(_)));
    assert!(error.to_string().contains("500"));
}

#[tokio::test]
async fn serving_without_an_index_fails_to_load() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };

    let result = IndexStore::new(config.index_root()).load();

    assert!(result.is_err());
}
