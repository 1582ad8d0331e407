#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests for the indexing and retrieval pipeline, run against a
// wiremock embedding endpoint and temp-dir SQLite + LanceDB stores.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use rulebook_qa::chunker::{ChunkerConfig, TextChunker};
use rulebook_qa::config::{Config, RetrievalConfig};
use rulebook_qa::database::VectorIndex;
use rulebook_qa::database::lancedb::VectorStore;
use rulebook_qa::database::sqlite::Database;
use rulebook_qa::database::sqlite::models::{IndexStatus, NewDocument};
use rulebook_qa::embeddings::EmbeddingProvider;
use rulebook_qa::embeddings::ollama::OllamaClient;
use rulebook_qa::indexer::IndexingService;
use rulebook_qa::retrieval::{NOT_FOUND_ANSWER, RetrievalService};

const DIM: usize = 32;

const SCENARIO_TEXT: &str =
    "Setup: place 4 pawns on the board. Win by capturing all opponent pawns.";

/// Character-trigram embedding with the same shape a real provider returns.
/// Shared vocabulary between query and passage produces nonzero cosine
/// similarity, which is all retrieval needs.
fn embed_text(text: &str) -> Vec<f32> {
    let mut vector = vec![0f32; DIM];
    let lowered = text.to_lowercase();
    let chars: Vec<char> = lowered.chars().collect();

    for window in chars.windows(3) {
        let mut hash = 1469598103934665603u64;
        for c in window {
            for byte in (*c as u32).to_le_bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(1099511628211);
            }
        }
        let bucket = (hash % vector.len() as u64) as usize;
        vector[bucket] += 1.0;
    }

    let magnitude = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in &mut vector {
            *value /= magnitude;
        }
    }

    vector
}

struct NgramEmbeddings;

impl Respond for NgramEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).expect("request body should be json");
        let inputs = body["input"].as_array().expect("input should be an array");
        let embeddings: Vec<Vec<f32>> = inputs
            .iter()
            .map(|t| embed_text(t.as_str().unwrap_or_default()))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

struct TestStack {
    database: Database,
    store: Arc<VectorStore>,
    indexing: IndexingService,
    retrieval: RetrievalService,
    _server: MockServer,
    _temp_dir: TempDir,
}

async fn build_stack(server: MockServer, chunking: ChunkerConfig) -> TestStack {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let address = server.address();

    let mut config = Config {
        base_dir: Some(temp_dir.path().to_path_buf()),
        ..Config::default()
    };
    config.embedding.host = address.ip().to_string();
    config.embedding.port = address.port();
    config.embedding.model = "test-embed".to_string();
    config.embedding.dimension = DIM as u32;
    // Trigram vectors score lower than a real model's, so gate gently
    config.retrieval = RetrievalConfig {
        min_score: 0.02,
        ..RetrievalConfig::default()
    };

    let database = Database::initialize_from_config_dir(temp_dir.path())
        .await
        .expect("should create database");
    let store = Arc::new(
        VectorStore::new(&config)
            .await
            .expect("should create vector store"),
    );
    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(
        OllamaClient::new(&config.embedding).expect("should create embedding client"),
    );

    let indexing = IndexingService::new(
        database.clone(),
        Arc::clone(&embeddings),
        Arc::clone(&store) as Arc<dyn VectorIndex>,
        TextChunker::new(chunking),
    );
    let retrieval = RetrievalService::new(
        embeddings,
        Arc::clone(&store) as Arc<dyn VectorIndex>,
        config.retrieval.clone(),
    );

    TestStack {
        database,
        store,
        indexing,
        retrieval,
        _server: server,
        _temp_dir: temp_dir,
    }
}

async fn embedding_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(NgramEmbeddings)
        .mount(&server)
        .await;
    server
}

async fn add_document(stack: &TestStack, game_id: i64, text: &str) -> i64 {
    add_document_with_pages(stack, game_id, text, None).await
}

async fn add_document_with_pages(
    stack: &TestStack,
    game_id: i64,
    text: &str,
    page_offsets: Option<&str>,
) -> i64 {
    let document = stack
        .database
        .create_document(NewDocument {
            game_id,
            title: "Integration Rulebook".to_string(),
        })
        .await
        .expect("should create document");
    stack
        .database
        .attach_extracted_text(document.id, text, page_offsets)
        .await
        .expect("should attach text");
    document.id
}

#[tokio::test]
async fn index_then_answer_happy_path() {
    let stack = build_stack(
        embedding_server().await,
        ChunkerConfig {
            target_size: 40,
            overlap: 10,
        },
    )
    .await;

    let document_id = add_document(&stack, 3, SCENARIO_TEXT).await;

    let summary = stack
        .indexing
        .index_document(document_id)
        .await
        .expect("indexing should succeed");

    assert_eq!(summary.status, IndexStatus::Completed);
    assert!(summary.chunk_count >= 2, "expected at least 2 chunks");
    assert_eq!(summary.embedding_dimension, DIM as i64);
    assert!(summary.indexed_at.is_some());

    let answer = stack
        .retrieval
        .answer(3, "how do you win?")
        .await
        .expect("answer should succeed");

    assert_ne!(answer.answer, NOT_FOUND_ANSWER);
    assert!(answer.is_grounded());
    let cited_text: String = answer
        .citations
        .iter()
        .map(|c| c.passage.as_str())
        .collect();
    assert!(
        cited_text.contains("capturing all opponent pawns"),
        "citations should carry the winning rule: {:?}",
        answer.citations
    );
    // The core never invents a confidence signal
    assert!(answer.confidence.is_none());
}

#[tokio::test]
async fn reindex_after_edit_leaves_only_new_vectors() {
    let stack = build_stack(
        embedding_server().await,
        ChunkerConfig {
            target_size: 60,
            overlap: 10,
        },
    )
    .await;

    let v1 = "Deal five cards to each player. The oldest player begins. Play proceeds \
              clockwise around the table. A turn has three phases: draw, trade, build. \
              Trading is optional but drawing is not.";
    let v2 = "Deal five cards to each player. The oldest player begins.";

    let chunker = TextChunker::new(ChunkerConfig {
        target_size: 60,
        overlap: 10,
    });
    let v1_chunks = chunker.chunk(v1, None).len();
    let v2_chunks = chunker.chunk(v2, None).len();
    assert!(v1_chunks > v2_chunks, "edit should shrink the chunk count");

    let document_id = add_document(&stack, 5, v1).await;
    stack
        .indexing
        .index_document(document_id)
        .await
        .expect("first indexing should succeed");
    assert_eq!(
        stack
            .store
            .count_document(document_id)
            .await
            .expect("should count"),
        v1_chunks
    );

    stack
        .database
        .attach_extracted_text(document_id, v2, None)
        .await
        .expect("should attach edited text");
    let summary = stack
        .indexing
        .index_document(document_id)
        .await
        .expect("re-indexing should succeed");

    assert_eq!(summary.chunk_count, v2_chunks as i64);
    assert_eq!(
        stack
            .store
            .count_document(document_id)
            .await
            .expect("should count"),
        v2_chunks
    );

    let records = stack
        .database
        .list_index_records()
        .await
        .expect("should list records");
    assert_eq!(records.len(), 1, "re-indexing must never add a second record");
}

#[tokio::test]
async fn page_numbers_travel_from_offset_map_to_search_results() {
    let stack = build_stack(
        embedding_server().await,
        ChunkerConfig {
            target_size: 40,
            overlap: 10,
        },
    )
    .await;

    let pages = r#"{"boundaries":[{"char_offset":0,"page_number":1},{"char_offset":35,"page_number":2}]}"#;
    let document_id = add_document_with_pages(&stack, 9, SCENARIO_TEXT, Some(pages)).await;

    stack
        .indexing
        .index_document(document_id)
        .await
        .expect("indexing should succeed");

    let query_vector = embed_text("win");
    let results = stack
        .store
        .search(9, &query_vector, 10)
        .await
        .expect("search should succeed");

    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.page_number.is_some()));
    assert!(results.iter().any(|r| r.page_number == Some(1)));
}

#[tokio::test]
async fn transient_embedding_failure_is_retried_once_then_succeeds() {
    let server = MockServer::start().await;

    // First call times out with a 500; the retry must succeed, and the
    // gateway must have been invoked exactly twice in total
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(NgramEmbeddings)
        .expect(1)
        .mount(&server)
        .await;

    let stack = build_stack(
        server,
        ChunkerConfig {
            target_size: 200,
            overlap: 20,
        },
    )
    .await;

    let document_id = add_document(&stack, 2, SCENARIO_TEXT).await;

    let summary = stack
        .indexing
        .index_document(document_id)
        .await
        .expect("indexing should succeed after one retry");
    assert_eq!(summary.status, IndexStatus::Completed);
    // MockServer verifies the expected call counts on drop
}

#[tokio::test]
async fn asking_an_unindexed_game_returns_the_sentinel() {
    let stack = build_stack(
        embedding_server().await,
        ChunkerConfig {
            target_size: 40,
            overlap: 10,
        },
    )
    .await;

    // Index into game 3, then ask about game 4
    let document_id = add_document(&stack, 3, SCENARIO_TEXT).await;
    stack
        .indexing
        .index_document(document_id)
        .await
        .expect("indexing should succeed");

    let answer = stack
        .retrieval
        .answer(4, "how do you win?")
        .await
        .expect("answer should succeed");

    assert_eq!(answer.answer, NOT_FOUND_ANSWER);
    assert!(answer.citations.is_empty());
}

#[tokio::test]
async fn unextracted_document_writes_no_vectors() {
    let stack = build_stack(
        embedding_server().await,
        ChunkerConfig {
            target_size: 40,
            overlap: 10,
        },
    )
    .await;

    let document = stack
        .database
        .create_document(NewDocument {
            game_id: 1,
            title: "Pending Extraction".to_string(),
        })
        .await
        .expect("should create document");

    let result = stack.indexing.index_document(document.id).await;
    assert!(result.is_err());
    assert_eq!(
        stack
            .store
            .count_document(document.id)
            .await
            .expect("should count"),
        0
    );
}
