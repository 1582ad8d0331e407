use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::chunker::{PageOffsetMap, TextChunker};
use crate::config::Config;
use crate::database::VectorIndex;
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::NewDocument;
use crate::embeddings::EmbeddingProvider;
use crate::embeddings::ollama::OllamaClient;
use crate::indexer::{IndexError, IndexRecordSummary, IndexingService};
use crate::retrieval::{QaAnswer, RetrievalService, SearchOutcome};

/// Everything the CLI commands need, wired from one config
pub struct Services {
    pub database: Database,
    pub indexing: IndexingService,
    pub retrieval: RetrievalService,
}

impl Services {
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let base_dir = config
            .get_base_dir()
            .context("Failed to resolve base directory")?;

        let database = Database::initialize_from_config_dir(&base_dir)
            .await
            .context("Failed to initialize metadata database")?;

        let vector_index: Arc<dyn VectorIndex> = Arc::new(
            VectorStore::new(config)
                .await
                .context("Failed to initialize vector store")?,
        );

        let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(
            OllamaClient::new(&config.embedding)
                .context("Failed to initialize embedding client")?,
        );

        let chunker = TextChunker::new(config.chunking);

        let indexing = IndexingService::new(
            database.clone(),
            Arc::clone(&embeddings),
            Arc::clone(&vector_index),
            chunker,
        );
        let retrieval =
            RetrievalService::new(embeddings, vector_index, config.retrieval.clone());

        Ok(Self {
            database,
            indexing,
            retrieval,
        })
    }

    #[inline]
    pub async fn load() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::from_config(&config).await
    }
}

/// Register a rulebook document and index it from a pre-extracted text file.
/// The text file stands in for the upstream PDF extraction step.
#[inline]
pub async fn add_document(
    game_id: i64,
    title: String,
    text_file: &Path,
    pages_file: Option<&Path>,
) -> Result<()> {
    let text = std::fs::read_to_string(text_file)
        .with_context(|| format!("Failed to read text file: {}", text_file.display()))?;

    if text.trim().is_empty() {
        anyhow::bail!("Text file is empty: {}", text_file.display());
    }

    let page_offsets = match pages_file {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read page offset file: {}", path.display()))?;
            // Parse up front so a malformed map is rejected at ingestion
            let _: PageOffsetMap = serde_json::from_str(&json)
                .with_context(|| format!("Invalid page offset map: {}", path.display()))?;
            Some(json)
        }
        None => None,
    };

    let services = Services::load().await?;

    let document = services
        .database
        .create_document(NewDocument { game_id, title })
        .await
        .context("Failed to create document")?;

    services
        .database
        .attach_extracted_text(document.id, &text, page_offsets.as_deref())
        .await
        .context("Failed to attach extracted text")?;

    println!("Created document: {} (ID: {})", document.title, document.id);

    info!("Indexing newly added document {}", document.id);
    match services.indexing.index_document(document.id).await {
        Ok(summary) => print_summary(&summary),
        Err(e) => println!("Indexing failed: {}", e),
    }

    Ok(())
}

/// Index (or re-index) a document by id
#[inline]
pub async fn index_document(document_id: i64) -> Result<()> {
    let services = Services::load().await?;

    match services.indexing.index_document(document_id).await {
        Ok(summary) => print_summary(&summary),
        Err(IndexError::DocumentNotFound(id)) => {
            println!("Document {} does not exist.", id);
        }
        Err(IndexError::TextExtractionRequired(id)) => {
            println!(
                "Document {} has no extracted text yet; wait for extraction to finish.",
                id
            );
        }
        Err(e) => println!("Indexing failed: {}", e),
    }

    Ok(())
}

/// Answer a question against a game's indexed rulebooks
#[inline]
pub async fn ask(game_id: i64, query: &str) -> Result<()> {
    let services = Services::load().await?;

    let answer = services
        .retrieval
        .answer(game_id, query)
        .await
        .context("Failed to answer question")?;

    print_answer(&answer);
    Ok(())
}

/// Print raw similarity search results for a query
#[inline]
pub async fn search_passages(game_id: i64, query: &str, limit: usize) -> Result<()> {
    let services = Services::load().await?;

    match services
        .retrieval
        .search(game_id, query, limit)
        .await
        .context("Search failed")?
    {
        SearchOutcome::NoRelevantContent => {
            println!("No relevant passages found for game {}.", game_id);
        }
        SearchOutcome::Found(results) => {
            println!("Found {} passages:", results.len());
            println!();
            for chunk in &results {
                let page = chunk
                    .page_number
                    .map_or_else(|| "-".to_string(), |p| p.to_string());
                println!(
                    "  [{:.3}] doc {} chunk {} (page {})",
                    chunk.score, chunk.document_id, chunk.chunk_index, page
                );
                println!("        {}", chunk.content.replace('\n', " "));
            }
        }
    }

    Ok(())
}

/// Stitch the most relevant passages into a source-labelled explanation
#[inline]
pub async fn explain(game_id: i64, query: &str) -> Result<()> {
    let services = Services::load().await?;

    let answer = services
        .retrieval
        .explain(game_id, query)
        .await
        .context("Failed to build explanation")?;

    print_answer(&answer);
    Ok(())
}

/// Show indexing status for one document or every document
#[inline]
pub async fn show_status(document_id: Option<i64>) -> Result<()> {
    let services = Services::load().await?;

    match document_id {
        Some(id) => match services.indexing.index_status(id).await {
            Ok(Some(summary)) => print_summary(&summary),
            Ok(None) => println!("Document {} has never been indexed.", id),
            Err(e) => println!("Failed to query status: {}", e),
        },
        None => {
            let records = services
                .database
                .list_index_records()
                .await
                .context("Failed to list index records")?;

            if records.is_empty() {
                println!("No documents have been indexed yet.");
                println!("Use 'rulebook-qa add <game-id> <title> --text-file <path>' to add one.");
                return Ok(());
            }

            println!("Index records ({} total):", records.len());
            println!();
            for record in records {
                print_summary(&IndexRecordSummary::from(record));
            }
        }
    }

    Ok(())
}

/// Cross-check the relational store against the vector store, optionally
/// re-running indexing for anything stuck or drifted
#[inline]
pub async fn check_consistency(repair: bool) -> Result<()> {
    let services = Services::load().await?;
    let stale_after = chrono::Duration::minutes(10);

    let report = services
        .indexing
        .validate_consistency(stale_after)
        .await
        .context("Consistency validation failed")?;

    println!("{}", report.summary());

    for document_id in &report.stale_processing {
        println!("  stuck in processing: document {}", document_id);
    }
    for mismatch in &report.count_mismatches {
        println!(
            "  count mismatch: document {} records {} chunks, stores {} vectors",
            mismatch.document_id, mismatch.recorded_chunks, mismatch.stored_vectors
        );
    }

    if report.is_consistent || !repair {
        return Ok(());
    }

    println!();
    println!("Re-indexing affected documents...");

    let recovered = services
        .indexing
        .recover_stale(stale_after)
        .await
        .context("Stale recovery failed")?;
    for summary in &recovered {
        print_summary(summary);
    }

    for mismatch in &report.count_mismatches {
        match services.indexing.index_document(mismatch.document_id).await {
            Ok(summary) => print_summary(&summary),
            Err(e) => println!("  document {}: {}", mismatch.document_id, e),
        }
    }

    Ok(())
}

/// Delete a document, its index record, and its vectors
#[inline]
pub async fn delete_document(document_id: i64) -> Result<()> {
    let services = Services::load().await?;

    if services
        .indexing
        .delete_document(document_id)
        .await
        .context("Failed to delete document")?
    {
        println!("Deleted document {}.", document_id);
    } else {
        println!("Document {} does not exist.", document_id);
    }

    Ok(())
}

fn print_summary(summary: &IndexRecordSummary) {
    println!("Document {} — {}", summary.document_id, summary.status);
    if summary.chunk_count > 0 {
        println!(
            "  {} chunks, {} characters, model {} ({} dims)",
            summary.chunk_count,
            summary.total_chars,
            summary.embedding_model,
            summary.embedding_dimension
        );
    }
    if let Some(indexed_at) = summary.indexed_at {
        println!("  indexed at {}", indexed_at.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(error) = &summary.error_message {
        println!("  error: {}", error);
    }
}

fn print_answer(answer: &QaAnswer) {
    println!("{}", answer.answer);

    if answer.citations.is_empty() {
        return;
    }

    println!();
    println!("Sources:");
    for citation in &answer.citations {
        let page = citation
            .page_number
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        println!(
            "  [{:.3}] document {}, page {}",
            citation.score, citation.document_id, page
        );
    }

    if let Some(confidence) = answer.confidence {
        println!();
        println!("Confidence: {:.2}", confidence);
    }
}
