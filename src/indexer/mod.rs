// Indexer module
// Coordinates chunking, embedding, and vector storage for one document


pub mod consistency;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::chunker::TextChunker;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::{IndexRecord, IndexStatus};
use crate::database::{ChunkVector, VectorIndex};
use crate::embeddings::EmbeddingProvider;

pub use consistency::{ConsistencyReport, ConsistencyValidator, CountMismatch};

/// Typed outcome of an indexing request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("document {0} not found")]
    DocumentNotFound(i64),

    #[error("document {0} has no extracted text yet")]
    TextExtractionRequired(i64),

    #[error("embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("vector indexing failed: {0}")]
    IndexingFailed(String),

    #[error("database error: {0}")]
    Database(String),
}

/// Flattened view of an index record returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecordSummary {
    pub document_id: i64,
    pub status: IndexStatus,
    pub chunk_count: i64,
    pub total_chars: i64,
    pub indexed_at: Option<NaiveDateTime>,
    pub embedding_model: String,
    pub embedding_dimension: i64,
    pub error_message: Option<String>,
}

impl From<IndexRecord> for IndexRecordSummary {
    #[inline]
    fn from(record: IndexRecord) -> Self {
        Self {
            document_id: record.document_id,
            status: record.status,
            chunk_count: record.chunk_count,
            total_chars: record.total_chars,
            indexed_at: record.indexed_at,
            embedding_model: record.embedding_model,
            embedding_dimension: record.embedding_dimension,
            error_message: record.error_message,
        }
    }
}

/// Orchestrates the indexing pipeline for documents.
///
/// Owns every transition of the per-document index record: no other
/// component writes its status. Vector entries for a document are always
/// deleted before new ones are written, so a re-run can never leave stale
/// entries beside fresh ones.
pub struct IndexingService {
    database: Database,
    embeddings: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<dyn VectorIndex>,
    chunker: TextChunker,
    // Serializes concurrent index attempts for the same document id
    document_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl IndexingService {
    #[inline]
    pub fn new(
        database: Database,
        embeddings: Arc<dyn EmbeddingProvider>,
        vector_index: Arc<dyn VectorIndex>,
        chunker: TextChunker,
    ) -> Self {
        Self {
            database,
            embeddings,
            vector_index,
            chunker,
            document_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Index (or re-index) one document end to end.
    ///
    /// Preconditions: the document must exist and carry extracted text.
    /// On success the index record is `completed` with counts and timestamps
    /// filled in; on any step failure it is `failed` with a descriptive
    /// message so the failure is observable rather than silent.
    #[inline]
    pub async fn index_document(
        &self,
        document_id: i64,
    ) -> Result<IndexRecordSummary, IndexError> {
        let lock = self.document_lock(document_id).await;
        let _guard = lock.lock().await;

        let document = self
            .database
            .get_document(document_id)
            .await
            .map_err(|e| IndexError::Database(format!("{:#}", e)))?
            .ok_or(IndexError::DocumentNotFound(document_id))?;

        let text = match &document.extracted_text {
            Some(text) if !text.trim().is_empty() => text.clone(),
            _ => return Err(IndexError::TextExtractionRequired(document_id)),
        };

        info!("Indexing document {} ({})", document_id, document.title);

        self.database
            .begin_index_processing(document_id)
            .await
            .map_err(|e| IndexError::Database(format!("{:#}", e)))?;

        // Purge old vectors before writing any new ones; the delete must
        // finish before the upsert starts or a re-run could leave duplicates
        if let Err(e) = self.vector_index.delete_document(document_id).await {
            return self
                .fail(document_id, IndexError::IndexingFailed(e.to_string()))
                .await;
        }

        let page_map = match document.page_offset_map() {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    "Ignoring unreadable page offset map for document {}: {}",
                    document_id, e
                );
                None
            }
        };

        let chunks = self.chunker.chunk(&text, page_map.as_ref());
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let vectors = match self.embeddings.embed_many(&texts).await {
            Ok(vectors) => vectors,
            Err(e) => {
                return self
                    .fail(document_id, IndexError::EmbeddingFailed(format!("{:#}", e)))
                    .await;
            }
        };

        if let Err(e) = self
            .vector_index
            .ensure_collection(self.embeddings.dimensions())
            .await
        {
            return self
                .fail(document_id, IndexError::IndexingFailed(e.to_string()))
                .await;
        }

        let entries: Vec<ChunkVector> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkVector::new(chunk, vector))
            .collect();

        if let Err(e) = self
            .vector_index
            .upsert_chunks(document_id, document.game_id, &entries)
            .await
        {
            return self
                .fail(document_id, IndexError::IndexingFailed(e.to_string()))
                .await;
        }

        let record = self
            .database
            .complete_index_record(
                document_id,
                entries.len() as i64,
                text.chars().count() as i64,
                self.embeddings.model_id(),
                self.embeddings.dimensions() as i64,
            )
            .await
            .map_err(|e| IndexError::Database(format!("{:#}", e)))?;

        info!(
            "Indexed document {} into {} chunks",
            document_id, record.chunk_count
        );

        Ok(record.into())
    }

    /// Current index record for a document, if indexing was ever started
    #[inline]
    pub async fn index_status(
        &self,
        document_id: i64,
    ) -> Result<Option<IndexRecordSummary>, IndexError> {
        let record = self
            .database
            .get_index_record(document_id)
            .await
            .map_err(|e| IndexError::Database(format!("{:#}", e)))?;
        Ok(record.map(IndexRecordSummary::from))
    }

    /// Delete a document along with its index record and vector entries
    #[inline]
    pub async fn delete_document(&self, document_id: i64) -> Result<bool, IndexError> {
        let lock = self.document_lock(document_id).await;
        let _guard = lock.lock().await;

        self.vector_index
            .delete_document(document_id)
            .await
            .map_err(|e| IndexError::IndexingFailed(e.to_string()))?;

        self.database
            .delete_document(document_id)
            .await
            .map_err(|e| IndexError::Database(format!("{:#}", e)))
    }

    /// Re-run indexing for documents whose record has been stuck in
    /// `processing` longer than `max_age`. These are attempts that died
    /// between the vector delete and the final status write.
    #[inline]
    pub async fn recover_stale(
        &self,
        max_age: chrono::Duration,
    ) -> Result<Vec<IndexRecordSummary>, IndexError> {
        let stale = self
            .database
            .stale_index_records(max_age)
            .await
            .map_err(|e| IndexError::Database(format!("{:#}", e)))?;

        if stale.is_empty() {
            return Ok(Vec::new());
        }

        info!("Recovering {} stale indexing attempts", stale.len());

        let mut summaries = Vec::with_capacity(stale.len());
        for record in stale {
            match self.index_document(record.document_id).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    error!(
                        "Recovery re-index failed for document {}: {}",
                        record.document_id, e
                    );
                    if let Some(summary) = self.index_status(record.document_id).await? {
                        summaries.push(summary);
                    }
                }
            }
        }

        Ok(summaries)
    }

    /// Cross-check the relational records against the vector store
    #[inline]
    pub async fn validate_consistency(
        &self,
        stale_after: chrono::Duration,
    ) -> Result<ConsistencyReport, IndexError> {
        ConsistencyValidator::new(&self.database, self.vector_index.as_ref())
            .validate(stale_after)
            .await
    }

    async fn document_lock(&self, document_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.document_locks.lock().await;
        Arc::clone(
            locks
                .entry(document_id)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Record a failure on the index record, then surface the error
    async fn fail(
        &self,
        document_id: i64,
        index_error: IndexError,
    ) -> Result<IndexRecordSummary, IndexError> {
        if let Err(db_error) = self
            .database
            .fail_index_record(document_id, &index_error.to_string())
            .await
        {
            error!(
                "Failed to record indexing failure for document {}: {}",
                document_id, db_error
            );
        }
        Err(index_error)
    }
}
