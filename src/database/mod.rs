// Database module
// Dual database system: SQLite for document metadata, LanceDB for vectors

pub mod lancedb;
pub mod sqlite;

pub use self::lancedb::{ChunkVector, ScoredChunk};
pub use sqlite::*;

use async_trait::async_trait;

use crate::QaError;

/// Storage seam for chunk vectors.
///
/// The indexing orchestrator is the only writer and the retrieval service
/// the only reader; nothing else talks to the underlying store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the chunk collection sized for the given vector
    /// dimensionality. No-op when it already exists with that size.
    async fn ensure_collection(&self, dimensions: usize) -> Result<(), QaError>;

    /// Write vector entries keyed by `(document_id, chunk sequence)`.
    /// Calling again with identical input overwrites rather than duplicates.
    async fn upsert_chunks(
        &self,
        document_id: i64,
        game_id: i64,
        entries: &[ChunkVector],
    ) -> Result<usize, QaError>;

    /// Remove every vector entry for a document. Idempotent; succeeds even
    /// when no entries existed.
    async fn delete_document(&self, document_id: i64) -> Result<bool, QaError>;

    /// Number of vector entries currently stored for a document
    async fn count_document(&self, document_id: i64) -> Result<usize, QaError>;

    /// Top-`limit` entries for a game by descending similarity
    async fn search(
        &self,
        game_id: i64,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, QaError>;
}
