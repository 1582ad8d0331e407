// LanceDB vector database module
// Handles vector storage and similarity search for rulebook chunks

pub mod vector_store;

pub use vector_store::VectorStore;

use serde::{Deserialize, Serialize};

use crate::chunker::Chunk;

/// A chunk paired with its embedding vector, ready for storage
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkVector {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

impl ChunkVector {
    #[inline]
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self { chunk, vector }
    }
}

/// A stored chunk returned from similarity search, carrying the payload
/// written at indexing time plus the similarity score for this query.
///
/// `score` maps the store's cosine distance onto [0, 1], higher is more
/// similar; `distance` is the raw store-native value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub document_id: i64,
    pub game_id: i64,
    pub chunk_index: u32,
    pub content: String,
    pub page_number: Option<u32>,
    pub char_start: u32,
    pub char_end: u32,
    pub score: f32,
    pub distance: f32,
}
