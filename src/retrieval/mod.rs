// Retrieval module
// Embeds queries, searches the vector store, and assembles grounded answers


use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::settings::RetrievalConfig;
use crate::database::{ScoredChunk, VectorIndex};
use crate::embeddings::EmbeddingProvider;

/// Literal response returned whenever no retrieved passage can ground an
/// answer. Nothing is ever generated or inferred in its place.
pub const NOT_FOUND_ANSWER: &str = "Not found in the provided material.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetrievalError {
    #[error("no query provided")]
    NoQueryProvided,

    #[error("query embedding failed: {0}")]
    QueryEmbeddingFailed(String),

    #[error("search failed: {0}")]
    SearchFailed(String),
}

/// Search result distinguishing the valid "nothing relevant" outcome from
/// system errors; the two call for different user actions
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(Vec<ScoredChunk>),
    NoRelevantContent,
}

/// One source passage backing an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: i64,
    pub passage: String,
    pub page_number: Option<u32>,
    /// Line anchor within the source page; callers fill this in when their
    /// extraction step tracks one
    pub line: Option<u32>,
    pub score: f32,
}

impl From<&ScoredChunk> for Citation {
    #[inline]
    fn from(chunk: &ScoredChunk) -> Self {
        Self {
            document_id: chunk.document_id,
            passage: chunk.content.clone(),
            page_number: chunk.page_number,
            line: None,
            score: chunk.score,
        }
    }
}

/// Token accounting reported by a downstream generative step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A grounded answer with its supporting citations.
///
/// `confidence` and `usage` are pass-through slots for whatever signal a
/// downstream generative step reports; they stay `None` rather than being
/// fabricated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub confidence: Option<f32>,
    pub usage: Option<TokenUsage>,
}

impl QaAnswer {
    #[inline]
    pub fn is_grounded(&self) -> bool {
        !self.citations.is_empty()
    }

    #[inline]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    #[inline]
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    fn not_found() -> Self {
        Self {
            answer: NOT_FOUND_ANSWER.to_string(),
            citations: Vec::new(),
            confidence: None,
            usage: None,
        }
    }
}

/// Answers questions from indexed rulebook passages.
///
/// Read-only consumer of the vector store; indexing is the orchestrator's
/// side of the shared collection.
pub struct RetrievalService {
    embeddings: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
}

impl RetrievalService {
    #[inline]
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        vector_index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embeddings,
            vector_index,
            config,
        }
    }

    /// Embed the query and return the `top_k` most similar passages for the
    /// game. Empty queries are rejected locally without any provider call.
    #[inline]
    pub async fn search(
        &self,
        game_id: i64,
        query: &str,
        top_k: usize,
    ) -> Result<SearchOutcome, RetrievalError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::NoQueryProvided);
        }

        debug!("Searching game {} for: {}", game_id, query);

        let vectors = self
            .embeddings
            .embed_many(&[query.to_string()])
            .await
            .map_err(|e| RetrievalError::QueryEmbeddingFailed(format!("{:#}", e)))?;

        let query_vector = vectors.into_iter().next().ok_or_else(|| {
            RetrievalError::QueryEmbeddingFailed("provider returned no vector".to_string())
        })?;

        let results = self
            .vector_index
            .search(game_id, &query_vector, top_k)
            .await
            .map_err(|e| RetrievalError::SearchFailed(e.to_string()))?;

        if results.is_empty() {
            debug!("No passages stored for game {}", game_id);
            return Ok(SearchOutcome::NoRelevantContent);
        }

        Ok(SearchOutcome::Found(results))
    }

    /// Answer a question strictly from retrieved passage text.
    ///
    /// When no passage clears the configured relevance bar the literal
    /// not-found response comes back instead; missing context is never
    /// papered over with generated content.
    #[inline]
    pub async fn answer(&self, game_id: i64, query: &str) -> Result<QaAnswer, RetrievalError> {
        let results = match self.search(game_id, query, self.config.top_k).await? {
            SearchOutcome::Found(results) => results,
            SearchOutcome::NoRelevantContent => return Ok(QaAnswer::not_found()),
        };

        let relevant = self.clear_relevance_bar(results);
        let Some(best) = relevant.first() else {
            return Ok(QaAnswer::not_found());
        };

        info!(
            "Answering from document {} chunk {} (score {:.3})",
            best.document_id, best.chunk_index, best.score
        );

        Ok(QaAnswer {
            answer: best.content.clone(),
            citations: relevant.iter().map(Citation::from).collect(),
            confidence: None,
            usage: None,
        })
    }

    /// Stitch the highest-scoring passages together verbatim, labelled by
    /// source. No generative step is involved at all.
    #[inline]
    pub async fn explain(&self, game_id: i64, query: &str) -> Result<QaAnswer, RetrievalError> {
        let results = match self
            .search(game_id, query, self.config.synthesis_top_k)
            .await?
        {
            SearchOutcome::Found(results) => results,
            SearchOutcome::NoRelevantContent => return Ok(QaAnswer::not_found()),
        };

        let relevant = self.clear_relevance_bar(results);
        if relevant.is_empty() {
            return Ok(QaAnswer::not_found());
        }

        let stitched = relevant
            .iter()
            .map(|chunk| match chunk.page_number {
                Some(page) => format!(
                    "[Document {}, page {}] {}",
                    chunk.document_id, page, chunk.content
                ),
                None => format!("[Document {}] {}", chunk.document_id, chunk.content),
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        Ok(QaAnswer {
            answer: stitched,
            citations: relevant.iter().map(Citation::from).collect(),
            confidence: None,
            usage: None,
        })
    }

    /// Drop passages below the configured minimum score. Results arrive
    /// sorted by descending similarity, so the survivors stay ordered.
    fn clear_relevance_bar(&self, results: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        let before = results.len();
        let relevant: Vec<ScoredChunk> = results
            .into_iter()
            .filter(|chunk| chunk.score >= self.config.min_score)
            .collect();

        if relevant.len() < before {
            debug!(
                "Relevance gate dropped {} of {} passages (min score {})",
                before - relevant.len(),
                before,
                self.config.min_score
            );
        }

        relevant
    }
}
