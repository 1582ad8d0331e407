#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

use crate::chunker::PageOffsetMap;

/// One uploaded rulebook document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: i64,
    /// Collection key scoping which documents are searched together
    pub game_id: i64,
    pub title: String,
    /// Null until upstream text extraction completes
    pub extracted_text: Option<String>,
    pub extraction_status: ExtractionStatus,
    /// JSON-encoded page offset map, best effort
    pub page_offsets: Option<String>,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum ExtractionStatus {
    Pending,
    Completed,
    Failed,
}

impl std::fmt::Display for ExtractionStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ExtractionStatus::Pending => write!(f, "Pending"),
            ExtractionStatus::Completed => write!(f, "Completed"),
            ExtractionStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub game_id: i64,
    pub title: String,
}

/// Tracks the indexing lifecycle of one document, one row per document.
/// Re-indexing updates the row in place rather than inserting another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IndexRecord {
    pub id: i64,
    pub document_id: i64,
    pub chunk_count: i64,
    pub total_chars: i64,
    pub status: IndexStatus,
    /// Set only when status is completed
    pub indexed_at: Option<NaiveDateTime>,
    /// Set only when status is failed
    pub error_message: Option<String>,
    pub embedding_model: String,
    pub embedding_dimension: i64,
    pub created_date: NaiveDateTime,
    pub updated_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum IndexStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for IndexStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            IndexStatus::Pending => write!(f, "Pending"),
            IndexStatus::Processing => write!(f, "Processing"),
            IndexStatus::Completed => write!(f, "Completed"),
            IndexStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl Document {
    /// Whether upstream extraction has delivered usable text
    #[inline]
    pub fn has_extracted_text(&self) -> bool {
        self.extracted_text
            .as_ref()
            .is_some_and(|text| !text.trim().is_empty())
    }

    /// Parse the stored page offset map, if any
    #[inline]
    pub fn page_offset_map(&self) -> Result<Option<PageOffsetMap>> {
        self.page_offsets
            .as_ref()
            .map(|json| {
                serde_json::from_str(json).with_context(|| {
                    format!("Failed to parse page offset map for document {}", self.id)
                })
            })
            .transpose()
    }
}

impl IndexRecord {
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status == IndexStatus::Completed
    }

    #[inline]
    pub fn is_processing(&self) -> bool {
        self.status == IndexStatus::Processing
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.status == IndexStatus::Failed
    }
}
