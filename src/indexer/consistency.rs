// Consistency validation between the relational store and the vector store
// The two systems share no transaction, so they can drift after a crash

use tracing::{info, warn};

use super::IndexError;
use crate::database::VectorIndex;
use crate::database::sqlite::Database;

/// Result of a cross-store consistency check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Completed index records that were checked against the vector store
    pub checked_documents: usize,
    /// Documents stuck in `processing` beyond the stale cutoff
    pub stale_processing: Vec<i64>,
    /// Completed documents whose stored vector count disagrees with the
    /// chunk count on their index record
    pub count_mismatches: Vec<CountMismatch>,
    pub is_consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountMismatch {
    pub document_id: i64,
    pub recorded_chunks: i64,
    pub stored_vectors: usize,
}

impl ConsistencyReport {
    /// Human-readable one-line summary
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Stores are consistent: {} completed documents checked",
                self.checked_documents
            )
        } else {
            format!(
                "Store inconsistencies found: {} stale processing records, {} count mismatches",
                self.stale_processing.len(),
                self.count_mismatches.len()
            )
        }
    }

    #[inline]
    pub fn total_issues(&self) -> usize {
        self.stale_processing.len() + self.count_mismatches.len()
    }
}

/// Compares index records against the vector store.
///
/// Stale `processing` records and count mismatches are both repaired the
/// same way: re-run `index_document`, which rebuilds the document's vectors
/// from scratch.
pub struct ConsistencyValidator<'a> {
    database: &'a Database,
    vector_index: &'a dyn VectorIndex,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(database: &'a Database, vector_index: &'a dyn VectorIndex) -> Self {
        Self {
            database,
            vector_index,
        }
    }

    #[inline]
    pub async fn validate(
        &self,
        stale_after: chrono::Duration,
    ) -> Result<ConsistencyReport, IndexError> {
        info!("Running cross-store consistency validation");

        let stale_processing: Vec<i64> = self
            .database
            .stale_index_records(stale_after)
            .await
            .map_err(|e| IndexError::Database(format!("{:#}", e)))?
            .into_iter()
            .map(|record| record.document_id)
            .collect();

        let records = self
            .database
            .list_index_records()
            .await
            .map_err(|e| IndexError::Database(format!("{:#}", e)))?;

        let mut checked_documents = 0;
        let mut count_mismatches = Vec::new();

        for record in records.iter().filter(|r| r.is_completed()) {
            checked_documents += 1;

            let stored_vectors = self
                .vector_index
                .count_document(record.document_id)
                .await
                .map_err(|e| IndexError::IndexingFailed(e.to_string()))?;

            if stored_vectors as i64 != record.chunk_count {
                count_mismatches.push(CountMismatch {
                    document_id: record.document_id,
                    recorded_chunks: record.chunk_count,
                    stored_vectors,
                });
            }
        }

        let is_consistent = stale_processing.is_empty() && count_mismatches.is_empty();

        let report = ConsistencyReport {
            checked_documents,
            stale_processing,
            count_mismatches,
            is_consistent,
        };

        if report.is_consistent {
            info!("Consistency validation passed");
        } else {
            warn!("{}", report.summary());
            for mismatch in &report.count_mismatches {
                warn!(
                    "Document {} records {} chunks but stores {} vectors",
                    mismatch.document_id, mismatch.recorded_chunks, mismatch.stored_vectors
                );
            }
        }

        Ok(report)
    }
}
