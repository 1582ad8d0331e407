#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::models::{Document, ExtractionStatus, IndexRecord, IndexStatus, NewDocument};

const DOCUMENT_COLUMNS: &str = "id, game_id, title, extracted_text, extraction_status, \
                                page_offsets, created_date";

const INDEX_RECORD_COLUMNS: &str = "id, document_id, chunk_count, total_chars, status, \
                                    indexed_at, error_message, embedding_model, \
                                    embedding_dimension, created_date, updated_date";

pub struct DocumentQueries;

impl DocumentQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_document: NewDocument) -> Result<Document> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            "INSERT INTO documents (game_id, title, extraction_status, created_date) \
             VALUES (?, ?, 'pending', ?)",
        )
        .bind(new_document.game_id)
        .bind(&new_document.title)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create document")?
        .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created document"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get document by id")?;

        row.map(|row| map_document_row(&row)).transpose()
    }

    #[inline]
    pub async fn list_by_game(pool: &SqlitePool, game_id: i64) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE game_id = ? ORDER BY created_date"
        ))
        .bind(game_id)
        .fetch_all(pool)
        .await
        .context("Failed to list documents for game")?;

        rows.iter().map(map_document_row).collect()
    }

    /// Attach the text delivered by the upstream extraction step and mark
    /// extraction completed
    #[inline]
    pub async fn attach_text(
        pool: &SqlitePool,
        id: i64,
        text: &str,
        page_offsets: Option<&str>,
    ) -> Result<Option<Document>> {
        sqlx::query(
            "UPDATE documents SET extracted_text = ?, page_offsets = ?, \
             extraction_status = 'completed' WHERE id = ?",
        )
        .bind(text)
        .bind(page_offsets)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to attach extracted text")?;

        Self::get_by_id(pool, id).await
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete document")?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct IndexRecordQueries;

impl IndexRecordQueries {
    #[inline]
    pub async fn get_by_document(pool: &SqlitePool, document_id: i64) -> Result<Option<IndexRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {INDEX_RECORD_COLUMNS} FROM index_records WHERE document_id = ?"
        ))
        .bind(document_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get index record")?;

        row.map(|row| map_index_record_row(&row)).transpose()
    }

    /// Create the index record for a document, or reset the existing one to
    /// `processing`. The row is updated in place so a document never
    /// accumulates more than one record across re-indexing runs.
    #[inline]
    pub async fn begin_processing(pool: &SqlitePool, document_id: i64) -> Result<IndexRecord> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO index_records \
             (document_id, status, created_date, updated_date) \
             VALUES (?, 'processing', ?, ?) \
             ON CONFLICT (document_id) DO UPDATE SET \
             status = 'processing', error_message = NULL, \
             updated_date = excluded.updated_date",
        )
        .bind(document_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to upsert index record")?;

        debug!("Index record for document {} set to processing", document_id);

        Self::get_by_document(pool, document_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve upserted index record"))
    }

    #[inline]
    pub async fn mark_completed(
        pool: &SqlitePool,
        document_id: i64,
        chunk_count: i64,
        total_chars: i64,
        embedding_model: &str,
        embedding_dimension: i64,
    ) -> Result<IndexRecord> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            "UPDATE index_records SET status = 'completed', chunk_count = ?, \
             total_chars = ?, embedding_model = ?, embedding_dimension = ?, \
             indexed_at = ?, error_message = NULL, updated_date = ? \
             WHERE document_id = ?",
        )
        .bind(chunk_count)
        .bind(total_chars)
        .bind(embedding_model)
        .bind(embedding_dimension)
        .bind(now)
        .bind(now)
        .bind(document_id)
        .execute(pool)
        .await
        .context("Failed to mark index record completed")?;

        Self::get_by_document(pool, document_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Index record vanished while marking completed"))
    }

    #[inline]
    pub async fn mark_failed(
        pool: &SqlitePool,
        document_id: i64,
        error_message: &str,
    ) -> Result<IndexRecord> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            "UPDATE index_records SET status = 'failed', error_message = ?, \
             indexed_at = NULL, updated_date = ? WHERE document_id = ?",
        )
        .bind(error_message)
        .bind(now)
        .bind(document_id)
        .execute(pool)
        .await
        .context("Failed to mark index record failed")?;

        Self::get_by_document(pool, document_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Index record vanished while marking failed"))
    }

    /// Records stuck in `processing` since before the cutoff. These indicate
    /// an indexing attempt that died between the vector delete and the final
    /// status write, and should be re-run.
    #[inline]
    pub async fn stale_processing(
        pool: &SqlitePool,
        cutoff: chrono::NaiveDateTime,
    ) -> Result<Vec<IndexRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {INDEX_RECORD_COLUMNS} FROM index_records \
             WHERE status = 'processing' AND updated_date < ? ORDER BY updated_date"
        ))
        .bind(cutoff)
        .fetch_all(pool)
        .await
        .context("Failed to query stale index records")?;

        rows.iter().map(map_index_record_row).collect()
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<IndexRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {INDEX_RECORD_COLUMNS} FROM index_records ORDER BY document_id"
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list index records")?;

        rows.iter().map(map_index_record_row).collect()
    }
}

fn map_document_row(row: &SqliteRow) -> Result<Document> {
    let status_str: String = row.get("extraction_status");
    let extraction_status = match status_str.as_str() {
        "pending" => ExtractionStatus::Pending,
        "completed" => ExtractionStatus::Completed,
        "failed" => ExtractionStatus::Failed,
        _ => return Err(anyhow::anyhow!("Invalid extraction status: {}", status_str)),
    };

    Ok(Document {
        id: row.get("id"),
        game_id: row.get("game_id"),
        title: row.get("title"),
        extracted_text: row.get("extracted_text"),
        extraction_status,
        page_offsets: row.get("page_offsets"),
        created_date: row.get("created_date"),
    })
}

fn map_index_record_row(row: &SqliteRow) -> Result<IndexRecord> {
    let status_str: String = row.get("status");
    let status = match status_str.as_str() {
        "pending" => IndexStatus::Pending,
        "processing" => IndexStatus::Processing,
        "completed" => IndexStatus::Completed,
        "failed" => IndexStatus::Failed,
        _ => return Err(anyhow::anyhow!("Invalid index status: {}", status_str)),
    };

    Ok(IndexRecord {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_count: row.get("chunk_count"),
        total_chars: row.get("total_chars"),
        status,
        indexed_at: row.get("indexed_at"),
        error_message: row.get("error_message"),
        embedding_model: row.get("embedding_model"),
        embedding_dimension: row.get("embedding_dimension"),
        created_date: row.get("created_date"),
        updated_date: row.get("updated_date"),
    })
}
