#[cfg(test)]
mod tests;

pub mod models;
pub mod queries;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use models::{Document, IndexRecord, NewDocument};
use queries::{DocumentQueries, IndexRecordQueries};

pub type DbPool = Pool<Sqlite>;

/// SQLite-backed store for documents and their index records
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("metadata.db")).await
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    // Document operations

    #[inline]
    pub async fn create_document(&self, new_document: NewDocument) -> Result<Document> {
        DocumentQueries::create(&self.pool, new_document).await
    }

    #[inline]
    pub async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        DocumentQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn list_documents_for_game(&self, game_id: i64) -> Result<Vec<Document>> {
        DocumentQueries::list_by_game(&self.pool, game_id).await
    }

    #[inline]
    pub async fn attach_extracted_text(
        &self,
        id: i64,
        text: &str,
        page_offsets: Option<&str>,
    ) -> Result<Option<Document>> {
        DocumentQueries::attach_text(&self.pool, id, text, page_offsets).await
    }

    /// Remove the document row; its index record goes with it via the
    /// foreign key cascade. Vector entries are the orchestrator's job.
    #[inline]
    pub async fn delete_document(&self, id: i64) -> Result<bool> {
        DocumentQueries::delete(&self.pool, id).await
    }

    // Index record operations

    #[inline]
    pub async fn get_index_record(&self, document_id: i64) -> Result<Option<IndexRecord>> {
        IndexRecordQueries::get_by_document(&self.pool, document_id).await
    }

    #[inline]
    pub async fn begin_index_processing(&self, document_id: i64) -> Result<IndexRecord> {
        IndexRecordQueries::begin_processing(&self.pool, document_id).await
    }

    #[inline]
    pub async fn complete_index_record(
        &self,
        document_id: i64,
        chunk_count: i64,
        total_chars: i64,
        embedding_model: &str,
        embedding_dimension: i64,
    ) -> Result<IndexRecord> {
        IndexRecordQueries::mark_completed(
            &self.pool,
            document_id,
            chunk_count,
            total_chars,
            embedding_model,
            embedding_dimension,
        )
        .await
    }

    #[inline]
    pub async fn fail_index_record(
        &self,
        document_id: i64,
        error_message: &str,
    ) -> Result<IndexRecord> {
        IndexRecordQueries::mark_failed(&self.pool, document_id, error_message).await
    }

    /// Index records stuck in `processing` for longer than `max_age`
    #[inline]
    pub async fn stale_index_records(&self, max_age: Duration) -> Result<Vec<IndexRecord>> {
        let cutoff = Utc::now().naive_utc() - max_age;
        IndexRecordQueries::stale_processing(&self.pool, cutoff).await
    }

    #[inline]
    pub async fn list_index_records(&self) -> Result<Vec<IndexRecord>> {
        IndexRecordQueries::list_all(&self.pool).await
    }
}
