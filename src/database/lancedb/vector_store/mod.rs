
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator, StringArray,
    UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use tracing::{debug, error, info, warn};

use super::{ChunkVector, ScoredChunk};
use crate::config::Config;
use crate::database::VectorIndex;
use crate::QaError;

/// LanceDB-backed chunk vector store.
///
/// One `chunks` table holds every document's vectors; entries are keyed by
/// `"{document_id}:{chunk_index}"` and partitioned for search by `game_id`.
pub struct VectorStore {
    connection: Connection,
    table_name: String,
}

impl VectorStore {
    /// Open (or create) the vector database under the configured base dir
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, QaError> {
        let db_path = config
            .vector_database_path()
            .map_err(|e| QaError::Config(format!("Failed to resolve vector db path: {}", e)))?;
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                QaError::VectorStore(format!("Failed to create vector database directory: {}", e))
            })?;
        }

        let uri = format!("file://{}", db_path.display());

        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("malformed")
                {
                    warn!("Vector database corruption detected, attempting recovery");
                    Self::attempt_corruption_recovery(&db_path)?;

                    lancedb::connect(&uri).execute().await.map_err(|e| {
                        QaError::VectorStore(format!(
                            "Failed to connect to LanceDB after recovery: {}",
                            e
                        ))
                    })?
                } else {
                    return Err(QaError::VectorStore(format!(
                        "Failed to connect to LanceDB: {}",
                        e
                    )));
                }
            }
        };

        info!("Vector store initialized successfully");
        Ok(Self {
            connection,
            table_name: "chunks".to_string(),
        })
    }

    /// Move a corrupted database aside so a fresh one can be created.
    /// Documents can be re-indexed afterwards; their source of truth is the
    /// relational store.
    fn attempt_corruption_recovery(db_path: &PathBuf) -> Result<(), QaError> {
        if db_path.exists() {
            let backup_path = db_path.with_extension("corrupted_backup");
            std::fs::rename(db_path, &backup_path).map_err(|e| {
                QaError::VectorStore(format!("Failed to back up corrupted database: {}", e))
            })?;
            info!("Corrupted vector database backed up to {:?}", backup_path);
        }
        Ok(())
    }

    async fn table_exists(&self) -> Result<bool, QaError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| QaError::VectorStore(format!("Failed to list tables: {}", e)))?;
        Ok(table_names.contains(&self.table_name))
    }

    /// Read the vector dimensionality out of the existing table schema
    async fn detect_dimension(&self) -> Result<usize, QaError> {
        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| QaError::VectorStore(format!("Failed to open table: {}", e)))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| QaError::VectorStore(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(QaError::VectorStore(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(&self, vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("document_id", DataType::Int64, false),
            Field::new("game_id", DataType::Int64, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("page_number", DataType::UInt32, true),
            Field::new("char_start", DataType::UInt32, false),
            Field::new("char_end", DataType::UInt32, false),
            Field::new("indexed_at", DataType::Utf8, false),
        ]))
    }

    fn create_record_batch(
        &self,
        document_id: i64,
        game_id: i64,
        entries: &[ChunkVector],
        vector_dim: usize,
    ) -> Result<RecordBatch, QaError> {
        let len = entries.len();
        let indexed_at = Utc::now().to_rfc3339();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut page_numbers = Vec::with_capacity(len);
        let mut char_starts = Vec::with_capacity(len);
        let mut char_ends = Vec::with_capacity(len);

        for entry in entries {
            if entry.vector.len() != vector_dim {
                return Err(QaError::VectorStore(format!(
                    "Vector dimension mismatch: expected {}, got {} for chunk {}",
                    vector_dim,
                    entry.vector.len(),
                    entry.chunk.sequence
                )));
            }

            ids.push(entry_id(document_id, entry.chunk.sequence));
            flat_values.extend_from_slice(&entry.vector);
            chunk_indices.push(entry.chunk.sequence as u32);
            contents.push(entry.chunk.text.as_str());
            page_numbers.push(entry.chunk.page_number);
            char_starts.push(entry.chunk.char_start as u32);
            char_ends.push(entry.chunk.char_end as u32);
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| {
                    QaError::VectorStore(format!("Failed to create vector array: {}", e))
                })?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(Int64Array::from(vec![document_id; len])),
            Arc::new(Int64Array::from(vec![game_id; len])),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(contents)),
            Arc::new(UInt32Array::from(page_numbers)),
            Arc::new(UInt32Array::from(char_starts)),
            Arc::new(UInt32Array::from(char_ends)),
            Arc::new(StringArray::from(vec![indexed_at.as_str(); len])),
        ];

        RecordBatch::try_new(self.create_schema(vector_dim), arrays)
            .map_err(|e| QaError::VectorStore(format!("Failed to create record batch: {}", e)))
    }

    async fn parse_search_results(
        &self,
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<ScoredChunk>, QaError> {
        let mut scored = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| QaError::VectorStore(format!("Failed to read result stream: {}", e)))?
        {
            scored.extend(parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results from stream", scored.len());
        Ok(scored)
    }
}

#[async_trait]
impl VectorIndex for VectorStore {
    #[inline]
    async fn ensure_collection(&self, dimensions: usize) -> Result<(), QaError> {
        if self.table_exists().await? {
            let existing = self.detect_dimension().await?;
            if existing == dimensions {
                debug!("Chunk table already sized for {} dimensions", dimensions);
                return Ok(());
            }

            // A dimension change means the embedding model changed; stored
            // vectors are useless against the new model and every document
            // needs re-indexing regardless.
            warn!(
                "Vector dimension changed from {} to {}, recreating chunk table",
                existing, dimensions
            );
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| QaError::VectorStore(format!("Failed to drop table: {}", e)))?;
        }

        self.connection
            .create_empty_table(&self.table_name, self.create_schema(dimensions))
            .execute()
            .await
            .map_err(|e| QaError::VectorStore(format!("Failed to create table: {}", e)))?;

        info!("Chunk table created with {} dimensions", dimensions);
        Ok(())
    }

    #[inline]
    async fn upsert_chunks(
        &self,
        document_id: i64,
        game_id: i64,
        entries: &[ChunkVector],
    ) -> Result<usize, QaError> {
        if entries.is_empty() {
            debug!("No chunk vectors to store");
            return Ok(0);
        }

        if !self.table_exists().await? {
            return Err(QaError::VectorStore(
                "Chunk collection has not been created; call ensure_collection first".to_string(),
            ));
        }

        let vector_dim = self.detect_dimension().await?;
        let record_batch = self.create_record_batch(document_id, game_id, entries, vector_dim)?;

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| QaError::VectorStore(format!("Failed to open table: {}", e)))?;

        // Overwrite-by-key: remove any entries with the same ids before
        // inserting so repeated calls never duplicate
        let ids = entries
            .iter()
            .map(|e| format!("'{}'", entry_id(document_id, e.chunk.sequence)))
            .collect::<Vec<_>>()
            .join(", ");
        table
            .delete(&format!("id IN ({})", ids))
            .await
            .map_err(|e| QaError::VectorStore(format!("Failed to clear existing entries: {}", e)))?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| QaError::VectorStore(format!("Failed to insert chunk vectors: {}", e)))?;

        info!(
            "Stored {} chunk vectors for document {}",
            entries.len(),
            document_id
        );
        Ok(entries.len())
    }

    #[inline]
    async fn delete_document(&self, document_id: i64) -> Result<bool, QaError> {
        if !self.table_exists().await? {
            return Ok(true);
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| QaError::VectorStore(format!("Failed to open table: {}", e)))?;

        table
            .delete(&format!("document_id = {}", document_id))
            .await
            .map_err(|e| {
                QaError::VectorStore(format!("Failed to delete document vectors: {}", e))
            })?;

        debug!("Deleted vector entries for document {}", document_id);
        Ok(true)
    }

    #[inline]
    async fn count_document(&self, document_id: i64) -> Result<usize, QaError> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| QaError::VectorStore(format!("Failed to open table: {}", e)))?;

        table
            .count_rows(Some(format!("document_id = {}", document_id)))
            .await
            .map_err(|e| QaError::VectorStore(format!("Failed to count rows: {}", e)))
    }

    #[inline]
    async fn search(
        &self,
        game_id: i64,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, QaError> {
        if !self.table_exists().await? {
            debug!("Search against empty vector store, returning no results");
            return Ok(Vec::new());
        }

        debug!("Searching game {} with limit {}", game_id, limit);

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| QaError::VectorStore(format!("Failed to open table: {}", e)))?;

        let results = table
            .vector_search(query_vector)
            .map_err(|e| QaError::VectorStore(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .only_if(format!("game_id = {}", game_id))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| QaError::VectorStore(format!("Failed to execute search: {}", e)))?;

        self.parse_search_results(results).await
    }
}

fn entry_id(document_id: i64, sequence: usize) -> String {
    format!("{}:{}", document_id, sequence)
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredChunk>, QaError> {
    let document_ids = i64_column(batch, "document_id")?;
    let game_ids = i64_column(batch, "game_id")?;
    let chunk_indices = u32_column(batch, "chunk_index")?;
    let contents = string_column(batch, "content")?;
    let page_numbers = u32_column(batch, "page_number")?;
    let char_starts = u32_column(batch, "char_start")?;
    let char_ends = u32_column(batch, "char_end")?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut scored = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        scored.push(ScoredChunk {
            document_id: document_ids.value(row),
            game_id: game_ids.value(row),
            chunk_index: chunk_indices.value(row),
            content: contents.value(row).to_string(),
            page_number: if page_numbers.is_null(row) {
                None
            } else {
                Some(page_numbers.value(row))
            },
            char_start: char_starts.value(row),
            char_end: char_ends.value(row),
            // Cosine distance mapped onto [0, 1], higher is more similar
            score: (1.0 - distance).clamp(0.0, 1.0),
            distance,
        });
    }

    Ok(scored)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, QaError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| QaError::VectorStore(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| QaError::VectorStore(format!("Invalid {} column type", name)))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array, QaError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| QaError::VectorStore(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| QaError::VectorStore(format!("Invalid {} column type", name)))
}

fn i64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array, QaError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| QaError::VectorStore(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| QaError::VectorStore(format!("Invalid {} column type", name)))
}
