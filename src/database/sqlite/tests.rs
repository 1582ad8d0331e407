use super::*;
use anyhow::Result;
use super::models::{ExtractionStatus, IndexStatus};
use std::collections::HashSet;
use tempfile::TempDir;

async fn create_test_database() -> Result<(TempDir, Database)> {
    let temp_dir = TempDir::new()?;
    let database = Database::initialize_from_config_dir(temp_dir.path()).await?;
    Ok((temp_dir, database))
}

#[tokio::test]
async fn integration_schema_migration() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' \
         AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%'",
    )
    .fetch_all(database.pool())
    .await?;

    let expected_tables: HashSet<&'static str> = ["documents", "index_records"].into_iter().collect();
    let actual_tables: HashSet<&str> = tables.iter().map(|t| t.as_str()).collect();
    assert_eq!(actual_tables, expected_tables);

    Ok(())
}

#[tokio::test]
async fn integration_document_lifecycle() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let document = database
        .create_document(NewDocument {
            game_id: 42,
            title: "Base Game Rules".to_string(),
        })
        .await?;

    assert_eq!(document.game_id, 42);
    assert_eq!(document.extraction_status, ExtractionStatus::Pending);
    assert!(document.extracted_text.is_none());
    assert!(!document.has_extracted_text());

    let updated = database
        .attach_extracted_text(
            document.id,
            "Each player draws five cards.",
            Some(r#"{"boundaries":[{"char_offset":0,"page_number":1}]}"#),
        )
        .await?
        .expect("document should exist");

    assert_eq!(updated.extraction_status, ExtractionStatus::Completed);
    assert!(updated.has_extracted_text());
    assert!(updated.page_offset_map()?.is_some());

    let listed = database.list_documents_for_game(42).await?;
    assert_eq!(listed.len(), 1);
    assert!(database.list_documents_for_game(43).await?.is_empty());

    assert!(database.delete_document(document.id).await?);
    assert!(database.get_document(document.id).await?.is_none());
    // Idempotent from the caller's perspective: deleting again reports false
    assert!(!database.delete_document(document.id).await?);

    Ok(())
}

#[tokio::test]
async fn integration_index_record_transitions() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let document = database
        .create_document(NewDocument {
            game_id: 1,
            title: "Rules".to_string(),
        })
        .await?;

    let record = database.begin_index_processing(document.id).await?;
    assert_eq!(record.status, IndexStatus::Processing);
    assert_eq!(record.chunk_count, 0);
    assert!(record.indexed_at.is_none());

    let completed = database
        .complete_index_record(document.id, 12, 8000, "nomic-embed-text:latest", 768)
        .await?;
    assert_eq!(completed.status, IndexStatus::Completed);
    assert_eq!(completed.chunk_count, 12);
    assert_eq!(completed.total_chars, 8000);
    assert_eq!(completed.embedding_dimension, 768);
    assert!(completed.indexed_at.is_some());
    assert!(completed.error_message.is_none());

    let failed = database
        .fail_index_record(document.id, "embedding provider unreachable")
        .await?;
    assert_eq!(failed.status, IndexStatus::Failed);
    assert!(failed.indexed_at.is_none());
    assert_eq!(
        failed.error_message.as_deref(),
        Some("embedding provider unreachable")
    );

    Ok(())
}

#[tokio::test]
async fn integration_reindex_updates_record_in_place() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let document = database
        .create_document(NewDocument {
            game_id: 1,
            title: "Rules".to_string(),
        })
        .await?;

    let first = database.begin_index_processing(document.id).await?;
    database
        .complete_index_record(document.id, 3, 1200, "nomic-embed-text:latest", 768)
        .await?;

    // A second run must reuse the same row, not insert another
    let second = database.begin_index_processing(document.id).await?;
    assert_eq!(first.id, second.id);
    assert_eq!(second.status, IndexStatus::Processing);
    assert!(second.error_message.is_none());

    let records = database.list_index_records().await?;
    assert_eq!(records.len(), 1);

    Ok(())
}

#[tokio::test]
async fn integration_cascade_delete_removes_index_record() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let document = database
        .create_document(NewDocument {
            game_id: 1,
            title: "Rules".to_string(),
        })
        .await?;
    database.begin_index_processing(document.id).await?;

    database.delete_document(document.id).await?;

    assert!(database.get_index_record(document.id).await?.is_none());
    assert!(database.list_index_records().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn integration_stale_processing_detection() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let document = database
        .create_document(NewDocument {
            game_id: 1,
            title: "Rules".to_string(),
        })
        .await?;
    database.begin_index_processing(document.id).await?;

    // Freshly started records are not stale
    let stale = database.stale_index_records(Duration::minutes(10)).await?;
    assert!(stale.is_empty());

    // With a zero-age cutoff every processing record is overdue
    let stale = database.stale_index_records(Duration::seconds(-1)).await?;
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].document_id, document.id);

    // Completed records never show up as stale
    database
        .complete_index_record(document.id, 1, 100, "nomic-embed-text:latest", 768)
        .await?;
    let stale = database.stale_index_records(Duration::seconds(-1)).await?;
    assert!(stale.is_empty());

    Ok(())
}
