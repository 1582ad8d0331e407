use super::*;
use crate::database::sqlite::Database;
use anyhow::Result;
use tempfile::TempDir;

async fn test_pool() -> Result<(TempDir, Database)> {
    let temp_dir = TempDir::new()?;
    let database = Database::initialize_from_config_dir(temp_dir.path()).await?;
    Ok((temp_dir, database))
}

#[tokio::test]
async fn create_assigns_pending_extraction() -> Result<()> {
    let (_temp_dir, database) = test_pool().await?;

    let document = DocumentQueries::create(
        database.pool(),
        NewDocument {
            game_id: 9,
            title: "Expansion Rules".to_string(),
        },
    )
    .await?;

    assert_eq!(document.extraction_status, ExtractionStatus::Pending);
    assert!(document.page_offsets.is_none());
    Ok(())
}

#[tokio::test]
async fn attach_text_without_page_offsets() -> Result<()> {
    let (_temp_dir, database) = test_pool().await?;

    let document = DocumentQueries::create(
        database.pool(),
        NewDocument {
            game_id: 9,
            title: "Expansion Rules".to_string(),
        },
    )
    .await?;

    let updated = DocumentQueries::attach_text(database.pool(), document.id, "Some rules.", None)
        .await?
        .expect("document should exist");

    assert_eq!(updated.extracted_text.as_deref(), Some("Some rules."));
    assert!(updated.page_offsets.is_none());
    Ok(())
}

#[tokio::test]
async fn attach_text_to_missing_document_returns_none() -> Result<()> {
    let (_temp_dir, database) = test_pool().await?;

    let result = DocumentQueries::attach_text(database.pool(), 999, "text", None).await?;
    assert!(result.is_none());
    Ok(())
}

#[tokio::test]
async fn begin_processing_clears_previous_error() -> Result<()> {
    let (_temp_dir, database) = test_pool().await?;

    let document = DocumentQueries::create(
        database.pool(),
        NewDocument {
            game_id: 1,
            title: "Rules".to_string(),
        },
    )
    .await?;

    IndexRecordQueries::begin_processing(database.pool(), document.id).await?;
    IndexRecordQueries::mark_failed(database.pool(), document.id, "timeout").await?;

    let reset = IndexRecordQueries::begin_processing(database.pool(), document.id).await?;
    assert_eq!(reset.status, IndexStatus::Processing);
    assert!(reset.error_message.is_none());
    Ok(())
}

#[tokio::test]
async fn get_by_document_missing_returns_none() -> Result<()> {
    let (_temp_dir, database) = test_pool().await?;

    let record = IndexRecordQueries::get_by_document(database.pool(), 123).await?;
    assert!(record.is_none());
    Ok(())
}
