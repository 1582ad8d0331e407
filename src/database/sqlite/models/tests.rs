use chrono::Utc;

use super::*;

fn test_document(extracted_text: Option<&str>) -> Document {
    Document {
        id: 1,
        game_id: 7,
        title: "Core Rulebook".to_string(),
        extracted_text: extracted_text.map(str::to_string),
        extraction_status: ExtractionStatus::Completed,
        page_offsets: None,
        created_date: Utc::now().naive_utc(),
    }
}

#[test]
fn extraction_status_display() {
    assert_eq!(ExtractionStatus::Pending.to_string(), "Pending");
    assert_eq!(ExtractionStatus::Completed.to_string(), "Completed");
    assert_eq!(ExtractionStatus::Failed.to_string(), "Failed");
}

#[test]
fn index_status_display() {
    assert_eq!(IndexStatus::Pending.to_string(), "Pending");
    assert_eq!(IndexStatus::Processing.to_string(), "Processing");
    assert_eq!(IndexStatus::Completed.to_string(), "Completed");
    assert_eq!(IndexStatus::Failed.to_string(), "Failed");
}

#[test]
fn has_extracted_text_requires_non_whitespace() {
    assert!(test_document(Some("Place the board in the middle.")).has_extracted_text());
    assert!(!test_document(Some("   \n\t")).has_extracted_text());
    assert!(!test_document(None).has_extracted_text());
}

#[test]
fn page_offset_map_parses_stored_json() {
    let mut document = test_document(Some("text"));
    document.page_offsets = Some(
        r#"{"boundaries":[{"char_offset":0,"page_number":1},{"char_offset":120,"page_number":2}]}"#
            .to_string(),
    );

    let map = document
        .page_offset_map()
        .expect("should parse")
        .expect("map should be present");
    assert_eq!(map.page_for_offset(130), Some(2));
}

#[test]
fn page_offset_map_absent_when_not_stored() {
    let document = test_document(Some("text"));
    assert!(document.page_offset_map().expect("should parse").is_none());
}

#[test]
fn page_offset_map_rejects_malformed_json() {
    let mut document = test_document(Some("text"));
    document.page_offsets = Some("not json".to_string());
    assert!(document.page_offset_map().is_err());
}

#[test]
fn index_record_status_helpers() {
    let now = Utc::now().naive_utc();
    let record = IndexRecord {
        id: 1,
        document_id: 1,
        chunk_count: 12,
        total_chars: 9000,
        status: IndexStatus::Completed,
        indexed_at: Some(now),
        error_message: None,
        embedding_model: "nomic-embed-text:latest".to_string(),
        embedding_dimension: 768,
        created_date: now,
        updated_date: now,
    };

    assert!(record.is_completed());
    assert!(!record.is_processing());
    assert!(!record.is_failed());

    let failed = IndexRecord {
        status: IndexStatus::Failed,
        indexed_at: None,
        error_message: Some("embedding provider unreachable".to_string()),
        ..record
    };
    assert!(failed.is_failed());
}
