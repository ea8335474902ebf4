use chrono::{Datelike, TimeZone, Utc};

use crate::{
    domain::{CitationId, Document, DocumentId, FileKind},
    error::ApiErrorBody,
    protocol::{
        document_path, DocumentList, LocalFileFacts, QueryResponse, StreamEvent, StreamFrame,
        UploadReceipt,
    },
    timestamp,
};

fn local_facts() -> LocalFileFacts {
    LocalFileFacts {
        file_type: ".pdf".to_string(),
        file_size: 2048,
        uploaded_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    }
}

#[test]
fn parses_naive_backend_timestamps_as_utc() {
    let parsed = timestamp::parse("2024-01-02T03:04:05.123456").expect("naive timestamp");
    assert_eq!(parsed.year(), 2024);
    assert_eq!(parsed.to_rfc3339(), "2024-01-02T03:04:05.123456+00:00");

    let offset = timestamp::parse("2024-01-02T05:04:05+02:00").expect("rfc3339 timestamp");
    assert_eq!(offset, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());

    assert!(timestamp::parse("yesterday").is_none());
}

#[test]
fn document_list_deserializes_backend_shape() {
    let raw = r#"{
        "documents": [{
            "id": "doc-1",
            "filename": "report.pdf",
            "file_type": ".pdf",
            "file_size": 1024,
            "upload_time": "2024-01-02T03:04:05",
            "num_chunks": 7,
            "num_pages": 3
        }],
        "total_count": 1
    }"#;

    let list: DocumentList = serde_json::from_str(raw).expect("document list");
    assert_eq!(list.total_count, Some(1));
    let doc = &list.documents[0];
    assert_eq!(doc.id, DocumentId::from("doc-1"));
    assert_eq!(doc.num_pages, Some(3));
    assert_eq!(doc.num_chunks, 7);
}

#[test]
fn upload_receipt_keyed_by_document_id_fills_in_local_facts() {
    let raw = r#"{
        "document_id": "doc-9",
        "filename": "slides.pptx",
        "status": "success",
        "num_chunks": 12,
        "message": "Document processed"
    }"#;
    let receipt: UploadReceipt = serde_json::from_str(raw).expect("receipt");

    let document: Document = receipt.into_document(local_facts()).expect("document");
    assert_eq!(document.id, DocumentId::from("doc-9"));
    assert_eq!(document.filename, "slides.pptx");
    assert_eq!(document.file_type, ".pdf");
    assert_eq!(document.file_size, 2048);
    assert_eq!(document.num_chunks, 12);
    assert_eq!(document.upload_time, local_facts().uploaded_at);
}

#[test]
fn upload_receipt_prefers_server_metadata_when_document_shaped() {
    let raw = r#"{
        "id": "doc-3",
        "filename": "scan.png",
        "file_type": ".png",
        "file_size": 99,
        "upload_time": "2024-03-04T05:06:07Z",
        "num_chunks": 1
    }"#;
    let receipt: UploadReceipt = serde_json::from_str(raw).expect("receipt");
    let document = receipt.into_document(local_facts()).expect("document");
    assert_eq!(document.file_type, ".png");
    assert_eq!(document.file_size, 99);
    assert_eq!(
        document.upload_time,
        Utc.with_ymd_and_hms(2024, 3, 4, 5, 6, 7).unwrap()
    );
}

#[test]
fn upload_receipt_without_any_id_is_rejected() {
    let receipt: UploadReceipt =
        serde_json::from_str(r#"{"filename": "a.pdf"}"#).expect("receipt");
    assert!(receipt.into_document(local_facts()).is_err());
}

#[test]
fn query_response_carries_per_answer_citation_ids() {
    let raw = r#"{
        "query_id": "q-1",
        "query": "what?",
        "response": "because [1]",
        "citations": [{
            "citation_id": 1,
            "document_id": "doc-1",
            "filename": "a.pdf",
            "chunk_id": "c-1",
            "text": "evidence",
            "confidence_score": 0.87
        }],
        "num_contexts_retrieved": 10,
        "num_contexts_used": 1,
        "processing_time_ms": 1234.5
    }"#;
    let response: QueryResponse = serde_json::from_str(raw).expect("query response");
    assert_eq!(response.citations[0].citation_id, CitationId(1));
    assert_eq!(response.citations[0].page_number, None);
}

#[test]
fn stream_frame_orders_metadata_content_and_done() {
    let frame: StreamFrame =
        serde_json::from_str(r#"{"content": "hi", "query_id": "q", "citations": [], "done": true}"#)
            .expect("frame");
    let events = frame.into_events();
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], StreamEvent::Metadata { .. }));
    assert_eq!(events[1], StreamEvent::Content("hi".to_string()));
    assert_eq!(
        events[2],
        StreamEvent::Done {
            processing_time_ms: None
        }
    );
}

#[test]
fn stream_frame_with_empty_content_yields_nothing() {
    assert!(StreamFrame::content("").into_events().is_empty());
}

#[test]
fn file_kind_matches_extensions_case_insensitively() {
    assert_eq!(FileKind::from_filename("A.PDF"), Some(FileKind::Pdf));
    assert_eq!(FileKind::from_filename("photo.jpeg"), Some(FileKind::Jpeg));
    assert_eq!(FileKind::from_filename("photo.jpg"), Some(FileKind::Jpeg));
    assert_eq!(FileKind::from_filename("notes.txt"), None);
    assert_eq!(FileKind::from_filename("README"), None);
}

#[test]
fn api_error_body_extracts_detail() {
    assert_eq!(
        ApiErrorBody::message_from(r#"{"detail": "Document x not found"}"#).as_deref(),
        Some("Document x not found")
    );
    assert_eq!(ApiErrorBody::message_from("<html>bad gateway</html>"), None);
    assert!(ApiErrorBody::message_from(r#"{"detail": [{"loc": ["body"]}]}"#)
        .expect("list detail")
        .contains("loc"));
}

#[test]
fn document_paths_embed_the_id() {
    assert_eq!(
        document_path(&DocumentId::from("abc")),
        "/api/documents/abc"
    );
}
