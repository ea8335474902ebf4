//! In-process backend double shared by the orchestration tests.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::{stream, StreamExt};
use shared::{
    domain::{ChunkId, Citation, CitationId, Document, DocumentId, QueryId},
    error::ApiErrorBody,
    protocol::{
        DeleteConfirmation, QueryRequest, QueryResponse, StreamFrame, StreamQueryRequest,
        UploadReceipt,
    },
};
use tokio::sync::{Mutex, Notify};

use crate::{
    error::ClientError,
    transport::{ByteStream, RetrievalApi},
    types::UploadFile,
};

pub(crate) fn server_error(status: u16, detail: &str) -> ClientError {
    ClientError::Server {
        status,
        body: serde_json::to_string(&ApiErrorBody::new(detail)).unwrap_or_default(),
    }
}

pub(crate) fn document(id: &str, filename: &str) -> Document {
    Document {
        id: DocumentId::from(id),
        filename: filename.to_string(),
        file_type: ".pdf".to_string(),
        file_size: 4096,
        upload_time: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        num_chunks: 3,
        num_pages: Some(2),
    }
}

pub(crate) fn citation(id: u32, text: &str) -> Citation {
    Citation {
        citation_id: CitationId(id),
        document_id: DocumentId::from("doc-1"),
        filename: "handbook.pdf".to_string(),
        chunk_id: ChunkId(format!("chunk-{id}")),
        text: text.to_string(),
        page_number: Some(id),
        confidence_score: 0.75,
    }
}

pub(crate) fn query_response(response: &str, citations: Vec<Citation>) -> QueryResponse {
    QueryResponse {
        query_id: QueryId::from("q-1"),
        query: "question".to_string(),
        response: response.to_string(),
        num_contexts_retrieved: 10,
        num_contexts_used: citations.len() as u32,
        citations,
        processing_time_ms: 1520.0,
    }
}

pub(crate) fn content_frame(text: &str) -> Vec<u8> {
    let json = serde_json::to_string(&StreamFrame::content(text)).unwrap_or_default();
    format!("data: {json}\n\n").into_bytes()
}

pub(crate) fn metadata_frame(citations: Vec<Citation>) -> Vec<u8> {
    let frame = StreamFrame {
        query_id: Some(QueryId::from("q-stream")),
        citations: Some(citations),
        ..StreamFrame::default()
    };
    let json = serde_json::to_string(&frame).unwrap_or_default();
    format!("data: {json}\n\n").into_bytes()
}

pub(crate) fn done_frame(processing_time_ms: f64) -> Vec<u8> {
    let frame = StreamFrame {
        done: true,
        processing_time_ms: Some(processing_time_ms),
        ..StreamFrame::default()
    };
    let json = serde_json::to_string(&frame).unwrap_or_default();
    format!("data: {json}\n\n").into_bytes()
}

/// Scripted backend. Uploads and deletes mutate `documents` the way the
/// real service would, so `list_documents` reflects them.
#[derive(Default)]
pub(crate) struct FakeBackend {
    pub documents: Mutex<Vec<Document>>,
    pub failing_uploads: HashSet<String>,
    pub uploaded: Mutex<Vec<String>>,
    pub fail_deletes: bool,
    pub fail_lists: bool,
    pub list_calls: AtomicUsize,
    pub query_result: Mutex<Option<Result<QueryResponse, ClientError>>>,
    pub queries: Mutex<Vec<QueryRequest>>,
    pub stream_requests: Mutex<Vec<StreamQueryRequest>>,
    pub stream_head: Vec<Vec<u8>>,
    pub stream_tail: Vec<Result<Vec<u8>, String>>,
    pub stream_gate: Option<Arc<Notify>>,
    pub stream_open_error: Option<u16>,
    next_id: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(mut self, documents: Vec<Document>) -> Self {
        self.documents = Mutex::new(documents);
        self
    }

    pub fn failing_upload(mut self, filename: &str) -> Self {
        self.failing_uploads.insert(filename.to_string());
        self
    }

    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub fn failing_lists(mut self) -> Self {
        self.fail_lists = true;
        self
    }

    pub fn answering(self, result: Result<QueryResponse, ClientError>) -> Self {
        Self {
            query_result: Mutex::new(Some(result)),
            ..self
        }
    }

    /// Frames sent as soon as the stream opens, then (after `gate` is
    /// notified, if set) the tail.
    pub fn streaming(
        mut self,
        head: Vec<Vec<u8>>,
        tail: Vec<Result<Vec<u8>, String>>,
        gate: Option<Arc<Notify>>,
    ) -> Self {
        self.stream_head = head;
        self.stream_tail = tail;
        self.stream_gate = gate;
        self
    }

    pub fn refusing_streams(mut self, status: u16) -> Self {
        self.stream_open_error = Some(status);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RetrievalApi for FakeBackend {
    async fn upload_document(&self, file: &UploadFile) -> Result<UploadReceipt, ClientError> {
        self.uploaded.lock().await.push(file.filename.clone());
        if self.failing_uploads.contains(&file.filename) {
            return Err(server_error(500, "Upload failed: OCR backend unavailable"));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("uploaded-{n}");
        let mut stored = document(&id, &file.filename);
        stored.file_size = file.size();
        stored.file_type = file.suffix();
        self.documents.lock().await.push(stored);
        Ok(UploadReceipt {
            document_id: Some(DocumentId(id)),
            filename: file.filename.clone(),
            status: Some("success".to_string()),
            num_chunks: Some(3),
            message: Some("Document processed".to_string()),
            ..UploadReceipt::default()
        })
    }

    async fn list_documents(&self) -> Result<Vec<Document>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lists {
            return Err(ClientError::Network("connection refused".to_string()));
        }
        Ok(self.documents.lock().await.clone())
    }

    async fn delete_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<DeleteConfirmation, ClientError> {
        if self.fail_deletes {
            return Err(server_error(500, "Failed to delete document: disk full"));
        }
        let mut documents = self.documents.lock().await;
        let before = documents.len();
        documents.retain(|doc| &doc.id != document_id);
        if documents.len() == before {
            return Err(server_error(
                404,
                &format!("Document {document_id} not found"),
            ));
        }
        Ok(DeleteConfirmation {
            document_id: Some(document_id.clone()),
            deleted: Some(true),
            message: Some("Document deleted".to_string()),
        })
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, ClientError> {
        self.queries.lock().await.push(request.clone());
        self.query_result
            .lock()
            .await
            .take()
            .unwrap_or_else(|| Err(ClientError::Network("no scripted answer".to_string())))
    }

    async fn query_stream(&self, request: &StreamQueryRequest) -> Result<ByteStream, ClientError> {
        self.stream_requests.lock().await.push(request.clone());
        if let Some(status) = self.stream_open_error {
            return Err(server_error(status, "Query processing failed: model offline"));
        }

        let head = stream::iter(self.stream_head.clone().into_iter().map(Ok));
        let tail_chunks = self.stream_tail.clone();
        let gate = self.stream_gate.clone();
        let tail = stream::once(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            stream::iter(
                tail_chunks
                    .into_iter()
                    .map(|chunk| chunk.map_err(ClientError::Network)),
            )
        })
        .flatten();
        Ok(head.chain(tail).boxed())
    }

    async fn health(&self) -> Result<serde_json::Value, ClientError> {
        Ok(serde_json::json!({ "status": "healthy" }))
    }
}
