use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{Citation, Document, DocumentId, QueryId},
    error::MissingDocumentId,
};

pub const UPLOAD_PATH: &str = "/api/upload";
pub const DOCUMENTS_PATH: &str = "/api/documents";
pub const QUERY_PATH: &str = "/api/query";
pub const QUERY_STREAM_PATH: &str = "/api/query/stream";
pub const HEALTH_PATH: &str = "/health";

/// Multipart field name the upload endpoint reads the file from.
pub const UPLOAD_FIELD: &str = "file";

pub fn document_path(document_id: &DocumentId) -> String {
    format!("{DOCUMENTS_PATH}/{document_id}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentList {
    pub documents: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
}

/// Delete confirmation. The backend does not commit to a shape, so every
/// field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteConfirmation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body returned by `POST /api/upload`.
///
/// Two shapes are seen in practice: a receipt keyed by `document_id`
/// (`status`, `num_chunks`, `message`) and a full document record keyed by
/// `id`. Both deserialize into this struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(
        default,
        with = "crate::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub upload_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_chunks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_pages: Option<u32>,
}

/// What the client knows about a file it just sent, used to fill in metadata
/// the upload response leaves out.
#[derive(Debug, Clone)]
pub struct LocalFileFacts {
    pub file_type: String,
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl UploadReceipt {
    pub fn document_id(&self) -> Option<&DocumentId> {
        self.id.as_ref().or(self.document_id.as_ref())
    }

    pub fn into_document(self, local: LocalFileFacts) -> Result<Document, MissingDocumentId> {
        let id = self.id.or(self.document_id).ok_or(MissingDocumentId)?;
        Ok(Document {
            id,
            filename: self.filename,
            file_type: self.file_type.unwrap_or(local.file_type),
            file_size: self.file_size.unwrap_or(local.file_size),
            upload_time: self.upload_time.unwrap_or(local.uploaded_at),
            num_chunks: self.num_chunks.unwrap_or_default(),
            num_pages: self.num_pages,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    pub top_k: u32,
    pub use_reranker: bool,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamQueryRequest {
    pub query: String,
    pub top_k: u32,
    pub use_reranker: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query_id: QueryId,
    pub query: String,
    pub response: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub num_contexts_retrieved: u32,
    #[serde(default)]
    pub num_contexts_used: u32,
    pub processing_time_ms: f64,
}

/// JSON payload of one `data: ` line on the answer stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<QueryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Metadata {
        query_id: Option<QueryId>,
        citations: Vec<Citation>,
    },
    Content(String),
    Done {
        processing_time_ms: Option<f64>,
    },
}

impl StreamFrame {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    /// Reads a decoded payload field by field. A field of the wrong type is
    /// treated as absent, so `content` survives odd siblings.
    pub fn from_value(payload: &serde_json::Value) -> Self {
        let field = |name: &str| payload.get(name).filter(|value| !value.is_null());
        Self {
            content: field("content")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            query_id: field("query_id").and_then(|value| match value {
                serde_json::Value::String(id) => Some(QueryId(id.clone())),
                serde_json::Value::Number(id) => Some(QueryId(id.to_string())),
                _ => None,
            }),
            citations: field("citations")
                .and_then(|value| serde_json::from_value(value.clone()).ok()),
            done: field("done")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            processing_time_ms: field("processing_time_ms").and_then(serde_json::Value::as_f64),
        }
    }

    /// Splits a frame into events, metadata first and the terminal marker
    /// last. Empty content is not an event.
    pub fn into_events(self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.query_id.is_some() || self.citations.is_some() {
            events.push(StreamEvent::Metadata {
                query_id: self.query_id,
                citations: self.citations.unwrap_or_default(),
            });
        }
        if let Some(content) = self.content.filter(|c| !c.is_empty()) {
            events.push(StreamEvent::Content(content));
        }
        if self.done {
            events.push(StreamEvent::Done {
                processing_time_ms: self.processing_time_ms,
            });
        }
        events
    }
}
