//! HTTP access to the retrieval backend.
//!
//! [`ApiClient`] is the only place that touches `reqwest`. It knows how to
//! issue JSON, multipart, delete and streaming requests and how to turn
//! non-2xx responses into [`ClientError::Server`]; it carries no business
//! logic and never retries. Orchestration components depend on the
//! [`RetrievalApi`] seam instead of the concrete client.

use std::time::Duration;

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use reqwest::{multipart, Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{Document, DocumentId},
    protocol::{
        document_path, DeleteConfirmation, DocumentList, QueryRequest, QueryResponse,
        StreamQueryRequest, UploadReceipt, DOCUMENTS_PATH, HEALTH_PATH, QUERY_PATH,
        QUERY_STREAM_PATH, UPLOAD_FIELD, UPLOAD_PATH,
    },
};
use tracing::debug;
use url::Url;

use crate::{error::ClientError, types::UploadFile};

/// Raw body chunks of a streamed response, in transport order.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ClientError>>;

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &Url) -> Self {
        Self {
            http: Client::new(),
            base_url: normalize_base(base_url),
        }
    }

    pub fn with_timeout(base_url: &Url, timeout: Option<Duration>) -> Result<Self, ClientError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Network(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: normalize_base(base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        debug!(method = "GET", path, "backend request");
        let response = self.http.get(self.endpoint(path)).send().await?;
        read_json(response).await
    }

    pub async fn submit_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(method = "POST", path, "backend request");
        let response = self.http.post(self.endpoint(path)).json(body).send().await?;
        read_json(response).await
    }

    pub async fn submit_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        file: &UploadFile,
    ) -> Result<T, ClientError> {
        debug!(
            method = "POST",
            path,
            filename = %file.filename,
            size_bytes = file.bytes.len(),
            "backend multipart request"
        );
        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.filename.clone())
            .mime_str(file.mime_type())
            .map_err(|e| ClientError::Validation(format!("invalid mime type: {e}")))?;
        let form = multipart::Form::new().part(UPLOAD_FIELD, part);
        let response = self
            .http
            .post(self.endpoint(path))
            .multipart(form)
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn delete_resource<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        debug!(method = "DELETE", path, "backend request");
        let response = self.http.delete(self.endpoint(path)).send().await?;
        read_json(response).await
    }

    /// Issues the request and hands back the body as it arrives. Status is
    /// checked before any chunk is yielded.
    pub async fn open_stream<B>(&self, path: &str, body: &B) -> Result<ByteStream, ClientError>
    where
        B: Serialize + ?Sized,
    {
        debug!(method = "POST", path, "backend stream request");
        let response = self
            .http
            .post(self.endpoint(path))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(body)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| ClientError::Network(e.to_string()))
            })
            .boxed())
    }
}

fn normalize_base(base_url: &Url) -> String {
    base_url.as_str().trim_end_matches('/').to_string()
}

async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Server {
        status: status.as_u16(),
        body,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let response = ensure_success(response).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ClientError::Network(e.to_string()))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Typed operations of the retrieval backend.
#[async_trait]
pub trait RetrievalApi: Send + Sync {
    async fn upload_document(&self, file: &UploadFile) -> Result<UploadReceipt, ClientError>;
    async fn list_documents(&self) -> Result<Vec<Document>, ClientError>;
    async fn delete_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<DeleteConfirmation, ClientError>;
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, ClientError>;
    async fn query_stream(&self, request: &StreamQueryRequest) -> Result<ByteStream, ClientError>;
    async fn health(&self) -> Result<serde_json::Value, ClientError>;
}

#[async_trait]
impl RetrievalApi for ApiClient {
    async fn upload_document(&self, file: &UploadFile) -> Result<UploadReceipt, ClientError> {
        self.submit_multipart(UPLOAD_PATH, file).await
    }

    async fn list_documents(&self) -> Result<Vec<Document>, ClientError> {
        let list: DocumentList = self.get_json(DOCUMENTS_PATH).await?;
        Ok(list.documents)
    }

    async fn delete_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<DeleteConfirmation, ClientError> {
        self.delete_resource(&document_path(document_id)).await
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, ClientError> {
        self.submit_json(QUERY_PATH, request).await
    }

    async fn query_stream(&self, request: &StreamQueryRequest) -> Result<ByteStream, ClientError> {
        self.open_stream(QUERY_STREAM_PATH, request).await
    }

    async fn health(&self) -> Result<serde_json::Value, ClientError> {
        self.get_json(HEALTH_PATH).await
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
