use std::sync::Arc;

use shared::{domain::DocumentId, protocol::DeleteConfirmation};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    activity::ActivityIndicator,
    config::Settings,
    error::{ClientError, QueryError},
    notices::Notices,
    query_session::{QueryOptions, QuerySession},
    registry::DocumentRegistry,
    transport::{ApiClient, RetrievalApi},
    types::{Message, UploadFile},
    upload::{BatchReport, UploadOrchestrator},
    ClientEvent,
};

/// One UI session: a single backend client shared by the document list,
/// the upload pipeline and the conversation.
pub struct Workspace {
    api: Arc<dyn RetrievalApi>,
    registry: DocumentRegistry,
    uploads: UploadOrchestrator,
    chat: QuerySession,
    notices: Notices,
    activity: ActivityIndicator,
    events: broadcast::Sender<ClientEvent>,
}

impl Workspace {
    pub fn new(api: Arc<dyn RetrievalApi>, options: QueryOptions) -> Self {
        let (events, _) = broadcast::channel(1024);
        let activity = ActivityIndicator::new();
        let notices = Notices::new();
        Self {
            registry: DocumentRegistry::new_with_dependencies(
                Arc::clone(&api),
                activity.clone(),
                events.clone(),
            ),
            uploads: UploadOrchestrator::new_with_dependencies(
                Arc::clone(&api),
                activity.clone(),
                notices.clone(),
                events.clone(),
            ),
            chat: QuerySession::new_with_dependencies(
                Arc::clone(&api),
                options,
                activity.clone(),
                events.clone(),
            ),
            api,
            notices,
            activity,
            events,
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings.base_url()?;
        let client = ApiClient::with_timeout(&base_url, settings.request_timeout())?;
        info!(server_url = %base_url, "workspace connected");
        Ok(Self::new(Arc::new(client), settings.query_options()))
    }

    /// Session start: pull the document list.
    pub async fn start(&self) -> Result<(), ClientError> {
        self.registry.refresh().await.map(|_| ())
    }

    /// Uploads a batch, records every accepted document, then resyncs the
    /// list once if anything was accepted.
    pub async fn upload(&self, files: Vec<UploadFile>) -> BatchReport {
        let report = self.uploads.submit_batch(files).await;
        for document in report.accepted() {
            self.registry.insert_uploaded(document.clone()).await;
        }
        if report.any_accepted() {
            if let Err(err) = self.registry.refresh().await {
                warn!(error = %err, "document refresh after upload failed");
            }
        }
        report
    }

    pub async fn ask(&self, query: &str) -> Result<Message, QueryError> {
        self.chat.submit(query).await
    }

    pub async fn delete_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<DeleteConfirmation, ClientError> {
        self.registry.remove(document_id).await
    }

    pub async fn health(&self) -> Result<serde_json::Value, ClientError> {
        self.api.health().await
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn uploads(&self) -> &UploadOrchestrator {
        &self.uploads
    }

    pub fn chat(&self) -> &QuerySession {
        &self.chat
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub fn is_busy(&self) -> bool {
        self.activity.is_busy()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/workspace_tests.rs"]
mod tests;
