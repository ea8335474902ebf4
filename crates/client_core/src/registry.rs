//! Local view of the document corpus.
//!
//! The server is authoritative: `refresh` replaces the list wholesale.
//! Deletes are optimistic and are not rolled back when the server call
//! fails; the caller gets the error and decides whether to `refresh`.

use std::{collections::HashSet, sync::Arc};

use shared::{
    domain::{Document, DocumentId},
    protocol::DeleteConfirmation,
};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

use crate::{activity::ActivityIndicator, error::ClientError, transport::RetrievalApi, ClientEvent};

pub struct DocumentRegistry {
    api: Arc<dyn RetrievalApi>,
    documents: RwLock<Vec<Document>>,
    last_error: Mutex<Option<String>>,
    activity: ActivityIndicator,
    events: broadcast::Sender<ClientEvent>,
}

impl DocumentRegistry {
    pub fn new(api: Arc<dyn RetrievalApi>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self::new_with_dependencies(api, ActivityIndicator::new(), events)
    }

    pub fn new_with_dependencies(
        api: Arc<dyn RetrievalApi>,
        activity: ActivityIndicator,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            api,
            documents: RwLock::new(Vec::new()),
            last_error: Mutex::new(None),
            activity,
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn refresh(&self) -> Result<Vec<Document>, ClientError> {
        let _busy = self.activity.enter();
        let listed = match self.api.list_documents().await {
            Ok(listed) => listed,
            Err(err) => {
                warn!(error = %err, "document refresh failed");
                *self.last_error.lock().await = Some(err.reason());
                return Err(err);
            }
        };

        let mut seen = HashSet::new();
        let documents: Vec<Document> = listed
            .into_iter()
            .filter(|doc| seen.insert(doc.id.clone()))
            .collect();
        info!(count = documents.len(), "document list refreshed");

        *self.documents.write().await = documents.clone();
        *self.last_error.lock().await = None;
        self.emit_changed(documents.len());
        Ok(documents)
    }

    /// Drops the document locally, then asks the server to delete it.
    pub async fn remove(&self, document_id: &DocumentId) -> Result<DeleteConfirmation, ClientError> {
        let _busy = self.activity.enter();
        let remaining = {
            let mut documents = self.documents.write().await;
            let before = documents.len();
            documents.retain(|doc| &doc.id != document_id);
            (documents.len() != before).then_some(documents.len())
        };
        if let Some(count) = remaining {
            self.emit_changed(count);
        }

        match self.api.delete_document(document_id).await {
            Ok(confirmation) => {
                info!(document_id = %document_id, "document deleted");
                Ok(confirmation)
            }
            Err(err) => {
                warn!(
                    document_id = %document_id,
                    error = %err,
                    "document delete failed; local list is stale until the next refresh"
                );
                *self.last_error.lock().await = Some(err.reason());
                Err(err)
            }
        }
    }

    /// Records a document returned by an upload without a round trip. An
    /// entry with the same id is replaced in place.
    pub async fn insert_uploaded(&self, document: Document) {
        let count = {
            let mut documents = self.documents.write().await;
            match documents.iter_mut().find(|doc| doc.id == document.id) {
                Some(existing) => *existing = document,
                None => documents.push(document),
            }
            documents.len()
        };
        self.emit_changed(count);
    }

    pub async fn documents(&self) -> Vec<Document> {
        self.documents.read().await.clone()
    }

    pub async fn get(&self, document_id: &DocumentId) -> Option<Document> {
        self.documents
            .read()
            .await
            .iter()
            .find(|doc| &doc.id == document_id)
            .cloned()
    }

    pub async fn contains(&self, document_id: &DocumentId) -> bool {
        self.get(document_id).await.is_some()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.lock().await.clone()
    }

    fn emit_changed(&self, count: usize) {
        let _ = self.events.send(ClientEvent::DocumentsChanged { count });
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
