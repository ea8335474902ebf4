//! Sequential multi-file upload with per-file progress.
//!
//! Files go out one at a time in the order they were picked, so progress on
//! screen always belongs to a single file. A failed file is reported and
//! dropped from the progress list right away; the batch carries on with the
//! next file regardless.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use shared::{domain::Document, protocol::LocalFileFacts};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    activity::ActivityIndicator,
    error::ClientError,
    notices::{NoticeKind, Notices},
    transport::RetrievalApi,
    types::{UploadFile, UploadStatus, UploadTask},
    ClientEvent,
};

/// How long a finished file stays in the progress list.
pub const SUCCESS_LINGER: Duration = Duration::from_millis(2000);

#[derive(Debug)]
pub enum FileOutcome {
    Accepted {
        filename: String,
        document: Document,
    },
    Failed {
        filename: String,
        error: ClientError,
    },
}

impl FileOutcome {
    pub fn filename(&self) -> &str {
        match self {
            Self::Accepted { filename, .. } | Self::Failed { filename, .. } => filename,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Per-file outcomes of one batch, in submission order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn accepted(&self) -> impl Iterator<Item = &Document> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            FileOutcome::Accepted { document, .. } => Some(document),
            FileOutcome::Failed { .. } => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ClientError)> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            FileOutcome::Failed { filename, error } => Some((filename.as_str(), error)),
            FileOutcome::Accepted { .. } => None,
        })
    }

    pub fn any_accepted(&self) -> bool {
        self.outcomes.iter().any(FileOutcome::is_accepted)
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

#[derive(Debug, Default)]
struct TaskBoard {
    next_generation: u64,
    tasks: Vec<(u64, UploadTask)>,
}

impl TaskBoard {
    fn register(&mut self, filename: &str) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.tasks.retain(|(_, task)| task.filename != filename);
        self.tasks.push((
            generation,
            UploadTask {
                filename: filename.to_string(),
                progress: 0,
                status: UploadStatus::InProgress,
            },
        ));
        generation
    }

    fn update(&mut self, generation: u64, progress: u8, status: UploadStatus) {
        if let Some((_, task)) = self.tasks.iter_mut().find(|(g, _)| *g == generation) {
            task.progress = progress;
            task.status = status;
        }
    }

    /// Marks the row failed and takes it off the board.
    fn fail(&mut self, generation: u64) -> Option<UploadTask> {
        let index = self.tasks.iter().position(|(g, _)| *g == generation)?;
        let (_, mut task) = self.tasks.remove(index);
        task.status = UploadStatus::Failed;
        Some(task)
    }

    fn remove(&mut self, generation: u64) {
        self.tasks.retain(|(g, _)| *g != generation);
    }
}

pub struct UploadOrchestrator {
    api: Arc<dyn RetrievalApi>,
    board: Arc<Mutex<TaskBoard>>,
    activity: ActivityIndicator,
    notices: Notices,
    events: broadcast::Sender<ClientEvent>,
    success_linger: Duration,
}

impl UploadOrchestrator {
    pub fn new(api: Arc<dyn RetrievalApi>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self::new_with_dependencies(api, ActivityIndicator::new(), Notices::new(), events)
    }

    pub fn new_with_dependencies(
        api: Arc<dyn RetrievalApi>,
        activity: ActivityIndicator,
        notices: Notices,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            api,
            board: Arc::new(Mutex::new(TaskBoard::default())),
            activity,
            notices,
            events,
            success_linger: SUCCESS_LINGER,
        }
    }

    pub fn with_success_linger(mut self, linger: Duration) -> Self {
        self.success_linger = linger;
        self
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Progress rows currently on display, oldest first.
    pub async fn tasks(&self) -> Vec<UploadTask> {
        let board = self.board.lock().await;
        board.tasks.iter().map(|(_, task)| task.clone()).collect()
    }

    pub async fn submit_batch(&self, files: Vec<UploadFile>) -> BatchReport {
        let _busy = self.activity.enter();
        if files.is_empty() {
            debug!("empty upload batch");
            return BatchReport::default();
        }

        info!(files = files.len(), "upload batch started");
        let mut report = BatchReport {
            outcomes: Vec::with_capacity(files.len()),
        };
        for file in files {
            report.outcomes.push(self.upload_one(file).await);
        }

        let accepted = report.accepted().count();
        info!(
            accepted,
            failed = report.outcomes.len() - accepted,
            "upload batch finished"
        );
        report
    }

    async fn upload_one(&self, file: UploadFile) -> FileOutcome {
        let filename = file.filename.clone();
        let generation = self.board.lock().await.register(&filename);
        self.emit(ClientEvent::UploadProgress {
            filename: filename.clone(),
            progress: 0,
        });

        match self.transfer(&file).await {
            Ok(document) => {
                self.board
                    .lock()
                    .await
                    .update(generation, 100, UploadStatus::Done);
                self.emit(ClientEvent::UploadProgress {
                    filename: filename.clone(),
                    progress: 100,
                });
                self.schedule_removal(generation);

                info!(
                    filename = %filename,
                    document_id = %document.id,
                    "upload accepted"
                );
                self.notices
                    .post(
                        NoticeKind::Success,
                        format!("Document \"{filename}\" uploaded successfully!"),
                    )
                    .await;
                self.emit(ClientEvent::UploadSucceeded {
                    filename: filename.clone(),
                    document: document.clone(),
                });
                FileOutcome::Accepted { filename, document }
            }
            Err(error) => {
                let reason = error.reason();
                warn!(filename = %filename, error = %error, "upload failed");
                let task = self
                    .board
                    .lock()
                    .await
                    .fail(generation)
                    .unwrap_or_else(|| UploadTask {
                        filename: filename.clone(),
                        progress: 0,
                        status: UploadStatus::Failed,
                    });
                self.notices
                    .post(NoticeKind::Error, format!("Upload error: {reason}"))
                    .await;
                self.emit(ClientEvent::UploadFailed {
                    filename: filename.clone(),
                    reason,
                    task,
                });
                FileOutcome::Failed { filename, error }
            }
        }
    }

    async fn transfer(&self, file: &UploadFile) -> Result<Document, ClientError> {
        if file.kind().is_none() {
            return Err(ClientError::Validation(format!(
                "unsupported file type: {} (accepted: PDF, PNG, JPG, DOCX, PPTX)",
                file.filename
            )));
        }

        let receipt = self.api.upload_document(file).await?;
        receipt
            .into_document(LocalFileFacts {
                file_type: file.suffix(),
                file_size: file.size(),
                uploaded_at: Utc::now(),
            })
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn schedule_removal(&self, generation: u64) {
        let board = Arc::clone(&self.board);
        let linger = self.success_linger;
        tokio::spawn(async move {
            tokio::time::sleep(linger).await;
            board.lock().await.remove(generation);
        });
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/upload_tests.rs"]
mod tests;
