use std::{fmt, io, path::Path};

use shared::domain::{Citation, FileKind, Role};
use thiserror::Error;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// A file picked by the user, fully read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("path has no usable file name: {}", path.display()),
                )
            })?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self { filename, bytes })
    }

    pub fn kind(&self) -> Option<FileKind> {
        FileKind::from_filename(&self.filename)
    }

    pub fn mime_type(&self) -> &'static str {
        self.kind()
            .map(FileKind::mime_type)
            .unwrap_or(FALLBACK_MIME_TYPE)
    }

    /// Extension with its leading dot, the way the backend records
    /// `file_type`.
    pub fn suffix(&self) -> String {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| format!(".{ext}"))
            .unwrap_or_default()
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Pending,
    Streaming,
    Complete,
    Error,
}

impl MessageStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Streaming => 1,
            Self::Complete | Self::Error => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("message {id} cannot move from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub id: MessageId,
    pub from: MessageStatus,
    pub to: MessageStatus,
}

/// One entry of a conversation log. Only the owning session mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: MessageId,
    role: Role,
    content: String,
    citations: Option<Vec<Citation>>,
    processing_time_ms: Option<f64>,
    status: MessageStatus,
}

impl Message {
    pub(crate) fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            citations: None,
            processing_time_ms: None,
            status: MessageStatus::Complete,
        }
    }

    pub(crate) fn assistant_placeholder(id: MessageId) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
            citations: None,
            processing_time_ms: None,
            status: MessageStatus::Pending,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn citations(&self) -> Option<&[Citation]> {
        self.citations.as_deref()
    }

    pub fn processing_time_ms(&self) -> Option<f64> {
        self.processing_time_ms
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }

    pub(crate) fn advance(&mut self, next: MessageStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_advance_to(next) {
            return Err(InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub(crate) fn push_delta(&mut self, delta: &str) {
        self.content.push_str(delta);
    }

    pub(crate) fn complete(
        &mut self,
        content: Option<String>,
        citations: Vec<Citation>,
        processing_time_ms: Option<f64>,
    ) -> Result<(), InvalidTransition> {
        self.advance(MessageStatus::Complete)?;
        if let Some(content) = content {
            self.content = content;
        }
        self.citations = (!citations.is_empty()).then_some(citations);
        self.processing_time_ms = processing_time_ms;
        Ok(())
    }

    pub(crate) fn fail(&mut self, reason: &str) -> Result<(), InvalidTransition> {
        self.advance(MessageStatus::Error)?;
        self.content = format!("Error: {reason}");
        self.citations = None;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    InProgress,
    Done,
    Failed,
}

/// Progress row for one file of the batch currently being uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub filename: String,
    pub progress: u8,
    pub status: UploadStatus,
}
