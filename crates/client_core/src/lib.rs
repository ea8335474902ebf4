//! Client-side orchestration for the retrieval service: uploads, the
//! document list, query turns and citation lookup.

use shared::domain::Document;

pub mod activity;
pub mod citations;
pub mod config;
pub mod display;
pub mod error;
pub mod notices;
pub mod query_session;
pub mod registry;
pub mod stream_decoder;
pub mod transport;
pub mod types;
pub mod upload;
mod workspace;

pub use activity::{ActivityGuard, ActivityIndicator};
pub use citations::CitationIndex;
pub use error::{ClientError, QueryError};
pub use notices::{Notice, NoticeKind, Notices};
pub use query_session::{Delivery, QueryOptions, QuerySession, TurnPhase};
pub use registry::DocumentRegistry;
pub use transport::{ApiClient, ByteStream, RetrievalApi};
pub use types::{Message, MessageId, MessageStatus, UploadFile, UploadStatus, UploadTask};
pub use upload::{BatchReport, FileOutcome, UploadOrchestrator};
pub use workspace::Workspace;

/// State changes published to whoever renders them.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    UploadProgress {
        filename: String,
        progress: u8,
    },
    UploadSucceeded {
        filename: String,
        document: Document,
    },
    /// `task` is the row as it stood when it left the progress list.
    UploadFailed {
        filename: String,
        reason: String,
        task: UploadTask,
    },
    DocumentsChanged {
        count: usize,
    },
    MessageAppended(Message),
    MessageUpdated(Message),
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
