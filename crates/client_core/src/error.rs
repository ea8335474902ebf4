use shared::error::ApiErrorBody;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// No response was received (connect failure, reset, timeout).
    #[error("network error: {0}")]
    Network(String),
    #[error("server responded with {status}: {body}")]
    Server { status: u16, body: String },
    /// A body or stream frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Rejected locally before any request was issued.
    #[error("{0}")]
    Validation(String),
}

impl ClientError {
    /// Short human-readable reason, preferring the backend's `detail` text
    /// over the raw response body.
    pub fn reason(&self) -> String {
        match self {
            Self::Server { status, body } => ApiErrorBody::message_from(body)
                .unwrap_or_else(|| {
                    if body.trim().is_empty() {
                        format!("request failed with status {status}")
                    } else {
                        format!("request failed with status {status}: {}", body.trim())
                    }
                }),
            Self::Network(message) | Self::Decode(message) | Self::Validation(message) => {
                message.clone()
            }
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::Server {
                status: status.as_u16(),
                body: String::new(),
            };
        }
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Why a query submission was turned away before a turn started.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("a query is already in flight for this conversation")]
    Busy,
    #[error("{0}")]
    Validation(String),
}
