//! Error types for flowq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("queue error: {0}")]
    Queue(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The message body is not a work item: bad JSON, or `id`/`type` missing.
    #[error("malformed work item: {0}")]
    MalformedWorkItem(String),

    #[error("no processor registered for work item type '{0}'")]
    UnregisteredWorkItem(String),

    /// A handler failure that redelivery cannot fix.
    #[error("non-retriable failure: {0}")]
    NonRetriable(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Processing(#[from] anyhow::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a failed work item should be left on the queue for redelivery.
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            Error::MalformedWorkItem(_) | Error::NonRetriable(_) | Error::Cancelled
        )
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
