use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("network error: {0}")]
    Http(String),
    #[error("day fact api error: http {status}; body={body}")]
    Api { status: u16, body: String },
    #[error("invalid day fact response: {0}")]
    InvalidResponse(String),
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("calendar state lock poisoned: {0}")]
    StateLock(String),
    #[error("no days selected")]
    EmptySelection,
    #[error("a bulk blocking request is already in flight")]
    BulkInFlight,
}

impl CalendarError {
    pub(crate) fn lock<T>(error: std::sync::PoisonError<T>) -> Self {
        Self::StateLock(error.to_string())
    }
}
