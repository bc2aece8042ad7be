// Error types for the synchronization layer
//
// TransportError covers failures to reach the status endpoints (push or poll)
// and is recovered locally via backoff/retry - it is reported through observer
// callbacks, never escalated as a hard failure. SaveError covers remote
// persistence failures and surfaces as observable state on the auto-save
// manager. StoreError covers the durable local backup store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("server returned HTTP {code}")]
    Status { code: u16 },

    #[error("http error: {0}")]
    Http(String),

    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Http(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("server rejected save: HTTP {code}")]
    Rejected { code: u16 },

    #[error("http error: {0}")]
    Http(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<reqwest::Error> for SaveError {
    fn from(err: reqwest::Error) -> Self {
        SaveError::Http(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(String),

    #[error("serialization error: {0}")]
    Serialize(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Sqlite(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialize(err.to_string())
    }
}
