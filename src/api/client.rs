// HTTP client for the editor backend
//
// Endpoints consumed by this layer:
// - GET    /api/tasks/{task_id}/status          (poll fallback for the push channel)
// - GET    /api/tasks?status=&task_type=&...    (task listing)
// - DELETE /api/tasks/{task_id}                 (user-driven cancellation)
// - PUT    /api/pages/{page_id}/transcriptions/manual  (debounced persistence target)
//
// The StatusFetcher and TranscriptionWriter traits are the seams the
// synchronizer and auto-save manager depend on, so tests substitute fakes
// without a running server.

use super::types::{
    CancelOutcome, LineEdit, TaskFilter, TaskList, TaskSnapshot, TranscriptionRecord,
    TranscriptionSource,
};
use crate::error::{SaveError, TransportError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn fetch_status(&self, task_id: &str) -> Result<TaskSnapshot, TransportError> {
        let url = format!("{}/api/tasks/{}/status", self.base_url, task_id);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Status {
                code: response.status().as_u16(),
            });
        }

        let snapshot = response
            .json::<TaskSnapshot>()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(snapshot)
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<TaskList, TransportError> {
        let url = format!("{}/api/tasks", self.base_url);

        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(status) = filter.status {
            query.push(("status", status.to_string()));
        }
        if let Some(task_type) = &filter.task_type {
            query.push(("task_type", task_type.clone()));
        }
        if let Some(limit) = filter.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(offset) = filter.offset {
            query.push(("offset", offset.to_string()));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Status {
                code: response.status().as_u16(),
            });
        }

        let tasks = response
            .json::<TaskList>()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(tasks)
    }

    /// Request cancellation of a running task. A task already in a terminal
    /// state reports `AlreadyFinished` rather than failing.
    pub async fn cancel_task(&self, task_id: &str) -> Result<CancelOutcome, TransportError> {
        #[derive(Deserialize)]
        struct CancelResponse {
            status: CancelOutcome,
        }

        let url = format!("{}/api/tasks/{}", self.base_url, task_id);

        let response = self.client.delete(&url).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Status {
                code: response.status().as_u16(),
            });
        }

        let outcome = response
            .json::<CancelResponse>()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        log::info!("Task {} cancellation: {:?}", task_id, outcome.status);
        Ok(outcome.status)
    }

    fn transcription_url(&self, page_id: i64) -> String {
        format!(
            "{}/api/pages/{}/transcriptions/manual",
            self.base_url, page_id
        )
    }

    /// Replace the manual transcription for a page with an ordered edit list.
    /// Returns the canonical persisted representation, server ids included.
    pub async fn save_transcription(
        &self,
        page_id: i64,
        lines: &[LineEdit],
        source: TranscriptionSource,
    ) -> Result<TranscriptionRecord, SaveError> {
        let url = self.transcription_url(page_id);

        let body = serde_json::json!({
            "lines": lines,
            "source": source,
        });

        let response = self.client.put(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(SaveError::Rejected {
                code: response.status().as_u16(),
            });
        }

        let record = response
            .json::<TranscriptionRecord>()
            .await
            .map_err(|e| SaveError::Http(e.to_string()))?;

        log::debug!(
            "Persisted {} lines for page {} (transcription {})",
            record.lines.len(),
            page_id,
            record.id
        );
        Ok(record)
    }
}

/// Seam used by the polling transport.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch_status(&self, task_id: &str) -> Result<TaskSnapshot, TransportError>;
}

#[async_trait]
impl StatusFetcher for ApiClient {
    async fn fetch_status(&self, task_id: &str) -> Result<TaskSnapshot, TransportError> {
        ApiClient::fetch_status(self, task_id).await
    }
}

/// Seam used by the auto-save manager for its remote writes.
#[async_trait]
pub trait TranscriptionWriter: Send + Sync {
    async fn write_lines(
        &self,
        page_id: i64,
        lines: &[LineEdit],
    ) -> Result<TranscriptionRecord, SaveError>;
}

#[async_trait]
impl TranscriptionWriter for ApiClient {
    async fn write_lines(
        &self,
        page_id: i64,
        lines: &[LineEdit],
    ) -> Result<TranscriptionRecord, SaveError> {
        self.save_transcription(page_id, lines, TranscriptionSource::Manual)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_transcription_write_url_targets_manual_route() {
        // The backend mounts its only write route under .../transcriptions/manual
        let client = ApiClient::new("http://localhost:8000").unwrap();
        assert_eq!(
            client.transcription_url(7),
            "http://localhost:8000/api/pages/7/transcriptions/manual"
        );
    }
}
