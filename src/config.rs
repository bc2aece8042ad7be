// Synchronization configuration
//
// Plain data the host application loads from its settings file and uses to
// wire up the controllers. Defaults point at a local development backend.

use crate::tasks::synchronizer::{PollPolicy, ReconnectPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_WS_BASE_URL: &str = "ws://localhost:8000";
const DEFAULT_DEBOUNCE_MS: u64 = 1500;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub base_url: String,
    pub ws_base_url: String,
    pub reconnect: ReconnectPolicy,
    pub poll: PollPolicy,
    pub debounce: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ws_base_url: DEFAULT_WS_BASE_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
            poll: PollPolicy::default(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}

impl SyncConfig {
    pub fn ws_url_for_task(&self, task_id: &str) -> String {
        format!(
            "{}/ws/progress/{}",
            self.ws_base_url.trim_end_matches('/'),
            task_id
        )
    }
}
