// Task status synchronizer
//
// Tracks one background job (inference or training) over the push transport,
// reconnecting with exponential backoff while the task is non-terminal, or
// over a polling loop as a caller-selected alternative.
//
// The reconnect decision must use the *latest* status observed on the wire,
// not whatever was in scope when the connection was opened. Every inbound
// snapshot therefore writes its status into a shared cell before the observer
// runs, and the close path reads that cell.

use super::transport::{ProgressTransport, TransportEvent};
use crate::api::client::StatusFetcher;
use crate::api::types::{TaskSnapshot, TaskStatus};
use crate::error::TransportError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_INTERVAL_MS: u64 = 2000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_POLL_ERROR_INTERVAL_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_interval: Duration::from_millis(DEFAULT_BASE_INTERVAL_MS),
        }
    }
}

impl ReconnectPolicy {
    /// Backoff delay before reconnect attempt `attempt` (1-based):
    /// base_interval * 2^attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_interval * 2u32.saturating_pow(attempt)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Interval between polls while the endpoint is reachable.
    pub interval: Duration,
    /// Longer interval applied after a fetch error. Polling retries
    /// indefinitely; only a terminal snapshot or cancellation stops it.
    pub error_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            error_interval: Duration::from_millis(DEFAULT_POLL_ERROR_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    pub attempts: u32,
    /// True once reconnection gave up after max_attempts. Exhaustion is
    /// silent (no error callback); callers wanting a "disconnected, retry
    /// exhausted" indicator read it here.
    pub exhausted: bool,
}

pub trait StatusObserver: Send + Sync {
    fn on_snapshot(&self, snapshot: &TaskSnapshot);
    fn on_transport_error(&self, error: &TransportError);
}

struct Shared {
    info: RwLock<ConnectionInfo>,
    /// Side-channel cell holding the latest status seen on the wire. Written
    /// before the observer callback runs, read by the close handler.
    last_status: RwLock<Option<TaskStatus>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            info: RwLock::new(ConnectionInfo {
                state: ConnectionState::Connecting,
                attempts: 0,
                exhausted: false,
            }),
            last_status: RwLock::new(None),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.info.write().state = state;
    }

    /// Record an inbound status. Returns false when a terminal status was
    /// already recorded, in which case the snapshot must be dropped (the
    /// first terminal snapshot observed is authoritative).
    fn record_status(&self, status: TaskStatus) -> bool {
        let mut last = self.last_status.write();
        if last.is_some_and(|s| s.is_terminal()) {
            return false;
        }
        *last = Some(status);
        true
    }

    fn last_is_terminal(&self) -> bool {
        self.last_status.read().is_some_and(|s| s.is_terminal())
    }
}

/// Handle to a live subscription or polling loop. Teardown is explicit:
/// call unsubscribe when the owning view goes away, or the loop keeps its
/// connection until the task turns terminal.
pub struct SubscriptionHandle {
    cancel: CancellationToken,
    shared: Arc<Shared>,
}

impl SubscriptionHandle {
    pub fn connection_info(&self) -> ConnectionInfo {
        self.shared.info.read().clone()
    }

    pub fn last_status(&self) -> Option<TaskStatus> {
        *self.shared.last_status.read()
    }

    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

pub struct TaskStatusSynchronizer {
    transport: Arc<dyn ProgressTransport>,
    fetcher: Arc<dyn StatusFetcher>,
    reconnect: ReconnectPolicy,
    poll_policy: PollPolicy,
}

impl TaskStatusSynchronizer {
    pub fn new(transport: Arc<dyn ProgressTransport>, fetcher: Arc<dyn StatusFetcher>) -> Self {
        Self {
            transport,
            fetcher,
            reconnect: ReconnectPolicy::default(),
            poll_policy: PollPolicy::default(),
        }
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// Open a push connection for `task_id` and keep it alive until the task
    /// turns terminal, reconnection is exhausted, or the handle is
    /// unsubscribed.
    pub fn subscribe(
        &self,
        task_id: impl Into<String>,
        observer: Arc<dyn StatusObserver>,
    ) -> SubscriptionHandle {
        let task_id = task_id.into();
        let shared = Arc::new(Shared::new());
        let cancel = CancellationToken::new();

        tokio::spawn(push_loop(
            self.transport.clone(),
            task_id,
            observer,
            shared.clone(),
            cancel.clone(),
            self.reconnect,
        ));

        SubscriptionHandle { cancel, shared }
    }

    /// Start an independent polling loop for `task_id` with the same callback
    /// shape as subscribe. Unlike the push transport, polling never gives up
    /// on its own.
    pub fn poll(
        &self,
        task_id: impl Into<String>,
        observer: Arc<dyn StatusObserver>,
    ) -> SubscriptionHandle {
        let task_id = task_id.into();
        let shared = Arc::new(Shared::new());
        let cancel = CancellationToken::new();

        tokio::spawn(poll_loop(
            self.fetcher.clone(),
            task_id,
            observer,
            shared.clone(),
            cancel.clone(),
            self.poll_policy,
        ));

        SubscriptionHandle { cancel, shared }
    }
}

async fn push_loop(
    transport: Arc<dyn ProgressTransport>,
    task_id: String,
    observer: Arc<dyn StatusObserver>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    policy: ReconnectPolicy,
) {
    loop {
        if cancel.is_cancelled() {
            shared.set_state(ConnectionState::Closed);
            return;
        }

        shared.set_state(ConnectionState::Connecting);

        let connected = tokio::select! {
            _ = cancel.cancelled() => {
                shared.set_state(ConnectionState::Closed);
                return;
            }
            result = transport.connect(&task_id) => result,
        };

        match connected {
            Ok(mut conn) => {
                {
                    let mut info = shared.info.write();
                    info.state = ConnectionState::Open;
                    info.attempts = 0;
                }

                loop {
                    let event = tokio::select! {
                        _ = cancel.cancelled() => {
                            conn.close().await;
                            shared.set_state(ConnectionState::Closed);
                            return;
                        }
                        event = conn.next_event() => event,
                    };

                    match event {
                        TransportEvent::Message(text) => {
                            let snapshot: TaskSnapshot = match serde_json::from_str(&text) {
                                Ok(s) => s,
                                Err(e) => {
                                    // Malformed frame: drop it, keep the channel
                                    log::warn!(
                                        "Dropping malformed progress frame for task {}: {}",
                                        task_id,
                                        e
                                    );
                                    continue;
                                }
                            };

                            if !shared.record_status(snapshot.status) {
                                log::debug!(
                                    "Ignoring snapshot for task {} after terminal status",
                                    task_id
                                );
                                continue;
                            }

                            observer.on_snapshot(&snapshot);

                            if snapshot.status.is_terminal() {
                                log::info!(
                                    "Task {} reached terminal status {}, closing channel",
                                    task_id,
                                    snapshot.status
                                );
                                conn.close().await;
                                shared.set_state(ConnectionState::Closed);
                                return;
                            }
                        }
                        TransportEvent::Error(e) => {
                            log::warn!("Progress channel error for task {}: {}", task_id, e);
                            observer.on_transport_error(&e);
                        }
                        TransportEvent::Closed => break,
                    }
                }
            }
            Err(e) => {
                log::warn!("Progress connect failed for task {}: {}", task_id, e);
                observer.on_transport_error(&e);
            }
        }

        // Channel ended without a terminal snapshot. Decide reconnection from
        // the side-channel cell, never from state captured at connect time.
        if shared.last_is_terminal() {
            shared.set_state(ConnectionState::Closed);
            return;
        }

        let delay = {
            let mut info = shared.info.write();
            info.state = ConnectionState::Closed;
            if info.attempts >= policy.max_attempts {
                // Exhaustion is silent; callers needing guaranteed delivery
                // fall back to polling.
                info.exhausted = true;
                log::info!(
                    "Reconnect attempts exhausted for task {} after {} attempts",
                    task_id,
                    info.attempts
                );
                return;
            }
            info.attempts += 1;
            policy.delay_for(info.attempts)
        };

        log::debug!(
            "Reconnecting progress channel for task {} in {:?}",
            task_id,
            delay
        );

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn poll_loop(
    fetcher: Arc<dyn StatusFetcher>,
    task_id: String,
    observer: Arc<dyn StatusObserver>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    policy: PollPolicy,
) {
    shared.set_state(ConnectionState::Open);

    loop {
        // Cancellation check gates every iteration; fetches are sequential,
        // so requests never overlap.
        if cancel.is_cancelled() {
            shared.set_state(ConnectionState::Closed);
            return;
        }

        let delay = match fetcher.fetch_status(&task_id).await {
            Ok(snapshot) => {
                if !shared.record_status(snapshot.status) {
                    shared.set_state(ConnectionState::Closed);
                    return;
                }

                observer.on_snapshot(&snapshot);

                if snapshot.status.is_terminal() {
                    log::info!(
                        "Task {} reached terminal status {}, stopping poll",
                        task_id,
                        snapshot.status
                    );
                    shared.set_state(ConnectionState::Closed);
                    return;
                }

                policy.interval
            }
            Err(e) => {
                log::warn!("Status poll failed for task {}: {}", task_id, e);
                observer.on_transport_error(&e);
                policy.error_interval
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                shared.set_state(ConnectionState::Closed);
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
