// Auto-save manager
//
// Turns a stream of in-memory edits into (1) an immediate local backup on
// every call and (2) one coalesced remote write per debounce window. The
// local write always completes before the remote write is scheduled, so no
// edit is ever lost even though not every edit reaches the server.
//
// When the debounce fires it transmits the payload sitting in the pending
// cell at that moment, not the payload present when the timer was armed.
// There is no automatic retry after a failed remote write; the next edit's
// debounce is the retry mechanism.

use super::store::{BackupRecord, BackupStore};
use crate::api::client::TranscriptionWriter;
use crate::api::types::{LineEdit, TranscriptionRecord};
use crate::error::{SaveError, StoreError};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_DEBOUNCE_MS: u64 = 1500;

/// Observable auto-save state, mutated only by the manager.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSaveState {
    pub last_saved_at: Option<DateTime<Utc>>,
    pub is_saving: bool,
    pub has_unsaved_changes: bool,
    pub last_error: Option<String>,
}

pub struct AutoSaveManager {
    page_id: i64,
    owner_key: String,
    store: Arc<dyn BackupStore>,
    writer: Arc<dyn TranscriptionWriter>,
    debounce: Duration,
    state: Arc<RwLock<AutoSaveState>>,
    /// Latest unsent payload; the debounce task takes it at fire time.
    pending: Arc<Mutex<Option<Vec<LineEdit>>>>,
    /// Serializes remote writes: at most one in flight per owner key.
    write_lock: Arc<tokio::sync::Mutex<()>>,
    debounce_token: Mutex<Option<CancellationToken>>,
}

impl AutoSaveManager {
    pub fn new(
        page_id: i64,
        store: Arc<dyn BackupStore>,
        writer: Arc<dyn TranscriptionWriter>,
    ) -> Self {
        Self {
            page_id,
            owner_key: format!("page:{}", page_id),
            store,
            writer,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            state: Arc::new(RwLock::new(AutoSaveState::default())),
            pending: Arc::new(Mutex::new(None)),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
            debounce_token: Mutex::new(None),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn owner_key(&self) -> &str {
        &self.owner_key
    }

    /// Persist `lines` to the durable backup store (completed before this
    /// call returns), then (re)arm the debounced remote write. Calls within
    /// one debounce window collapse to a single request carrying the
    /// last-seen payload.
    pub fn save(&self, lines: Vec<LineEdit>) -> Result<(), StoreError> {
        let record = BackupRecord::new(&self.owner_key, lines.clone());
        self.store.put(&self.owner_key, &record)?;

        *self.pending.lock() = Some(lines);
        self.state.write().has_unsaved_changes = true;

        self.arm_debounce();
        Ok(())
    }

    /// Cancel any armed debounce and perform the remote write now,
    /// propagating the result to the caller.
    pub async fn force_save(
        &self,
        lines: Vec<LineEdit>,
    ) -> Result<TranscriptionRecord, SaveError> {
        let record = BackupRecord::new(&self.owner_key, lines.clone());
        self.store.put(&self.owner_key, &record)?;

        self.cancel_debounce();
        *self.pending.lock() = None;
        self.state.write().has_unsaved_changes = true;

        let _guard = self.write_lock.lock().await;
        write_remote(
            self.writer.clone(),
            self.store.clone(),
            self.state.clone(),
            self.pending.clone(),
            self.owner_key.clone(),
            self.page_id,
            lines,
        )
        .await
    }

    pub fn get_backup(&self) -> Result<Option<BackupRecord>, StoreError> {
        self.store.get(&self.owner_key)
    }

    /// Delete the backup, e.g. after the user declines a recovery prompt.
    pub fn clear_backup(&self) -> Result<(), StoreError> {
        self.store.delete(&self.owner_key)
    }

    pub fn state(&self) -> AutoSaveState {
        self.state.read().clone()
    }

    /// Navigation-guard signal: while true, the host should veto page
    /// teardown or prompt the user.
    pub fn has_unsaved_changes(&self) -> bool {
        self.state.read().has_unsaved_changes
    }

    /// Cancel the armed debounce without touching the backup. The backup for
    /// any unsent payload stays in the store for recovery.
    pub fn shutdown(&self) {
        self.cancel_debounce();
        *self.pending.lock() = None;
    }

    fn cancel_debounce(&self) {
        if let Some(token) = self.debounce_token.lock().take() {
            token.cancel();
        }
    }

    fn arm_debounce(&self) {
        let token = CancellationToken::new();
        if let Some(previous) = self.debounce_token.lock().replace(token.clone()) {
            previous.cancel();
        }

        let debounce = self.debounce;
        let writer = self.writer.clone();
        let store = self.store.clone();
        let state = self.state.clone();
        let pending = self.pending.clone();
        let write_lock = self.write_lock.clone();
        let owner_key = self.owner_key.clone();
        let page_id = self.page_id;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(debounce) => {}
            }

            // Take whatever is pending *now*; earlier payloads within the
            // window were superseded (each still has its local backup moment)
            let lines = match pending.lock().take() {
                Some(lines) => lines,
                None => return,
            };

            let _guard = write_lock.lock().await;
            let _ = write_remote(writer, store, state, pending, owner_key, page_id, lines).await;
        });
    }
}

async fn write_remote(
    writer: Arc<dyn TranscriptionWriter>,
    store: Arc<dyn BackupStore>,
    state: Arc<RwLock<AutoSaveState>>,
    pending: Arc<Mutex<Option<Vec<LineEdit>>>>,
    owner_key: String,
    page_id: i64,
    lines: Vec<LineEdit>,
) -> Result<TranscriptionRecord, SaveError> {
    state.write().is_saving = true;

    let result = writer.write_lines(page_id, &lines).await;

    match &result {
        Ok(record) => {
            // Edits that arrived while this write was in flight keep their
            // backup and unsaved flag; only a fully caught-up write clears.
            // The pending lock is held across the check, the backup delete,
            // and the state update so a save() landing mid-write cannot have
            // its just-written backup deleted out from under it.
            let pending_guard = pending.lock();
            let caught_up = pending_guard.is_none();
            if caught_up {
                if let Err(e) = store.delete(&owner_key) {
                    log::warn!("Saved remotely but failed to clear backup {}: {}", owner_key, e);
                }
            }

            {
                let mut st = state.write();
                st.is_saving = false;
                st.last_saved_at = Some(Utc::now());
                st.last_error = None;
                if caught_up {
                    st.has_unsaved_changes = false;
                }
            }
            drop(pending_guard);

            log::debug!(
                "Auto-save wrote {} lines for {} (transcription {})",
                lines.len(),
                owner_key,
                record.id
            );
        }
        Err(e) => {
            // Backup stays intact; the next edit's debounce is the retry
            log::warn!("Remote save failed for {}: {}", owner_key, e);
            let mut st = state.write();
            st.is_saving = false;
            st.last_error = Some(e.to_string());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autosave::store::MemoryBackupStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Records every remote write; failure is switchable per test.
    #[derive(Default)]
    struct RecordingWriter {
        payloads: Mutex<Vec<Vec<LineEdit>>>,
        fail: AtomicBool,
    }

    impl RecordingWriter {
        fn write_count(&self) -> usize {
            self.payloads.lock().len()
        }

        fn last_payload(&self) -> Option<Vec<LineEdit>> {
            self.payloads.lock().last().cloned()
        }
    }

    #[async_trait]
    impl TranscriptionWriter for RecordingWriter {
        async fn write_lines(
            &self,
            page_id: i64,
            lines: &[LineEdit],
        ) -> Result<TranscriptionRecord, SaveError> {
            self.payloads.lock().push(lines.to_vec());
            if self.fail.load(Ordering::SeqCst) {
                return Err(SaveError::Rejected { code: 500 });
            }
            Ok(TranscriptionRecord {
                id: 1,
                page_id,
                transcription_type: "manual".to_string(),
                source: Some("manual".to_string()),
                updated_at: Utc::now(),
                lines: Vec::new(),
            })
        }
    }

    /// Writer that records payloads but holds each write open until the test
    /// releases a permit, so edits can land while a write is in flight.
    struct GatedWriter {
        payloads: Mutex<Vec<Vec<LineEdit>>>,
        gate: tokio::sync::Semaphore,
    }

    impl GatedWriter {
        fn new() -> Self {
            Self {
                payloads: Mutex::new(Vec::new()),
                gate: tokio::sync::Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl TranscriptionWriter for GatedWriter {
        async fn write_lines(
            &self,
            page_id: i64,
            lines: &[LineEdit],
        ) -> Result<TranscriptionRecord, SaveError> {
            self.payloads.lock().push(lines.to_vec());
            let permit = self.gate.acquire().await.unwrap();
            permit.forget();
            Ok(TranscriptionRecord {
                id: 1,
                page_id,
                transcription_type: "manual".to_string(),
                source: Some("manual".to_string()),
                updated_at: Utc::now(),
                lines: Vec::new(),
            })
        }
    }

    /// Counts local backup writes on top of the in-memory store.
    struct CountingStore {
        inner: MemoryBackupStore,
        puts: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: MemoryBackupStore::new(),
                puts: AtomicUsize::new(0),
            }
        }
    }

    impl BackupStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<BackupRecord>, StoreError> {
            self.inner.get(key)
        }

        fn put(&self, key: &str, record: &BackupRecord) -> Result<(), StoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(key, record)
        }

        fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key)
        }
    }

    fn lines(texts: &[&str]) -> Vec<LineEdit> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| LineEdit::new(i as i64 + 1, *t))
            .collect()
    }

    fn manager(
        store: Arc<CountingStore>,
        writer: Arc<RecordingWriter>,
    ) -> AutoSaveManager {
        AutoSaveManager::new(7, store, writer).with_debounce(Duration::from_millis(500))
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_round_trip() {
        let store = Arc::new(CountingStore::new());
        let writer = Arc::new(RecordingWriter::default());
        let manager = manager(store, writer);

        let payload = lines(&["alpha", "beta"]);
        manager.save(payload.clone()).unwrap();

        // Backup is readable immediately, before any debounce fires
        let backup = manager.get_backup().unwrap().unwrap();
        assert_eq!(backup.lines, payload);
        assert!(manager.has_unsaved_changes());

        // After the confirmed remote write the backup is gone
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(manager.get_backup().unwrap().is_none());

        let state = manager.state();
        assert!(!state.has_unsaved_changes);
        assert!(state.last_saved_at.is_some());
        assert!(state.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalescing() {
        let store = Arc::new(CountingStore::new());
        let writer = Arc::new(RecordingWriter::default());
        let manager = manager(store.clone(), writer.clone());

        manager.save(lines(&["v1"])).unwrap();
        manager.save(lines(&["v1", "v2"])).unwrap();
        manager.save(lines(&["v1", "v2", "v3"])).unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;

        // One remote write carrying the last payload; one local backup per call
        assert_eq!(writer.write_count(), 1);
        assert_eq!(writer.last_payload().unwrap(), lines(&["v1", "v2", "v3"]));
        assert_eq!(store.puts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_rearms_across_windows() {
        let store = Arc::new(CountingStore::new());
        let writer = Arc::new(RecordingWriter::default());
        let manager = manager(store, writer.clone());

        manager.save(lines(&["first"])).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        manager.save(lines(&["second"])).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(writer.write_count(), 2);
        assert_eq!(writer.last_payload().unwrap(), lines(&["second"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_backup_and_surfaces_error() {
        let store = Arc::new(CountingStore::new());
        let writer = Arc::new(RecordingWriter::default());
        writer.fail.store(true, Ordering::SeqCst);
        let manager = manager(store, writer.clone());

        let payload = lines(&["precious"]);
        manager.save(payload.clone()).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let state = manager.state();
        assert!(state.last_error.is_some());
        assert!(state.has_unsaved_changes);
        assert!(!state.is_saving);
        assert_eq!(manager.get_backup().unwrap().unwrap().lines, payload);

        // No automatic retry loop: nothing further happens on its own
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(writer.write_count(), 1);

        // The next edit is the retry
        writer.fail.store(false, Ordering::SeqCst);
        manager.save(payload.clone()).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(writer.write_count(), 2);
        assert!(manager.state().last_error.is_none());
        assert!(!manager.has_unsaved_changes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_inflight_write_keeps_backup() {
        // An edit that lands while a remote write is in flight must keep its
        // backup and the unsaved flag when that older write completes.
        let store = Arc::new(CountingStore::new());
        let writer = Arc::new(GatedWriter::new());
        let manager = AutoSaveManager::new(7, store, writer.clone())
            .with_debounce(Duration::from_millis(500));

        manager.save(lines(&["v1"])).unwrap();
        // Let the debounce fire; the write blocks inside the writer
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(writer.payloads.lock().len(), 1);

        // A newer edit arrives mid-flight
        manager.save(lines(&["v1", "v2"])).unwrap();

        // Release the first write and let it complete
        writer.gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(1)).await;

        // The newer edit's backup and unsaved flag survived the completion
        let backup = manager.get_backup().unwrap().unwrap();
        assert_eq!(backup.lines, lines(&["v1", "v2"]));
        assert!(manager.has_unsaved_changes());

        // The rearmed debounce then flushes the newer payload and clears
        writer.gate.add_permits(1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(writer.payloads.lock().len(), 2);
        assert_eq!(
            writer.payloads.lock().last().cloned().unwrap(),
            lines(&["v1", "v2"])
        );
        assert!(manager.get_backup().unwrap().is_none());
        assert!(!manager.has_unsaved_changes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_save_cancels_pending_debounce() {
        let store = Arc::new(CountingStore::new());
        let writer = Arc::new(RecordingWriter::default());
        let manager = manager(store, writer.clone());

        manager.save(lines(&["draft"])).unwrap();
        let record = manager.force_save(lines(&["final"])).await.unwrap();
        assert_eq!(record.page_id, 7);

        // The debounced write was cancelled: only the forced write happened
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(writer.write_count(), 1);
        assert_eq!(writer.last_payload().unwrap(), lines(&["final"]));
        assert!(!manager.has_unsaved_changes());
        assert!(manager.get_backup().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_save_propagates_failure() {
        let store = Arc::new(CountingStore::new());
        let writer = Arc::new(RecordingWriter::default());
        writer.fail.store(true, Ordering::SeqCst);
        let manager = manager(store, writer.clone());

        let payload = lines(&["keep me"]);
        let result = manager.force_save(payload.clone()).await;
        assert!(matches!(result, Err(SaveError::Rejected { code: 500 })));

        // Failure leaves the backup intact and the error observable
        assert_eq!(manager.get_backup().unwrap().unwrap().lines, payload);
        assert!(manager.state().last_error.is_some());
        assert!(manager.has_unsaved_changes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_timer_keeps_backup() {
        let store = Arc::new(CountingStore::new());
        let writer = Arc::new(RecordingWriter::default());
        let manager = manager(store, writer.clone());

        let payload = lines(&["unsent"]);
        manager.save(payload.clone()).unwrap();
        manager.shutdown();

        tokio::time::sleep(Duration::from_secs(10)).await;

        // No remote write fired, but the backup survived for recovery
        assert_eq!(writer.write_count(), 0);
        assert_eq!(manager.get_backup().unwrap().unwrap().lines, payload);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_backup_on_declined_recovery() {
        let store = Arc::new(CountingStore::new());
        let writer = Arc::new(RecordingWriter::default());
        let manager = manager(store, writer);

        manager.save(lines(&["leftover"])).unwrap();
        manager.shutdown();

        assert!(manager.get_backup().unwrap().is_some());
        manager.clear_backup().unwrap();
        assert!(manager.get_backup().unwrap().is_none());
    }
}
