// folio-sync - client-side state synchronization for the Folio transcription editor
//
// Three loosely coupled controllers, composed only by the host application:
// - tasks::TaskStatusSynchronizer tracks a background job over a push transport
//   with reconnect/backoff, or a polling loop as a caller-selected alternative
// - autosave::AutoSaveManager turns in-memory edits into immediate local backups
//   plus debounced, coalesced remote writes
// - selection::RangeSelectionController is a pure multi-select state machine
//   over a caller-supplied ordered id sequence

pub mod api;
pub mod autosave;
pub mod config;
pub mod error;
pub mod selection;
pub mod tasks;

pub use api::client::ApiClient;
pub use api::types::{LineEdit, TaskProgress, TaskSnapshot, TaskStatus};
pub use autosave::manager::{AutoSaveManager, AutoSaveState};
pub use autosave::store::{BackupRecord, BackupStore, MemoryBackupStore, SqliteBackupStore};
pub use config::SyncConfig;
pub use error::{SaveError, StoreError, TransportError};
pub use selection::{LineId, Modifiers, RangeSelectionController};
pub use tasks::synchronizer::{
    ConnectionInfo, ConnectionState, PollPolicy, ReconnectPolicy, StatusObserver,
    SubscriptionHandle, TaskStatusSynchronizer,
};
pub use tasks::transport::{ProgressConnection, ProgressTransport, WebSocketTransport};
