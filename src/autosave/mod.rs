pub mod manager;
pub mod store;

pub use manager::{AutoSaveManager, AutoSaveState};
pub use store::{BackupRecord, BackupStore, MemoryBackupStore, SqliteBackupStore};
