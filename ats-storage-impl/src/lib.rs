pub mod memory;
pub mod storage_traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use ats_core::config::StorageConfig;
use ats_core::error::StorageError;

// Re-export the main types for convenience
pub use memory::InMemoryLedgerStore;
pub use storage_traits::{LedgerSnapshot, LedgerStore, LedgerWrite, WriteBatch};

// Re-export the storage implementations
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedgerStore;

/// Open the ledger store described by the configuration
pub fn open_store(config: &StorageConfig) -> Result<Box<dyn LedgerStore>, StorageError> {
    match config {
        StorageConfig::Memory => Ok(Box::new(InMemoryLedgerStore::new())),
        #[cfg(feature = "sqlite")]
        StorageConfig::Sqlite { path } => Ok(Box::new(SqliteLedgerStore::new(path)?)),
        #[cfg(not(feature = "sqlite"))]
        StorageConfig::Sqlite { path } => Err(StorageError::Other(format!(
            "cannot open {}: built without the sqlite feature",
            path.display()
        ))),
    }
}
