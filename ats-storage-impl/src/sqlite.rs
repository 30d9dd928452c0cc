#![cfg(feature = "sqlite")]

use crate::storage_traits::{LedgerSnapshot, LedgerStore, LedgerWrite, WriteBatch};
use ats_core::address::Address;
use ats_core::amount::Amount;
use ats_core::error::StorageError;
use ats_core::metadata::TokenMetadata;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row, Sqlite, Transaction,
};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tokio::runtime::Runtime;

/// The metadata table holds at most this one row
const METADATA_ROW_ID: i64 = 0;

fn db_error(err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::RowNotFound => StorageError::NotFound("Row not found".to_string()),
        _ => StorageError::Database(err.to_string()),
    }
}

fn decode_address(bytes: &[u8]) -> Result<Address, StorageError> {
    Address::try_from(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// A SQLite-based implementation of the LedgerStore interface using sqlx.
pub struct SqliteLedgerStore {
    pool: SqlitePool,
    rt: Arc<Runtime>,
    db_path: PathBuf,
}

impl SqliteLedgerStore {
    /// Opens (or creates) a ledger database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db_path = path.as_ref().to_path_buf();
        let db_url = format!("sqlite:{}", db_path.to_string_lossy());

        // sqlx is async; the ledger is not, so drive it from a private runtime
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map(Arc::new)
            .map_err(|e| StorageError::Other(format!("Failed to create runtime: {}", e)))?;

        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(|e| StorageError::Database(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true);

        let pool = rt
            .block_on(async {
                SqlitePoolOptions::new()
                    .max_connections(5)
                    .connect_with(options)
                    .await
            })
            .map_err(|e| StorageError::Database(format!("Failed to connect to database: {}", e)))?;

        rt.block_on(Self::initialize_schema(&pool))
            .map_err(|e| {
                StorageError::Database(format!("Failed to initialize database schema: {}", e))
            })?;

        log::info!("Opened SQLite ledger at {}", db_path.display());

        Ok(Self { pool, rt, db_path })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Creates the necessary tables in the database
    async fn initialize_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        // Single-row table for the token metadata
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metadata (
                id INTEGER PRIMARY KEY,
                data BLOB NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        // Balances, amount stored as unsigned big-endian bytes
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS balances (
                holder BLOB PRIMARY KEY,
                amount BLOB NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        // One row per (holder, operator) authorization
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS operators (
                holder BLOB NOT NULL,
                operator BLOB NOT NULL,
                PRIMARY KEY (holder, operator)
            )",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn apply_write(
        tx: &mut Transaction<'_, Sqlite>,
        write: &LedgerWrite,
    ) -> Result<(), StorageError> {
        match write {
            LedgerWrite::PutMetadata(metadata) => {
                let data = bincode::serialize(metadata)?;
                sqlx::query("INSERT INTO metadata (id, data) VALUES (?, ?)")
                    .bind(METADATA_ROW_ID)
                    .bind(data)
                    .execute(&mut **tx)
                    .await
                    .map_err(db_error)?;
            }
            LedgerWrite::PutBalance { holder, amount } => {
                sqlx::query("INSERT OR REPLACE INTO balances (holder, amount) VALUES (?, ?)")
                    .bind(holder.bytes().to_vec())
                    .bind(amount.to_bytes_be())
                    .execute(&mut **tx)
                    .await
                    .map_err(db_error)?;
            }
            LedgerWrite::TouchBalance(holder) => {
                sqlx::query("INSERT OR IGNORE INTO balances (holder, amount) VALUES (?, ?)")
                    .bind(holder.bytes().to_vec())
                    .bind(Amount::default().to_bytes_be())
                    .execute(&mut **tx)
                    .await
                    .map_err(db_error)?;
            }
            LedgerWrite::InsertOperator { holder, operator } => {
                sqlx::query("INSERT OR IGNORE INTO operators (holder, operator) VALUES (?, ?)")
                    .bind(holder.bytes().to_vec())
                    .bind(operator.bytes().to_vec())
                    .execute(&mut **tx)
                    .await
                    .map_err(db_error)?;
            }
            LedgerWrite::RemoveOperator { holder, operator } => {
                sqlx::query("DELETE FROM operators WHERE holder = ? AND operator = ?")
                    .bind(holder.bytes().to_vec())
                    .bind(operator.bytes().to_vec())
                    .execute(&mut **tx)
                    .await
                    .map_err(db_error)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SqliteLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLedgerStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn get_metadata(&self) -> Result<Option<TokenMetadata>, StorageError> {
        let row = self
            .rt
            .block_on(async {
                sqlx::query("SELECT data FROM metadata WHERE id = ?")
                    .bind(METADATA_ROW_ID)
                    .fetch_optional(&self.pool)
                    .await
            })
            .map_err(db_error)?;

        match row {
            Some(row) => {
                let data: Vec<u8> = row.try_get("data").map_err(db_error)?;
                Ok(Some(bincode::deserialize(&data)?))
            }
            None => Ok(None),
        }
    }

    fn get_balance(&self, holder: &Address) -> Result<Option<Amount>, StorageError> {
        let row = self
            .rt
            .block_on(async {
                sqlx::query("SELECT amount FROM balances WHERE holder = ?")
                    .bind(holder.bytes().to_vec())
                    .fetch_optional(&self.pool)
                    .await
            })
            .map_err(db_error)?;

        match row {
            Some(row) => {
                let amount: Vec<u8> = row.try_get("amount").map_err(db_error)?;
                Ok(Some(Amount::from_bytes_be(&amount)))
            }
            None => Ok(None),
        }
    }

    fn is_operator(&self, holder: &Address, operator: &Address) -> Result<bool, StorageError> {
        let row = self
            .rt
            .block_on(async {
                sqlx::query("SELECT 1 FROM operators WHERE holder = ? AND operator = ?")
                    .bind(holder.bytes().to_vec())
                    .bind(operator.bytes().to_vec())
                    .fetch_optional(&self.pool)
                    .await
            })
            .map_err(db_error)?;

        Ok(row.is_some())
    }

    fn operators_of(&self, holder: &Address) -> Result<BTreeSet<Address>, StorageError> {
        let rows = self
            .rt
            .block_on(async {
                sqlx::query("SELECT operator FROM operators WHERE holder = ?")
                    .bind(holder.bytes().to_vec())
                    .fetch_all(&self.pool)
                    .await
            })
            .map_err(db_error)?;

        rows.iter()
            .map(|row| {
                let bytes: Vec<u8> = row.try_get("operator").map_err(db_error)?;
                decode_address(&bytes)
            })
            .collect()
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }

        self.rt.block_on(async {
            let mut tx = self.pool.begin().await.map_err(db_error)?;

            if batch.writes_metadata() {
                let existing = sqlx::query("SELECT COUNT(*) AS count FROM metadata")
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_error)?;
                let count: i64 = existing.try_get("count").map_err(db_error)?;
                // Dropping `tx` rolls the transaction back
                batch.check(count > 0)?;
            }

            for write in batch.writes() {
                Self::apply_write(&mut tx, write).await?;
            }

            tx.commit().await.map_err(db_error)?;
            log::debug!("Committed {} ledger writes to SQLite", batch.len());
            Ok(())
        })
    }

    fn snapshot(&self) -> Result<LedgerSnapshot, StorageError> {
        let mut snapshot = LedgerSnapshot {
            metadata: self.get_metadata()?,
            ..LedgerSnapshot::default()
        };

        let (balance_rows, operator_rows) = self
            .rt
            .block_on(async {
                let balances = sqlx::query("SELECT holder, amount FROM balances")
                    .fetch_all(&self.pool)
                    .await?;
                let operators = sqlx::query("SELECT holder, operator FROM operators")
                    .fetch_all(&self.pool)
                    .await?;
                Ok::<_, sqlx::Error>((balances, operators))
            })
            .map_err(db_error)?;

        for row in balance_rows {
            let holder: Vec<u8> = row.try_get("holder").map_err(db_error)?;
            let amount: Vec<u8> = row.try_get("amount").map_err(db_error)?;
            snapshot
                .balances
                .insert(decode_address(&holder)?, Amount::from_bytes_be(&amount));
        }

        for row in operator_rows {
            let holder: Vec<u8> = row.try_get("holder").map_err(db_error)?;
            let operator: Vec<u8> = row.try_get("operator").map_err(db_error)?;
            snapshot
                .operators
                .entry(decode_address(&holder)?)
                .or_default()
                .insert(decode_address(&operator)?);
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedgerStore;
    use num_bigint::BigUint;
    use tempfile::tempdir;

    fn metadata() -> TokenMetadata {
        TokenMetadata {
            name: "JENNIJUJU".to_string(),
            symbol: "J3N".to_string(),
            granularity: 1,
            total_supply: BigUint::from(333u32),
        }
    }

    #[test]
    fn test_basic_storage_operations() {
        let dir = tempdir().unwrap();
        let store = SqliteLedgerStore::new(dir.path().join("ledger.db")).unwrap();

        let deployer = Address::unique_for_tests();
        let holder = Address::unique_for_tests();
        let operator = Address::unique_for_tests();

        assert!(store.get_metadata().unwrap().is_none());
        assert!(store.get_balance(&holder).unwrap().is_none());

        let mut batch = WriteBatch::new();
        batch
            .put_metadata(metadata())
            .put_balance(deployer, BigUint::from(333u32))
            .insert_operator(holder, operator)
            .touch_balance(holder);
        store.write_batch(&batch).unwrap();

        assert_eq!(store.get_metadata().unwrap(), Some(metadata()));
        assert_eq!(store.get_balance(&deployer).unwrap(), Some(BigUint::from(333u32)));
        assert_eq!(store.get_balance(&holder).unwrap(), Some(BigUint::from(0u32)));
        assert!(store.is_operator(&holder, &operator).unwrap());
        assert_eq!(
            store.operators_of(&holder).unwrap(),
            BTreeSet::from([operator])
        );

        let mut batch = WriteBatch::new();
        batch.remove_operator(holder, operator);
        store.write_batch(&batch).unwrap();
        assert!(!store.is_operator(&holder, &operator).unwrap());
    }

    #[test]
    fn test_metadata_written_once() {
        let dir = tempdir().unwrap();
        let store = SqliteLedgerStore::new(dir.path().join("ledger.db")).unwrap();

        let mut init = WriteBatch::new();
        init.put_metadata(metadata());
        store.write_batch(&init).unwrap();
        let before = store.state_digest().unwrap();

        let holder = Address::unique_for_tests();
        let mut batch = WriteBatch::new();
        batch
            .put_balance(holder, BigUint::from(5u32))
            .put_metadata(metadata());

        assert!(matches!(
            store.write_batch(&batch),
            Err(StorageError::AlreadyInitialized)
        ));
        assert!(store.get_balance(&holder).unwrap().is_none());
        assert_eq!(store.state_digest().unwrap(), before);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let holder = Address::unique_for_tests();
        let operator = Address::unique_for_tests();

        {
            let store = SqliteLedgerStore::new(&path).unwrap();
            let mut batch = WriteBatch::new();
            batch
                .put_metadata(metadata())
                .insert_operator(holder, operator)
                .touch_balance(holder);
            store.write_batch(&batch).unwrap();
        }

        let store = SqliteLedgerStore::new(&path).unwrap();
        assert_eq!(store.get_metadata().unwrap(), Some(metadata()));
        assert!(store.is_operator(&holder, &operator).unwrap());
        assert_eq!(store.get_balance(&holder).unwrap(), Some(BigUint::from(0u32)));
    }

    #[test]
    fn test_digest_matches_memory_store() {
        let dir = tempdir().unwrap();
        let sqlite = SqliteLedgerStore::new(dir.path().join("ledger.db")).unwrap();
        let memory = InMemoryLedgerStore::new();

        let holder = Address::unique_for_tests();
        let operators: Vec<_> = (0..3).map(|_| Address::unique_for_tests()).collect();

        let mut batch = WriteBatch::new();
        batch.put_metadata(metadata()).touch_balance(holder);
        for operator in &operators {
            batch.insert_operator(holder, *operator);
        }
        batch.remove_operator(holder, operators[1]);

        sqlite.write_batch(&batch).unwrap();
        memory.write_batch(&batch).unwrap();

        assert_eq!(sqlite.snapshot().unwrap(), memory.snapshot().unwrap());
        assert_eq!(sqlite.state_digest().unwrap(), memory.state_digest().unwrap());
    }
}
