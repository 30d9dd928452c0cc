use crate::storage_traits::{LedgerSnapshot, LedgerStore, LedgerWrite, WriteBatch};
use ats_core::address::Address;
use ats_core::amount::{self, Amount};
use ats_core::error::StorageError;
use ats_core::metadata::TokenMetadata;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct LedgerState {
    metadata: Option<TokenMetadata>,
    balances: HashMap<Address, Amount>,
    operators: HashMap<Address, HashSet<Address>>,
}

impl LedgerState {
    fn apply(&mut self, write: &LedgerWrite) {
        match write {
            LedgerWrite::PutMetadata(metadata) => {
                self.metadata = Some(metadata.clone());
            }
            LedgerWrite::PutBalance { holder, amount } => {
                self.balances.insert(*holder, amount.clone());
            }
            LedgerWrite::TouchBalance(holder) => {
                self.balances.entry(*holder).or_insert_with(amount::zero);
            }
            LedgerWrite::InsertOperator { holder, operator } => {
                self.operators.entry(*holder).or_default().insert(*operator);
            }
            LedgerWrite::RemoveOperator { holder, operator } => {
                if let Some(set) = self.operators.get_mut(holder) {
                    set.remove(operator);
                    // An empty operator set is the same as no row
                    if set.is_empty() {
                        self.operators.remove(holder);
                    }
                }
            }
        }
    }
}

/// Volatile ledger store kept entirely in process memory
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, LedgerState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Other(format!("Failed to acquire ledger lock: {}", e)))
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn get_metadata(&self) -> Result<Option<TokenMetadata>, StorageError> {
        Ok(self.state()?.metadata.clone())
    }

    fn get_balance(&self, holder: &Address) -> Result<Option<Amount>, StorageError> {
        Ok(self.state()?.balances.get(holder).cloned())
    }

    fn is_operator(&self, holder: &Address, operator: &Address) -> Result<bool, StorageError> {
        Ok(self
            .state()?
            .operators
            .get(holder)
            .map(|set| set.contains(operator))
            .unwrap_or(false))
    }

    fn operators_of(&self, holder: &Address) -> Result<BTreeSet<Address>, StorageError> {
        Ok(self
            .state()?
            .operators
            .get(holder)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StorageError> {
        let mut state = self.state()?;

        // Every failure condition is known before the first write, so checking
        // up front keeps the batch all-or-nothing
        batch.check(state.metadata.is_some())?;

        for write in batch.writes() {
            state.apply(write);
        }
        log::debug!("Applied {} ledger writes in memory", batch.len());

        Ok(())
    }

    fn snapshot(&self) -> Result<LedgerSnapshot, StorageError> {
        let state = self.state()?;

        Ok(LedgerSnapshot {
            metadata: state.metadata.clone(),
            balances: state
                .balances
                .iter()
                .map(|(holder, amount)| (*holder, amount.clone()))
                .collect(),
            operators: state
                .operators
                .iter()
                .filter(|(_, set)| !set.is_empty())
                .map(|(holder, set)| (*holder, set.iter().copied().collect()))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    fn metadata() -> TokenMetadata {
        TokenMetadata {
            name: "JENNIJUJU".to_string(),
            symbol: "J3N".to_string(),
            granularity: 1,
            total_supply: BigUint::from(500u32),
        }
    }

    #[test]
    fn test_reads_default_to_absent() {
        let store = InMemoryLedgerStore::new();
        let holder = Address::unique_for_tests();

        assert!(store.get_metadata().unwrap().is_none());
        assert!(store.get_balance(&holder).unwrap().is_none());
        assert!(!store.has_balance_entry(&holder).unwrap());
        assert!(!store.is_operator(&holder, &holder).unwrap());
        assert!(store.operators_of(&holder).unwrap().is_empty());
    }

    #[test]
    fn test_basic_batch_operations() {
        let store = InMemoryLedgerStore::new();
        let deployer = Address::unique_for_tests();
        let holder = Address::unique_for_tests();
        let operator = Address::unique_for_tests();

        let mut batch = WriteBatch::new();
        batch
            .put_metadata(metadata())
            .put_balance(deployer, BigUint::from(500u32))
            .insert_operator(holder, operator)
            .touch_balance(holder);
        store.write_batch(&batch).unwrap();

        assert_eq!(store.get_metadata().unwrap(), Some(metadata()));
        assert_eq!(store.get_balance(&deployer).unwrap(), Some(BigUint::from(500u32)));
        assert_eq!(store.get_balance(&holder).unwrap(), Some(BigUint::from(0u32)));
        assert!(store.is_operator(&holder, &operator).unwrap());
        assert!(!store.is_operator(&operator, &holder).unwrap());
    }

    #[test]
    fn test_touch_keeps_existing_balance() {
        let store = InMemoryLedgerStore::new();
        let holder = Address::unique_for_tests();

        let mut batch = WriteBatch::new();
        batch.put_balance(holder, BigUint::from(7u32)).touch_balance(holder);
        store.write_batch(&batch).unwrap();

        assert_eq!(store.get_balance(&holder).unwrap(), Some(BigUint::from(7u32)));
    }

    #[test]
    fn test_failed_batch_leaves_state_untouched() {
        let store = InMemoryLedgerStore::new();
        let mut init = WriteBatch::new();
        init.put_metadata(metadata());
        store.write_batch(&init).unwrap();

        let before = store.state_digest().unwrap();

        let holder = Address::unique_for_tests();
        let mut batch = WriteBatch::new();
        batch
            .put_balance(holder, BigUint::from(1u32))
            .put_metadata(metadata());

        assert!(matches!(
            store.write_batch(&batch),
            Err(StorageError::AlreadyInitialized)
        ));
        assert!(store.get_balance(&holder).unwrap().is_none());
        assert_eq!(store.state_digest().unwrap(), before);
    }

    #[test]
    fn test_removing_last_operator_drops_row() {
        let store = InMemoryLedgerStore::new();
        let holder = Address::unique_for_tests();
        let operator = Address::unique_for_tests();

        let mut batch = WriteBatch::new();
        batch.insert_operator(holder, operator);
        store.write_batch(&batch).unwrap();
        let with_operator = store.state_digest().unwrap();

        let mut batch = WriteBatch::new();
        batch.remove_operator(holder, operator);
        store.write_batch(&batch).unwrap();

        assert!(store.operators_of(&holder).unwrap().is_empty());
        assert!(store.snapshot().unwrap().operators.is_empty());
        assert_ne!(store.state_digest().unwrap(), with_operator);
        assert_eq!(
            store.state_digest().unwrap(),
            InMemoryLedgerStore::new().state_digest().unwrap()
        );
    }

    #[test]
    fn test_remove_operator_keeps_balance() {
        let store = InMemoryLedgerStore::new();
        let holder = Address::unique_for_tests();
        let operator = Address::unique_for_tests();

        let mut batch = WriteBatch::new();
        batch
            .put_balance(holder, BigUint::from(42u32))
            .insert_operator(holder, operator);
        store.write_batch(&batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.remove_operator(holder, operator);
        store.write_batch(&batch).unwrap();

        assert!(!store.is_operator(&holder, &operator).unwrap());
        assert_eq!(store.get_balance(&holder).unwrap(), Some(BigUint::from(42u32)));
    }

    #[test]
    fn test_remove_keeps_other_operators() {
        let holder = Address::unique_for_tests();
        let operators: Vec<_> = (0..4).map(|_| Address::unique_for_tests()).collect();

        let mut batch = WriteBatch::new();
        for operator in &operators {
            batch.insert_operator(holder, *operator);
        }

        // Head, middle and tail positions
        for removed in 0..operators.len() {
            let store_copy = InMemoryLedgerStore::new();
            store_copy.write_batch(&batch).unwrap();

            let mut removal = WriteBatch::new();
            removal.remove_operator(holder, operators[removed]);
            store_copy.write_batch(&removal).unwrap();

            for (i, operator) in operators.iter().enumerate() {
                assert_eq!(store_copy.is_operator(&holder, operator).unwrap(), i != removed);
            }
            assert_eq!(store_copy.operators_of(&holder).unwrap().len(), operators.len() - 1);
        }
    }
}
