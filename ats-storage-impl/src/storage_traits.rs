use ats_core::address::Address;
use ats_core::amount::Amount;
use ats_core::error::StorageError;
use ats_core::metadata::TokenMetadata;
use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A single mutation of the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerWrite {
    /// Write the token metadata; fails the batch if metadata already exists
    PutMetadata(TokenMetadata),

    /// Set a holder's balance, creating the row if needed
    PutBalance { holder: Address, amount: Amount },

    /// Create a zero balance row for a holder that has none
    TouchBalance(Address),

    /// Add an operator to a holder's operator set
    InsertOperator { holder: Address, operator: Address },

    /// Remove an operator from a holder's operator set
    RemoveOperator { holder: Address, operator: Address },
}

/// An ordered group of writes that is applied entirely or not at all
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    writes: Vec<LedgerWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_metadata(&mut self, metadata: TokenMetadata) -> &mut Self {
        self.writes.push(LedgerWrite::PutMetadata(metadata));
        self
    }

    pub fn put_balance(&mut self, holder: Address, amount: Amount) -> &mut Self {
        self.writes.push(LedgerWrite::PutBalance { holder, amount });
        self
    }

    pub fn touch_balance(&mut self, holder: Address) -> &mut Self {
        self.writes.push(LedgerWrite::TouchBalance(holder));
        self
    }

    pub fn insert_operator(&mut self, holder: Address, operator: Address) -> &mut Self {
        self.writes
            .push(LedgerWrite::InsertOperator { holder, operator });
        self
    }

    pub fn remove_operator(&mut self, holder: Address, operator: Address) -> &mut Self {
        self.writes
            .push(LedgerWrite::RemoveOperator { holder, operator });
        self
    }

    pub fn writes(&self) -> &[LedgerWrite] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Whether the batch writes token metadata
    pub fn writes_metadata(&self) -> bool {
        self.writes
            .iter()
            .any(|write| matches!(write, LedgerWrite::PutMetadata(_)))
    }

    /// Reject batches that cannot be applied to a ledger whose metadata
    /// presence is `has_metadata`
    pub fn check(&self, has_metadata: bool) -> Result<(), StorageError> {
        let metadata_writes = self
            .writes
            .iter()
            .filter(|write| matches!(write, LedgerWrite::PutMetadata(_)))
            .count();

        if metadata_writes > 1 || (metadata_writes == 1 && has_metadata) {
            return Err(StorageError::AlreadyInitialized);
        }
        Ok(())
    }
}

/// Canonical, order-independent view of everything a ledger holds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub metadata: Option<TokenMetadata>,
    pub balances: BTreeMap<Address, Amount>,

    /// Only holders with at least one operator appear here
    pub operators: BTreeMap<Address, BTreeSet<Address>>,
}

impl LedgerSnapshot {
    /// BLAKE3 digest of the bincode encoding of the snapshot
    pub fn digest(&self) -> Result<[u8; 32], StorageError> {
        let encoded = bincode::serialize(self)?;
        Ok(*blake3::hash(&encoded).as_bytes())
    }
}

/// Durable key-value state of the token: metadata, balances and operator sets.
///
/// Reads of absent rows return `None` or an empty set; the store attaches no
/// meaning to them. All mutation goes through [`LedgerStore::write_batch`].
pub trait LedgerStore {
    /// Get the token metadata, if the ledger has been initialized
    fn get_metadata(&self) -> Result<Option<TokenMetadata>, StorageError>;

    /// Get a holder's balance row
    ///
    /// # Returns
    /// Some(amount) if a row exists (possibly zero), None otherwise
    fn get_balance(&self, holder: &Address) -> Result<Option<Amount>, StorageError>;

    /// Check whether a holder has a balance row
    fn has_balance_entry(&self, holder: &Address) -> Result<bool, StorageError> {
        Ok(self.get_balance(holder)?.is_some())
    }

    /// Check whether `operator` is stored in `holder`'s operator set
    fn is_operator(&self, holder: &Address, operator: &Address) -> Result<bool, StorageError>;

    /// Get the stored operator set of a holder
    ///
    /// The iteration order carries no meaning.
    fn operators_of(&self, holder: &Address) -> Result<BTreeSet<Address>, StorageError>;

    /// Apply every write of the batch, or none of them
    ///
    /// # Parameters
    /// * `batch` - The writes to apply, in order
    ///
    /// # Returns
    /// Ok(()) if all writes were applied, Err otherwise with the ledger untouched
    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StorageError>;

    /// Capture the full ledger state
    fn snapshot(&self) -> Result<LedgerSnapshot, StorageError>;

    /// Digest of the full ledger state
    fn state_digest(&self) -> Result<[u8; 32], StorageError> {
        self.snapshot()?.digest()
    }
}

impl<T: LedgerStore + ?Sized> LedgerStore for Box<T> {
    fn get_metadata(&self) -> Result<Option<TokenMetadata>, StorageError> {
        (**self).get_metadata()
    }

    fn get_balance(&self, holder: &Address) -> Result<Option<Amount>, StorageError> {
        (**self).get_balance(holder)
    }

    fn has_balance_entry(&self, holder: &Address) -> Result<bool, StorageError> {
        (**self).has_balance_entry(holder)
    }

    fn is_operator(&self, holder: &Address, operator: &Address) -> Result<bool, StorageError> {
        (**self).is_operator(holder, operator)
    }

    fn operators_of(&self, holder: &Address) -> Result<BTreeSet<Address>, StorageError> {
        (**self).operators_of(holder)
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StorageError> {
        (**self).write_batch(batch)
    }

    fn snapshot(&self) -> Result<LedgerSnapshot, StorageError> {
        (**self).snapshot()
    }

    fn state_digest(&self) -> Result<[u8; 32], StorageError> {
        (**self).state_digest()
    }
}

impl<T: LedgerStore + ?Sized> LedgerStore for Arc<T> {
    fn get_metadata(&self) -> Result<Option<TokenMetadata>, StorageError> {
        (**self).get_metadata()
    }

    fn get_balance(&self, holder: &Address) -> Result<Option<Amount>, StorageError> {
        (**self).get_balance(holder)
    }

    fn has_balance_entry(&self, holder: &Address) -> Result<bool, StorageError> {
        (**self).has_balance_entry(holder)
    }

    fn is_operator(&self, holder: &Address, operator: &Address) -> Result<bool, StorageError> {
        (**self).is_operator(holder, operator)
    }

    fn operators_of(&self, holder: &Address) -> Result<BTreeSet<Address>, StorageError> {
        (**self).operators_of(holder)
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StorageError> {
        (**self).write_batch(batch)
    }

    fn snapshot(&self) -> Result<LedgerSnapshot, StorageError> {
        (**self).snapshot()
    }

    fn state_digest(&self) -> Result<[u8; 32], StorageError> {
        (**self).state_digest()
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
            total_supply: BigUint::from(10u32),
        }
    }

    #[test]
    fn test_batch_builder_keeps_order() {
        let holder = Address::new([1; 32]);
        let operator = Address::new([2; 32]);

        let mut batch = WriteBatch::new();
        batch
            .insert_operator(holder, operator)
            .touch_balance(holder)
            .remove_operator(holder, operator);

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.writes()[1], LedgerWrite::TouchBalance(holder));
        assert!(!batch.writes_metadata());
    }

    #[test]
    fn test_check_rejects_second_metadata_write() {
        let mut batch = WriteBatch::new();
        batch.put_metadata(metadata());

        assert!(batch.check(false).is_ok());
        assert!(matches!(
            batch.check(true),
            Err(StorageError::AlreadyInitialized)
        ));

        batch.put_metadata(metadata());
        assert!(matches!(
            batch.check(false),
            Err(StorageError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_snapshot_digest_tracks_content() {
        let empty = LedgerSnapshot::default();
        let mut with_balance = LedgerSnapshot::default();
        with_balance
            .balances
            .insert(Address::new([1; 32]), BigUint::from(0u32));

        assert_eq!(empty.digest().unwrap(), LedgerSnapshot::default().digest().unwrap());
        assert_ne!(empty.digest().unwrap(), with_balance.digest().unwrap());
    }
}
