//! The token contract: metadata, balances and the operator registry

use crate::context::CallEnvironment;
use ats_core::address::Address;
use ats_core::amount::Amount;
use ats_core::error::{StorageError, TokenError, TokenResult};
use ats_core::event::OperatorEvent;
use ats_core::metadata::{DeployParams, TokenMetadata};
use ats_storage_impl::{LedgerStore, WriteBatch};
use log::{debug, info, warn};
use std::collections::BTreeSet;

/// A deployed token bound to its ledger store.
///
/// Every holder is implicitly an operator for itself. That relation is derived
/// on read and never stored, so it cannot be revoked.
pub struct AtsToken<S: LedgerStore> {
    store: S,
    metadata: TokenMetadata,
    contract_address: Address,
}

impl<S: LedgerStore> AtsToken<S> {
    /// Initialize a fresh ledger: write the metadata and credit the whole
    /// supply to the deployer
    ///
    /// # Parameters
    /// * `store` - An empty ledger store
    /// * `deployer` - The account deploying the token
    /// * `params` - Decoded deployment arguments
    ///
    /// # Returns
    /// The token, or an error with the store left untouched
    pub fn deploy(store: S, deployer: Address, params: &DeployParams) -> TokenResult<Self> {
        let metadata = params.validate()?;
        if store.get_metadata()?.is_some() {
            return Err(TokenError::AlreadyInitialized);
        }

        let contract_address = Address::contract_address(&deployer, &metadata.symbol)?;

        let mut batch = WriteBatch::new();
        batch
            .put_metadata(metadata.clone())
            .put_balance(deployer, metadata.total_supply.clone());
        store.write_batch(&batch).map_err(|e| match e {
            StorageError::AlreadyInitialized => TokenError::AlreadyInitialized,
            other => TokenError::Storage(other),
        })?;

        info!(
            "Deployed token {} ({}) at {} with supply {} credited to {}",
            metadata.name, metadata.symbol, contract_address, metadata.total_supply, deployer
        );

        Ok(Self {
            store,
            metadata,
            contract_address,
        })
    }

    /// Attach to a ledger that was initialized earlier
    pub fn open(store: S, contract_address: Address) -> TokenResult<Self> {
        let metadata = store.get_metadata()?.ok_or(TokenError::NotInitialized)?;
        Ok(Self {
            store,
            metadata,
            contract_address,
        })
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn token_name(&self) -> &str {
        &self.metadata.name
    }

    pub fn token_symbol(&self) -> &str {
        &self.metadata.symbol
    }

    pub fn token_granularity(&self) -> u32 {
        self.metadata.granularity
    }

    pub fn token_total_supply(&self) -> &Amount {
        &self.metadata.total_supply
    }

    /// Balance of a holder; zero for addresses the ledger has never seen
    pub fn balance_of(&self, holder: &Address) -> TokenResult<Amount> {
        Ok(self.store.get_balance(holder)?.unwrap_or_default())
    }

    /// Whether `operator` may act for `token_holder`
    pub fn is_operator_for(&self, operator: &Address, token_holder: &Address) -> TokenResult<bool> {
        if operator == token_holder {
            return Ok(true);
        }
        Ok(self.store.is_operator(token_holder, operator)?)
    }

    /// Operators explicitly authorized by a holder, without the holder itself
    pub fn operators_of(&self, token_holder: &Address) -> TokenResult<BTreeSet<Address>> {
        Ok(self.store.operators_of(token_holder)?)
    }

    /// Authorize `operator` to act for the caller.
    ///
    /// Self-authorization is rejected. Authorizing an existing operator
    /// succeeds without changing anything. Otherwise the operator is stored,
    /// the caller gets a zero balance row if it had none, and one
    /// `AuthorizedOperator` log is emitted.
    ///
    /// # Returns
    /// `true` if the registry changed
    pub fn authorize_operator<E>(&self, env: &mut E, operator: Address) -> TokenResult<bool>
    where
        E: CallEnvironment + ?Sized,
    {
        let token_holder = env.caller();

        if operator == token_holder {
            warn!("Rejected self-authorization by {}", token_holder);
            return Err(TokenError::RejectedSelfAuthorization {
                holder: token_holder,
            });
        }

        if self.store.is_operator(&token_holder, &operator)? {
            debug!("{} is already an operator for {}", operator, token_holder);
            return Ok(false);
        }

        let mut batch = WriteBatch::new();
        batch
            .insert_operator(token_holder, operator)
            .touch_balance(token_holder);
        self.store.write_batch(&batch)?;

        env.emit(
            OperatorEvent::AuthorizedOperator {
                operator,
                token_holder,
            }
            .to_log(self.contract_address),
        );
        info!("{} authorized operator {}", token_holder, operator);

        Ok(true)
    }

    /// Revoke `operator` for the caller.
    ///
    /// Never fails on policy grounds: revoking something that is not stored
    /// (including the caller itself) succeeds without a log. Balances are not
    /// touched.
    ///
    /// # Returns
    /// `true` if the registry changed
    pub fn revoke_operator<E>(&self, env: &mut E, operator: Address) -> TokenResult<bool>
    where
        E: CallEnvironment + ?Sized,
    {
        let token_holder = env.caller();

        if !self.store.is_operator(&token_holder, &operator)? {
            debug!("{} is not an operator for {}", operator, token_holder);
            return Ok(false);
        }

        let mut batch = WriteBatch::new();
        batch.remove_operator(token_holder, operator);
        self.store.write_batch(&batch)?;

        env.emit(
            OperatorEvent::RevokedOperator {
                operator,
                token_holder,
            }
            .to_log(self.contract_address),
        );
        info!("{} revoked operator {}", token_holder, operator);

        Ok(true)
    }
}
