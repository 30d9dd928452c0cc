use crate::context::CallContext;
use crate::contract::AtsToken;
use anyhow::Context;
use ats_core::address::Address;
use ats_core::amount;
use ats_core::config::{DeploymentConfig, TokenConfig};
use ats_core::error::{StorageError, TokenError, TokenResult};
use ats_core::event::{Log, OperatorEvent};
use ats_core::metadata::{DeployParams, TokenMetadata};
use ats_storage_impl::{open_store, LedgerStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Hash identifying a call and its receipt
pub type CallHash = [u8; 32];

/// A token operation with its arguments already decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    GetTokenName,
    GetTokenSymbol,
    GetTokenGranularity,
    GetTokenTotalSupply,
    GetBalanceOf(Address),
    IsOperatorFor {
        operator: Address,
        token_holder: Address,
    },
    AuthorizeOperator(Address),
    RevokeOperator(Address),
}

impl Method {
    /// The external method name
    pub fn name(&self) -> &'static str {
        match self {
            Method::GetTokenName => "getTokenName",
            Method::GetTokenSymbol => "getTokenSymbol",
            Method::GetTokenGranularity => "getTokenGranularity",
            Method::GetTokenTotalSupply => "getTokenTotalSupply",
            Method::GetBalanceOf(_) => "getBalanceOf",
            Method::IsOperatorFor { .. } => "isOperatorFor",
            Method::AuthorizeOperator(_) => "authorizeOperator",
            Method::RevokeOperator(_) => "revokeOperator",
        }
    }

    /// Address arguments in declaration order
    pub fn arguments(&self) -> Vec<&Address> {
        match self {
            Method::GetTokenName
            | Method::GetTokenSymbol
            | Method::GetTokenGranularity
            | Method::GetTokenTotalSupply => Vec::new(),
            Method::GetBalanceOf(holder) => vec![holder],
            Method::IsOperatorFor {
                operator,
                token_holder,
            } => vec![operator, token_holder],
            Method::AuthorizeOperator(operator) | Method::RevokeOperator(operator) => {
                vec![operator]
            }
        }
    }

    pub fn is_read_only(&self) -> bool {
        !matches!(
            self,
            Method::AuthorizeOperator(_) | Method::RevokeOperator(_)
        )
    }
}

/// A call made by `caller` into the token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub caller: Address,
    pub method: Method,
}

impl Call {
    pub fn new(caller: Address, method: Method) -> Self {
        Self { caller, method }
    }

    /// SHA-256 over the caller, the length-prefixed method name, the
    /// address arguments in order and the sequence number
    pub fn hash(&self, sequence: u64) -> CallHash {
        let name = self.method.name();

        let mut hasher = Sha256::new();
        hasher.update(self.caller.bytes());
        hasher.update([name.len() as u8]);
        hasher.update(name.as_bytes());
        for argument in self.method.arguments() {
            hasher.update(argument.bytes());
        }
        hasher.update(sequence.to_le_bytes());
        hasher.finalize().into()
    }
}

/// Value returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnValue {
    /// Text, including decimal renderings of amounts
    String(String),
    Int(i32),
    Bool(bool),
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallStatus {
    Success,
    Failed,
}

/// Outcome of a processed call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallReceipt {
    /// The hash of the call that was executed
    pub call_hash: CallHash,

    /// Position of the call in the runtime's call order
    pub sequence: u64,

    pub caller: Address,

    /// External name of the invoked method
    pub method: String,

    pub status: CallStatus,

    /// Present only for successful calls
    pub return_value: Option<ReturnValue>,

    /// Logs emitted by the call, empty for failed calls
    pub logs: Vec<Log>,

    /// Any error message from the execution (if not successful)
    pub error_message: Option<String>,

    /// When the call was processed
    pub timestamp: DateTime<Utc>,
}

impl CallReceipt {
    fn success(call: &Call, call_hash: CallHash, sequence: u64, value: ReturnValue, logs: Vec<Log>) -> Self {
        Self {
            call_hash,
            sequence,
            caller: call.caller,
            method: call.method.name().to_string(),
            status: CallStatus::Success,
            return_value: Some(value),
            logs,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    fn failure(call: &Call, call_hash: CallHash, sequence: u64, error: &TokenError) -> Self {
        Self {
            call_hash,
            sequence,
            caller: call.caller,
            method: call.method.name().to_string(),
            status: CallStatus::Failed,
            return_value: None,
            logs: Vec::new(),
            error_message: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CallStatus::Success
    }

    /// Operator events decoded from the receipt's logs
    pub fn operator_events(&self) -> Vec<OperatorEvent> {
        self.logs.iter().filter_map(OperatorEvent::from_log).collect()
    }
}

/// Iterator for traversing call receipts in storage
pub trait ReceiptIterator: Iterator<Item = Result<CallReceipt, StorageError>> {}

/// Storage interface for call receipts
pub trait ReceiptStorage {
    /// Store a call receipt
    ///
    /// # Parameters
    /// * `receipt` - The receipt to store
    ///
    /// # Returns
    /// Ok(()) if successful, Err otherwise
    fn store_receipt(&self, receipt: &CallReceipt) -> Result<(), StorageError>;

    /// Get a receipt by call hash
    fn get_receipt(&self, hash: &CallHash) -> Result<Option<CallReceipt>, StorageError>;

    /// Get all receipts for calls made by `caller`, oldest first
    fn get_receipts_for_caller(&self, caller: &Address) -> Box<dyn ReceiptIterator + '_>;
}

/// In-memory implementation of receipt storage
#[derive(Debug, Default)]
pub struct InMemoryReceiptStorage {
    // Mapping from call hash to receipt
    receipts_by_hash: Mutex<HashMap<CallHash, CallReceipt>>,

    // Call hashes per caller, in call order
    receipts_by_caller: Mutex<HashMap<Address, Vec<CallHash>>>,
}

impl InMemoryReceiptStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn receipts_for_caller(&self, caller: &Address) -> Result<Vec<CallReceipt>, StorageError> {
        let hashes = lock(&self.receipts_by_caller)?
            .get(caller)
            .cloned()
            .unwrap_or_default();
        let by_hash = lock(&self.receipts_by_hash)?;

        Ok(hashes
            .iter()
            .filter_map(|hash| by_hash.get(hash).cloned())
            .collect())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Other(format!("Failed to acquire receipt lock: {}", e)))
}

/// Iterator implementation for receipts
pub struct InMemoryReceiptIterator {
    receipts: std::vec::IntoIter<Result<CallReceipt, StorageError>>,
}

impl Iterator for InMemoryReceiptIterator {
    type Item = Result<CallReceipt, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receipts.next()
    }
}

impl ReceiptIterator for InMemoryReceiptIterator {}

impl ReceiptStorage for InMemoryReceiptStorage {
    fn store_receipt(&self, receipt: &CallReceipt) -> Result<(), StorageError> {
        lock(&self.receipts_by_hash)?.insert(receipt.call_hash, receipt.clone());
        lock(&self.receipts_by_caller)?
            .entry(receipt.caller)
            .or_default()
            .push(receipt.call_hash);
        Ok(())
    }

    fn get_receipt(&self, hash: &CallHash) -> Result<Option<CallReceipt>, StorageError> {
        Ok(lock(&self.receipts_by_hash)?.get(hash).cloned())
    }

    fn get_receipts_for_caller(&self, caller: &Address) -> Box<dyn ReceiptIterator + '_> {
        let receipts = match self.receipts_for_caller(caller) {
            Ok(receipts) => receipts.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };

        Box::new(InMemoryReceiptIterator {
            receipts: receipts.into_iter(),
        })
    }
}

/// Dispatches calls into a deployed token and records a receipt for each
pub struct TokenRuntime<S: LedgerStore, R: ReceiptStorage = InMemoryReceiptStorage> {
    token: AtsToken<S>,
    receipts: R,
    next_sequence: AtomicU64,
}

impl<S: LedgerStore> TokenRuntime<S> {
    /// Deploy a token into `store` with in-memory receipt storage
    pub fn deploy(store: S, deployer: Address, params: &DeployParams) -> TokenResult<Self> {
        Self::deploy_with_receipts(store, deployer, params, InMemoryReceiptStorage::new())
    }
}

impl TokenRuntime<Box<dyn LedgerStore>> {
    /// Open the configured store and deploy the configured token into it,
    /// or attach to the token already deployed there
    pub fn from_config(config: &DeploymentConfig, deployer: Address) -> anyhow::Result<Self> {
        let store = open_store(&config.storage).context("Failed to open ledger store")?;

        if let Some(metadata) = store.get_metadata()? {
            let mismatches = token_mismatches(&config.token, &metadata);
            if !mismatches.is_empty() {
                log::warn!(
                    "Configured token differs from the deployed {} in {}; using the deployed token",
                    metadata.symbol,
                    mismatches.join(", ")
                );
            }

            // The address only depends on the deployer and the stored symbol
            let contract_address = Address::contract_address(&deployer, &metadata.symbol)?;
            log::info!(
                "Attaching to existing token {} at {}",
                metadata.symbol,
                contract_address
            );
            let token = AtsToken::open(store, contract_address)?;
            return Ok(Self::with_token(token, InMemoryReceiptStorage::new()));
        }

        let params = config
            .token
            .to_deploy_params()
            .context("Invalid token configuration")?;
        Self::deploy(store, deployer, &params).context("Failed to deploy token")
    }
}

/// Fields in which the configured token differs from the deployed one
fn token_mismatches(config: &TokenConfig, deployed: &TokenMetadata) -> Vec<&'static str> {
    let configured = match config.to_deploy_params().and_then(|params| params.validate()) {
        Ok(configured) => configured,
        Err(_) => return vec!["validity"],
    };

    let mut fields = Vec::new();
    if configured.name != deployed.name {
        fields.push("name");
    }
    if configured.symbol != deployed.symbol {
        fields.push("symbol");
    }
    if configured.granularity != deployed.granularity {
        fields.push("granularity");
    }
    if configured.total_supply != deployed.total_supply {
        fields.push("total_supply");
    }
    fields
}

impl<S: LedgerStore, R: ReceiptStorage> TokenRuntime<S, R> {
    pub fn deploy_with_receipts(
        store: S,
        deployer: Address,
        params: &DeployParams,
        receipts: R,
    ) -> TokenResult<Self> {
        let token = AtsToken::deploy(store, deployer, params)?;
        Ok(Self::with_token(token, receipts))
    }

    pub fn with_token(token: AtsToken<S>, receipts: R) -> Self {
        Self {
            token,
            receipts,
            next_sequence: AtomicU64::new(0),
        }
    }

    pub fn token(&self) -> &AtsToken<S> {
        &self.token
    }

    pub fn receipts(&self) -> &R {
        &self.receipts
    }

    /// Execute a call and record its receipt.
    ///
    /// A failing call yields a `Failed` receipt without logs and leaves the
    /// ledger as it was.
    pub fn call(&self, call: Call) -> CallReceipt {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let call_hash = call.hash(sequence);

        let mut ctx = CallContext::new(call.caller);
        let receipt = match self.dispatch(&mut ctx, &call.method) {
            Ok(value) => {
                CallReceipt::success(&call, call_hash, sequence, value, ctx.into_logs())
            }
            Err(e) => {
                log::warn!("Call {} from {} failed: {}", call.method.name(), call.caller, e);
                CallReceipt::failure(&call, call_hash, sequence, &e)
            }
        };

        if let Err(e) = self.receipts.store_receipt(&receipt) {
            log::error!(
                "Failed to store receipt {}: {}",
                hex::encode(receipt.call_hash),
                e
            );
        }

        receipt
    }

    /// Convenience wrapper around `call`
    pub fn invoke(&self, caller: Address, method: Method) -> CallReceipt {
        self.call(Call::new(caller, method))
    }

    pub fn receipt(&self, hash: &CallHash) -> Result<Option<CallReceipt>, StorageError> {
        self.receipts.get_receipt(hash)
    }

    fn dispatch(&self, ctx: &mut CallContext, method: &Method) -> TokenResult<ReturnValue> {
        let token = &self.token;
        match method {
            Method::GetTokenName => Ok(ReturnValue::String(token.token_name().to_string())),
            Method::GetTokenSymbol => Ok(ReturnValue::String(token.token_symbol().to_string())),
            Method::GetTokenGranularity => Ok(ReturnValue::Int(
                i32::try_from(token.token_granularity()).unwrap_or(i32::MAX),
            )),
            Method::GetTokenTotalSupply => Ok(ReturnValue::String(amount::to_decimal_string(
                token.token_total_supply(),
            ))),
            Method::GetBalanceOf(holder) => Ok(ReturnValue::String(amount::to_decimal_string(
                &token.balance_of(holder)?,
            ))),
            Method::IsOperatorFor {
                operator,
                token_holder,
            } => Ok(ReturnValue::Bool(
                token.is_operator_for(operator, token_holder)?,
            )),
            Method::AuthorizeOperator(operator) => {
                token.authorize_operator(ctx, *operator)?;
                Ok(ReturnValue::Void)
            }
            Method::RevokeOperator(operator) => {
                token.revoke_operator(ctx, *operator)?;
                Ok(ReturnValue::Void)
            }
        }
    }
}
