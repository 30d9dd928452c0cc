use crate::amount::{self, Amount};
use crate::error::TokenError;
use serde::{Deserialize, Serialize};

/// Immutable token description, written once at deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Display name of the token
    pub name: String,

    /// Ticker symbol
    pub symbol: String,

    /// Smallest indivisible unit
    pub granularity: u32,

    /// Supply credited to the deployer at initialization
    pub total_supply: Amount,
}

/// Arguments of the deployment entry point, as handed over by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployParams {
    pub name: String,
    pub symbol: String,
    pub granularity: i32,

    /// Big-endian two's-complement encoding of the total supply
    pub total_supply: Vec<u8>,
}

impl DeployParams {
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        granularity: i32,
        total_supply: &Amount,
    ) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            granularity,
            total_supply: amount::to_signed_be_bytes(total_supply),
        }
    }

    /// Check the parameters and turn them into token metadata.
    ///
    /// Name and symbol must contain something other than whitespace, the
    /// granularity must be at least 1 and the supply must decode to a
    /// non-negative integer.
    pub fn validate(&self) -> Result<TokenMetadata, TokenError> {
        if self.name.trim().is_empty() {
            return Err(TokenError::EmptyName);
        }
        if self.symbol.trim().is_empty() {
            return Err(TokenError::EmptySymbol);
        }
        if self.granularity < 1 {
            return Err(TokenError::InvalidGranularity(self.granularity));
        }
        let total_supply = amount::from_signed_be_bytes(&self.total_supply)?;

        Ok(TokenMetadata {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            granularity: self.granularity as u32,
            total_supply,
        })
    }
}
