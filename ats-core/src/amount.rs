//! Token amounts and their encodings

use crate::error::TokenError;
use num_bigint::{BigInt, BigUint};
use num_traits::Zero;

/// Non-negative arbitrary-precision token amount
pub type Amount = BigUint;

/// Decode a big-endian two's-complement integer into an amount.
///
/// This is the encoding a JVM `BigInteger::toByteArray` produces. Empty input and
/// negative values are rejected.
pub fn from_signed_be_bytes(bytes: &[u8]) -> Result<Amount, TokenError> {
    if bytes.is_empty() {
        return Err(TokenError::InvalidTotalSupply(
            "empty integer encoding".to_string(),
        ));
    }

    BigInt::from_signed_bytes_be(bytes)
        .to_biguint()
        .ok_or_else(|| TokenError::InvalidTotalSupply("amount is negative".to_string()))
}

/// Minimal big-endian two's-complement encoding of an amount
pub fn to_signed_be_bytes(amount: &Amount) -> Vec<u8> {
    BigInt::from(amount.clone()).to_signed_bytes_be()
}

pub fn parse_decimal(value: &str) -> Result<Amount, TokenError> {
    value
        .trim()
        .parse::<BigUint>()
        .map_err(|e| TokenError::InvalidTotalSupply(format!("{:?}: {}", value, e)))
}

pub fn to_decimal_string(amount: &Amount) -> String {
    amount.to_str_radix(10)
}

pub fn zero() -> Amount {
    Amount::zero()
}
