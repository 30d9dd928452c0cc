use crate::error::TokenError;
use curve25519_dalek::edwards::CompressedEdwardsY;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Length of an address in bytes
pub const ADDRESS_LENGTH: usize = 32;

// Address identifies an account or a contract on the ledger.
// It is a 32 byte long opaque identifier, resembling a public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|e| TokenError::InvalidAddress(format!("{}: {}", s, e)))?;
        Address::try_from(bytes.as_slice())
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = TokenError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; ADDRESS_LENGTH] = bytes.try_into().map_err(|_| {
            TokenError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                ADDRESS_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Address(array))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Default for Address {
    fn default() -> Self {
        Address([0; ADDRESS_LENGTH])
    }
}

impl Deref for Address {
    type Target = [u8; ADDRESS_LENGTH];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

static TEST_ADDRESS_COUNTER: AtomicU64 = AtomicU64::new(0);

impl Address {
    pub fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Address(bytes)
    }

    /// Get a reference to the internal bytes
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; ADDRESS_LENGTH] {
        self.0
    }

    /// Generate a fresh address for tests, distinct from every other one
    /// handed out by this process
    pub fn unique_for_tests() -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
            .to_le_bytes();
        let counter = TEST_ADDRESS_COUNTER
            .fetch_add(1, Ordering::Relaxed)
            .to_le_bytes();

        Address(Self::derive(&[b"test_account", &timestamp, &counter], 0))
    }

    pub fn derive(seeds: &[&[u8]], bump: u8) -> [u8; ADDRESS_LENGTH] {
        let mut hasher = Sha256::new();

        // Domain separator
        hasher.update(b"ATS_Address");

        for seed in seeds {
            hasher.update(seed);
        }

        hasher.update([bump]);

        hasher.finalize().into()
    }

    /// Verify that a 32-byte array is not a valid point on the ed25519 curve
    ///
    /// Returns true if the bytes do not represent a valid curve point.
    pub fn is_off_curve(bytes: &[u8; ADDRESS_LENGTH]) -> bool {
        let Ok(compressed_edwards_y) = CompressedEdwardsY::from_slice(bytes.as_ref()) else {
            return true;
        };
        compressed_edwards_y.decompress().is_none()
    }

    /// Try to find an off-curve address for the given seeds.
    ///
    /// Off-curve addresses have no corresponding private key, which makes them
    /// suitable for contract accounts.
    pub fn try_find_program_address(seeds: &[&[u8]]) -> Option<(Address, u8)> {
        for bump in 0..=u8::MAX {
            let candidate = Address::derive(seeds, bump);
            if Address::is_off_curve(&candidate) {
                return Some((Address(candidate), bump));
            }
        }
        None
    }

    /// Address of the token contract deployed by `deployer` under `symbol`
    pub fn contract_address(deployer: &Address, symbol: &str) -> Result<Address, TokenError> {
        Address::try_find_program_address(&[b"ats_token", deployer.bytes(), symbol.as_bytes()])
            .map(|(address, _)| address)
            .ok_or_else(|| {
                TokenError::InvalidAddress(format!(
                    "no contract address available for deployer {}",
                    deployer
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_for_tests() {
        let a = Address::unique_for_tests();
        let b = Address::unique_for_tests();

        assert_ne!(a, b);
        assert_ne!(a, Address::default());
        assert_ne!(b, Address::default());
    }

    #[test]
    fn test_default_address() {
        let default_address = Address::default();
        assert_eq!(*default_address, [0u8; 32]);
    }

    #[test]
    fn test_display_and_parse() {
        let address = Address::new([0xab; 32]);
        let rendered = address.to_string();

        assert!(rendered.starts_with("0x"));
        assert_eq!(rendered.len(), 2 + 64);
        assert_eq!(rendered.parse::<Address>().unwrap(), address);

        // The prefix is optional
        assert_eq!(rendered[2..].parse::<Address>().unwrap(), address);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            "0x1234".parse::<Address>(),
            Err(TokenError::InvalidAddress(_))
        ));
        assert!(matches!(
            "zz".repeat(32).parse::<Address>(),
            Err(TokenError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_derive_is_deterministic() {
        let seed1 = b"seed_1";
        let seed2 = b"seed_2";

        let a = Address::derive(&[seed1, seed2], 5);
        assert_eq!(a, Address::derive(&[seed1, seed2], 5));
        assert_ne!(a, Address::derive(&[seed1, seed2], 6));
        assert_ne!(a, Address::derive(&[seed2, seed1], 5));
    }

    #[test]
    fn test_program_address_is_off_curve() {
        let (address, bump) = Address::try_find_program_address(&[b"curve_test"]).unwrap();

        assert!(Address::is_off_curve(&address));
        assert_eq!(*address, Address::derive(&[b"curve_test"], bump));
    }

    #[test]
    fn test_contract_address_depends_on_deployer_and_symbol() {
        let deployer = Address::new([7; 32]);
        let other = Address::new([8; 32]);

        let a = Address::contract_address(&deployer, "J3N").unwrap();
        assert_eq!(a, Address::contract_address(&deployer, "J3N").unwrap());
        assert_ne!(a, Address::contract_address(&other, "J3N").unwrap());
        assert_ne!(a, Address::contract_address(&deployer, "XYZ").unwrap());
    }

    #[test]
    fn test_ordering_follows_bytes() {
        let low = Address::new([1; 32]);
        let high = Address::new([2; 32]);
        assert!(low < high);
    }
}
