//! Deployment configuration loaded from JSON

use crate::amount;
use crate::error::TokenError;
use crate::metadata::DeployParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(#[from] TokenError),
}

/// Where the ledger state lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Volatile in-process state
    #[default]
    Memory,

    /// SQLite database file, created if missing
    Sqlite { path: PathBuf },
}

/// Token parameters in human-editable form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    #[serde(default = "TokenConfig::default_granularity")]
    pub granularity: i32,

    /// Decimal representation of the total supply
    pub total_supply: String,
}

impl TokenConfig {
    fn default_granularity() -> i32 {
        1
    }

    /// Convert into the arguments of the deployment entry point
    pub fn to_deploy_params(&self) -> Result<DeployParams, TokenError> {
        let total_supply = amount::parse_decimal(&self.total_supply)?;
        Ok(DeployParams::new(
            self.name.clone(),
            self.symbol.clone(),
            self.granularity,
            &total_supply,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub token: TokenConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl DeploymentConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: DeploymentConfig = serde_json::from_str(json)?;
        // Surface bad values at load time rather than at deployment
        config.token.to_deploy_params()?.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded deployment config from {}", path.display());
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let config = DeploymentConfig::from_json_str(
            r#"{"token": {"name": "JENNIJUJU", "symbol": "J3N", "total_supply": "1000"}}"#,
        )
        .unwrap();

        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.token.granularity, 1);

        let params = config.token.to_deploy_params().unwrap();
        assert_eq!(
            params.validate().unwrap().total_supply,
            BigUint::from(1000u32)
        );
    }

    #[test]
    fn test_parse_sqlite_backend() {
        let config = DeploymentConfig::from_json_str(
            r#"{
                "token": {"name": "T", "symbol": "T", "granularity": 10, "total_supply": "0"},
                "storage": {"backend": "sqlite", "path": "/tmp/ledger.db"}
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.storage,
            StorageConfig::Sqlite {
                path: PathBuf::from("/tmp/ledger.db")
            }
        );
        assert_eq!(config.token.granularity, 10);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = DeploymentConfig::from_json_str(
            r#"{"token": {"name": "", "symbol": "J3N", "total_supply": "1"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(TokenError::EmptyName)));

        let err = DeploymentConfig::from_json_str(
            r#"{"token": {"name": "A", "symbol": "B", "total_supply": "-1"}}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid(TokenError::InvalidTotalSupply(_))
        ));

        let err = DeploymentConfig::from_json_str(r#"{"token": 5}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"token": {{"name": "A", "symbol": "B", "total_supply": "42"}}}}"#
        )
        .unwrap();

        let config = DeploymentConfig::from_file(file.path()).unwrap();
        assert_eq!(config.token.total_supply, "42");

        let missing = DeploymentConfig::from_file("/definitely/not/here.json");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
