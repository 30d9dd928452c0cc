pub mod address;
pub mod amount;
pub mod config;
pub mod error;
pub mod event;
pub mod metadata;

// Re-export the main types for convenience
pub use address::Address;
pub use amount::Amount;
pub use config::{ConfigError, DeploymentConfig, StorageConfig, TokenConfig};
pub use error::{StorageError, TokenError, TokenResult};
pub use event::{Log, OperatorEvent, Topic};
pub use metadata::{DeployParams, TokenMetadata};
