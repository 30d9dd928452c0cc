//! Log records emitted by the token contract

use crate::address::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of a log topic in bytes
pub const TOPIC_SIZE: usize = 32;

/// A fixed-width identifying field attached to a log
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic([u8; TOPIC_SIZE]);

impl Topic {
    /// Fit arbitrary bytes into a topic: longer inputs are truncated, shorter
    /// ones are right-padded with zeros
    pub fn truncate_pad(bytes: &[u8]) -> Self {
        let mut topic = [0u8; TOPIC_SIZE];
        let len = bytes.len().min(TOPIC_SIZE);
        topic[..len].copy_from_slice(&bytes[..len]);
        Topic(topic)
    }

    pub fn as_bytes(&self) -> &[u8; TOPIC_SIZE] {
        &self.0
    }
}

impl From<Address> for Topic {
    fn from(address: Address) -> Self {
        Topic::truncate_pad(address.bytes())
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", hex::encode(self.0))
    }
}

/// A notification record produced by a successful state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// The contract that emitted the log
    pub address: Address,

    /// Topics, the first one names the event
    pub topics: Vec<Topic>,

    /// Payload, empty for operator events
    pub data: Vec<u8>,
}

/// Changes to a holder's operator set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorEvent {
    AuthorizedOperator {
        operator: Address,
        token_holder: Address,
    },
    RevokedOperator {
        operator: Address,
        token_holder: Address,
    },
}

impl OperatorEvent {
    pub const AUTHORIZED_OPERATOR: &'static str = "AuthorizedOperator";
    pub const REVOKED_OPERATOR: &'static str = "RevokedOperator";

    pub fn name(&self) -> &'static str {
        match self {
            OperatorEvent::AuthorizedOperator { .. } => Self::AUTHORIZED_OPERATOR,
            OperatorEvent::RevokedOperator { .. } => Self::REVOKED_OPERATOR,
        }
    }

    pub fn operator(&self) -> &Address {
        match self {
            OperatorEvent::AuthorizedOperator { operator, .. }
            | OperatorEvent::RevokedOperator { operator, .. } => operator,
        }
    }

    pub fn token_holder(&self) -> &Address {
        match self {
            OperatorEvent::AuthorizedOperator { token_holder, .. }
            | OperatorEvent::RevokedOperator { token_holder, .. } => token_holder,
        }
    }

    /// Encode the event as a log emitted by `contract`.
    ///
    /// Topics are `[name, operator, token_holder]` and the payload is empty.
    pub fn to_log(&self, contract: Address) -> Log {
        Log {
            address: contract,
            topics: vec![
                Topic::truncate_pad(self.name().as_bytes()),
                Topic::from(*self.operator()),
                Topic::from(*self.token_holder()),
            ],
            data: Vec::new(),
        }
    }

    /// Decode an operator event from a log, if it is one
    pub fn from_log(log: &Log) -> Option<Self> {
        let [name, operator, token_holder] = log.topics.as_slice() else {
            return None;
        };
        if !log.data.is_empty() {
            return None;
        }

        let operator = Address::new(*operator.as_bytes());
        let token_holder = Address::new(*token_holder.as_bytes());

        if *name == Topic::truncate_pad(Self::AUTHORIZED_OPERATOR.as_bytes()) {
            Some(OperatorEvent::AuthorizedOperator {
                operator,
                token_holder,
            })
        } else if *name == Topic::truncate_pad(Self::REVOKED_OPERATOR.as_bytes()) {
            Some(OperatorEvent::RevokedOperator {
                operator,
                token_holder,
            })
        } else {
            None
        }
    }
}
