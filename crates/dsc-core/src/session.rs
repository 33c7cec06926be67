use crate::error::DscError;
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Connected wallet identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub account: Address,
    pub chain_id: u64,
}

impl Session {
    pub fn network_name(&self) -> String {
        network_name(self.chain_id)
    }
}

/// Human-readable name for well-known chain ids.
pub fn network_name(chain_id: u64) -> String {
    match chain_id {
        1 => "Ethereum Mainnet".to_string(),
        11155111 => "Sepolia".to_string(),
        31337 => "Anvil Local".to_string(),
        1337 => "Localhost".to_string(),
        other => format!("Chain {other}"),
    }
}

/// Source of the connected account and of transaction lookups.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Current session, or `None` when no wallet is connected.
    async fn session(&self) -> Result<Option<Session>, DscError>;

    /// Calldata of a submitted transaction, or `None` when the hash is unknown.
    async fn transaction_calldata(&self, tx_hash: B256) -> Result<Option<Vec<u8>>, DscError>;

    async fn require_session(&self) -> Result<Session, DscError> {
        self.session().await?.ok_or(DscError::NotConnected)
    }
}
