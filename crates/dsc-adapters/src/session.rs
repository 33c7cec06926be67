use crate::rpc::rpc_error;
use alloy::consensus::Transaction as _;
use alloy::providers::{Provider, RootProvider};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use dsc_core::{DscError, Session, SessionProvider};

/// Session backed by a node holding unlocked accounts.
pub struct RpcSessionProvider {
    provider: RootProvider,
    account_override: Option<Address>,
}

impl RpcSessionProvider {
    pub fn new(provider: RootProvider, account_override: Option<Address>) -> Self {
        Self {
            provider,
            account_override,
        }
    }

    async fn account(&self) -> Result<Option<Address>, DscError> {
        if let Some(account) = self.account_override {
            return Ok(Some(account));
        }
        let accounts = self.provider.get_accounts().await.map_err(rpc_error)?;
        Ok(accounts.first().copied())
    }
}

#[async_trait]
impl SessionProvider for RpcSessionProvider {
    async fn session(&self) -> Result<Option<Session>, DscError> {
        let Some(account) = self.account().await? else {
            return Ok(None);
        };
        let chain_id = self.provider.get_chain_id().await.map_err(rpc_error)?;
        Ok(Some(Session { account, chain_id }))
    }

    async fn transaction_calldata(&self, tx_hash: B256) -> Result<Option<Vec<u8>>, DscError> {
        let tx = self
            .provider
            .get_transaction_by_hash(tx_hash)
            .await
            .map_err(rpc_error)?;
        Ok(tx.map(|tx| tx.input().to_vec()))
    }
}
