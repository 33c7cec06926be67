use crate::error::DscError;
use crate::types::{AccountInformation, Amount, TokenId, TxReceipt};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;

/// Façade over the remote ledger: the engine contract, the debt token and ERC-20 collateral.
///
/// Views are side-effect free. Mutations submit one transaction on behalf of the
/// session account and resolve only once it is confirmed; a revert surfaces as
/// [`DscError::RemoteRejection`] and a lost connection as [`DscError::Transport`].
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Address the engine pulls funds from; the spender for every approval.
    fn engine_address(&self) -> Address;

    fn debt_token(&self) -> TokenId;

    async fn account_information(&self, account: Address) -> Result<AccountInformation, DscError>;

    /// Raw 18-decimal health factor as reported by the engine.
    async fn health_factor(&self, account: Address) -> Result<U256, DscError>;

    async fn collateral_tokens(&self) -> Result<Vec<TokenId>, DscError>;

    async fn collateral_balance(&self, account: Address, token: TokenId)
        -> Result<Amount, DscError>;

    async fn allowance(
        &self,
        token: TokenId,
        owner: Address,
        spender: Address,
    ) -> Result<Amount, DscError>;

    async fn balance_of(&self, token: TokenId, owner: Address) -> Result<Amount, DscError>;

    async fn approve(
        &self,
        token: TokenId,
        spender: Address,
        amount: Amount,
    ) -> Result<TxReceipt, DscError>;

    async fn deposit_collateral(&self, token: TokenId, amount: Amount)
        -> Result<TxReceipt, DscError>;

    async fn mint(&self, amount: Amount) -> Result<TxReceipt, DscError>;

    async fn deposit_collateral_and_mint(
        &self,
        token: TokenId,
        collateral: Amount,
        debt: Amount,
    ) -> Result<TxReceipt, DscError>;

    async fn redeem_collateral(&self, token: TokenId, amount: Amount)
        -> Result<TxReceipt, DscError>;

    async fn redeem_collateral_for_debt(
        &self,
        token: TokenId,
        collateral: Amount,
        debt: Amount,
    ) -> Result<TxReceipt, DscError>;

    async fn burn(&self, amount: Amount) -> Result<TxReceipt, DscError>;

    async fn liquidate(
        &self,
        collateral: TokenId,
        user: Address,
        debt_to_cover: Amount,
    ) -> Result<TxReceipt, DscError>;
}
