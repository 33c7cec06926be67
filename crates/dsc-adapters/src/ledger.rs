use crate::contracts::{IDSCEngine, IERC20};
use crate::rpc::{is_revert, pending_error, rpc_error};
use alloy::network::{ReceiptResponse, TransactionBuilder};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use dsc_core::{AccountInformation, Amount, DscError, LedgerClient, TokenId, TxReceipt};
use std::time::Duration;

/// How long to wait for a submitted transaction to be mined.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Ledger façade over a node's JSON-RPC endpoint. Transactions are sent from
/// `account`, which the node must be able to sign for.
pub struct RpcLedgerClient {
    provider: RootProvider,
    account: Address,
    engine: Address,
    debt_token: TokenId,
    confirmation: ConfirmationPolicy,
}

impl RpcLedgerClient {
    pub fn new(
        provider: RootProvider,
        account: Address,
        engine: Address,
        debt_token: TokenId,
        confirmation: ConfirmationPolicy,
    ) -> Self {
        Self {
            provider,
            account,
            engine,
            debt_token,
            confirmation,
        }
    }

    async fn view<C: SolCall + Send>(&self, to: Address, call: C) -> Result<C::Return, DscError> {
        let tx = TransactionRequest::default()
            .with_to(to)
            .with_input(call.abi_encode());
        let reply = self.provider.call(tx).await.map_err(rpc_error)?;
        C::abi_decode_returns(&reply)
            .map_err(|e| DscError::Transport(format!("{}: {e}", C::SIGNATURE)))
    }

    /// Estimate, send and wait for one transaction.
    async fn transact<C: SolCall + Send>(&self, to: Address, call: C) -> Result<TxReceipt, DscError> {
        let mut tx = TransactionRequest::default()
            .with_from(self.account)
            .with_to(to)
            .with_input(call.abi_encode());

        let gas = match self.provider.estimate_gas(tx.clone()).await {
            Ok(gas) => gas,
            Err(e) => {
                if is_revert(&e) {
                    tracing::warn!(call = C::SIGNATURE, error = %e, "Transaction would revert");
                }
                return Err(rpc_error(e));
            }
        };
        tx.set_gas_limit(gas);

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(rpc_error)?;
        let tx_hash = *pending.tx_hash();
        tracing::debug!(call = C::SIGNATURE, tx_hash = %tx_hash, "Transaction submitted");

        let receipt = tokio::time::timeout(self.confirmation.timeout, pending.get_receipt())
            .await
            .map_err(|_| {
                DscError::Transport(format!(
                    "transaction {tx_hash} not confirmed within {}s",
                    self.confirmation.timeout.as_secs()
                ))
            })?
            .map_err(pending_error)?;

        if !receipt.status() {
            return Err(DscError::rejected(format!("transaction {tx_hash} reverted")));
        }
        Ok(TxReceipt {
            tx_hash,
            block_number: receipt.block_number(),
        })
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    fn engine_address(&self) -> Address {
        self.engine
    }

    fn debt_token(&self) -> TokenId {
        self.debt_token
    }

    async fn account_information(&self, account: Address) -> Result<AccountInformation, DscError> {
        let info = self
            .view(self.engine, IDSCEngine::getAccountInformationCall { user: account })
            .await?;
        Ok(AccountInformation {
            total_debt_minted: info.totalDscMinted,
            collateral_value_in_quote: info.collateralValueInUsd,
        })
    }

    async fn health_factor(&self, account: Address) -> Result<U256, DscError> {
        self.view(self.engine, IDSCEngine::getHealthFactorCall { user: account })
            .await
    }

    async fn collateral_tokens(&self) -> Result<Vec<TokenId>, DscError> {
        let tokens = self
            .view(self.engine, IDSCEngine::getCollateralTokensCall {})
            .await?;
        Ok(tokens.into_iter().map(TokenId::from).collect())
    }

    async fn collateral_balance(&self, account: Address, token: TokenId) -> Result<Amount, DscError> {
        self.view(
            self.engine,
            IDSCEngine::getCollateralBalanceOfUserCall {
                user: account,
                token: token.address(),
            },
        )
        .await
    }

    async fn allowance(&self, token: TokenId, owner: Address, spender: Address) -> Result<Amount, DscError> {
        self.view(token.address(), IERC20::allowanceCall { owner, spender })
            .await
    }

    async fn balance_of(&self, token: TokenId, owner: Address) -> Result<Amount, DscError> {
        self.view(token.address(), IERC20::balanceOfCall { account: owner })
            .await
    }

    async fn approve(&self, token: TokenId, spender: Address, amount: Amount) -> Result<TxReceipt, DscError> {
        self.transact(
            token.address(),
            IERC20::approveCall {
                spender,
                value: amount,
            },
        )
        .await
    }

    async fn deposit_collateral(&self, token: TokenId, amount: Amount) -> Result<TxReceipt, DscError> {
        self.transact(
            self.engine,
            IDSCEngine::depositCollateralCall {
                tokenCollateralAddress: token.address(),
                amountCollateral: amount,
            },
        )
        .await
    }

    async fn mint(&self, amount: Amount) -> Result<TxReceipt, DscError> {
        self.transact(self.engine, IDSCEngine::mintDscCall { amountDscToMint: amount })
            .await
    }

    async fn deposit_collateral_and_mint(
        &self,
        token: TokenId,
        collateral: Amount,
        debt: Amount,
    ) -> Result<TxReceipt, DscError> {
        self.transact(
            self.engine,
            IDSCEngine::depositCollateralAndMintDscCall {
                tokenCollateralAddress: token.address(),
                amountCollateral: collateral,
                amountDscToMint: debt,
            },
        )
        .await
    }

    async fn redeem_collateral(&self, token: TokenId, amount: Amount) -> Result<TxReceipt, DscError> {
        self.transact(
            self.engine,
            IDSCEngine::redeemCollateralCall {
                tokenCollateralAddress: token.address(),
                amountCollateral: amount,
            },
        )
        .await
    }

    async fn redeem_collateral_for_debt(
        &self,
        token: TokenId,
        collateral: Amount,
        debt: Amount,
    ) -> Result<TxReceipt, DscError> {
        self.transact(
            self.engine,
            IDSCEngine::redeemCollateralForDscCall {
                tokenCollateralAddress: token.address(),
                amountCollateral: collateral,
                amountDscToBurn: debt,
            },
        )
        .await
    }

    async fn burn(&self, amount: Amount) -> Result<TxReceipt, DscError> {
        self.transact(self.engine, IDSCEngine::burnDscCall { amount })
            .await
    }

    async fn liquidate(
        &self,
        collateral: TokenId,
        user: Address,
        debt_to_cover: Amount,
    ) -> Result<TxReceipt, DscError> {
        self.transact(
            self.engine,
            IDSCEngine::liquidateCall {
                collateral: collateral.address(),
                user,
                debtToCover: debt_to_cover,
            },
        )
        .await
    }
}
