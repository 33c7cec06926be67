//! Scripted in-memory ledger for unit tests.

use crate::error::DscError;
use crate::ledger::LedgerClient;
use crate::types::{AccountInformation, Amount, TokenId, TxReceipt};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};

pub fn token(byte: u8) -> TokenId {
    TokenId::new(Address::from([byte; 20]))
}

const MUTATIONS: &[&str] = &[
    "approve",
    "deposit_collateral",
    "mint",
    "deposit_collateral_and_mint",
    "redeem_collateral",
    "redeem_collateral_for_debt",
    "burn",
    "liquidate",
];

/// Opens a held call path when released.
pub struct Gate(watch::Sender<bool>);

impl Gate {
    pub fn release(&self) {
        let _ = self.0.send(true);
    }
}

#[derive(Default)]
struct Hold {
    gate: Option<watch::Receiver<bool>>,
    reached: Arc<Notify>,
}

impl Hold {
    fn install(&mut self) -> Gate {
        let (tx, rx) = watch::channel(false);
        self.gate = Some(rx);
        Gate(tx)
    }
}

#[derive(Default)]
struct State {
    calls: Vec<String>,
    accepted: Vec<TokenId>,
    collateral: HashMap<TokenId, Amount>,
    wallet: HashMap<TokenId, Amount>,
    allowances: HashMap<TokenId, Amount>,
    debt_minted: Amount,
    fail_views: bool,
    failing_balances: HashSet<TokenId>,
    rejections: HashMap<String, String>,
    transport_failures: HashSet<String>,
    tx_counter: u64,
}

pub struct ScriptedLedger {
    state: Mutex<State>,
    views: Mutex<Hold>,
    actions: Mutex<Hold>,
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            views: Mutex::new(Hold::default()),
            actions: Mutex::new(Hold::default()),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn debt_token_id(&self) -> TokenId {
        token(0xdd)
    }

    pub fn accept_collateral(&self, token: TokenId) {
        self.with(|s| s.accepted.push(token));
    }

    pub fn set_collateral(&self, token: TokenId, amount: Amount) {
        self.with(|s| s.collateral.insert(token, amount));
    }

    pub fn set_wallet(&self, token: TokenId, amount: Amount) {
        self.with(|s| s.wallet.insert(token, amount));
    }

    pub fn set_allowance(&self, token: TokenId, amount: Amount) {
        self.with(|s| s.allowances.insert(token, amount));
    }

    pub fn allowance_of(&self, token: TokenId) -> Amount {
        self.with(|s| s.allowances.get(&token).copied().unwrap_or(U256::ZERO))
    }

    pub fn fail_views(&self, fail: bool) {
        self.with(|s| s.fail_views = fail);
    }

    pub fn fail_balance_of(&self, token: TokenId) {
        self.with(|s| s.failing_balances.insert(token));
    }

    pub fn reject(&self, method: &str, reason: &str) {
        self.with(|s| s.rejections.insert(method.to_string(), reason.to_string()));
    }

    pub fn clear_rejections(&self) {
        self.with(|s| s.rejections.clear());
    }

    pub fn fail_transport(&self, method: &str) {
        self.with(|s| s.transport_failures.insert(method.to_string()));
    }

    pub fn hold_views(&self) -> Gate {
        self.views.lock().unwrap().install()
    }

    pub fn hold_actions(&self) -> Gate {
        self.actions.lock().unwrap().install()
    }

    pub async fn wait_for_held_view(&self) {
        let reached = self.views.lock().unwrap().reached.clone();
        reached.notified().await;
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn count(&self, method: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|c| *c == method).count())
    }

    pub fn mutations(&self) -> Vec<String> {
        self.with(|s| {
            s.calls
                .iter()
                .filter(|c| MUTATIONS.contains(&c.as_str()))
                .cloned()
                .collect()
        })
    }

    async fn pass(hold: &Mutex<Hold>) {
        let (gate, reached) = {
            let hold = hold.lock().unwrap();
            (hold.gate.clone(), hold.reached.clone())
        };
        if let Some(mut gate) = gate {
            reached.notify_one();
            let _ = gate.wait_for(|open| *open).await;
        }
    }

    async fn view(&self, method: &str) -> Result<(), DscError> {
        self.with(|s| s.calls.push(method.to_string()));
        Self::pass(&self.views).await;
        if self.with(|s| s.fail_views) {
            return Err(DscError::Transport("connection refused".into()));
        }
        Ok(())
    }

    async fn mutate(&self, method: &str, apply: impl FnOnce(&mut State)) -> Result<TxReceipt, DscError> {
        self.with(|s| s.calls.push(method.to_string()));
        Self::pass(&self.actions).await;
        self.with(|s| {
            if s.transport_failures.contains(method) {
                return Err(DscError::Transport("connection reset".into()));
            }
            if let Some(reason) = s.rejections.get(method) {
                return Err(DscError::rejected(reason.clone()));
            }
            apply(s);
            s.tx_counter += 1;
            Ok(TxReceipt {
                tx_hash: B256::from(U256::from(s.tx_counter).to_be_bytes::<32>()),
                block_number: Some(s.tx_counter),
            })
        })
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    fn engine_address(&self) -> Address {
        Address::from([0xee; 20])
    }

    fn debt_token(&self) -> TokenId {
        self.debt_token_id()
    }

    async fn account_information(&self, _account: Address) -> Result<AccountInformation, DscError> {
        self.view("account_information").await?;
        Ok(self.with(|s| AccountInformation {
            total_debt_minted: s.debt_minted,
            collateral_value_in_quote: s.collateral.values().fold(U256::ZERO, |a, b| a + *b),
        }))
    }

    async fn health_factor(&self, _account: Address) -> Result<U256, DscError> {
        self.view("health_factor").await?;
        Ok(self.with(|s| {
            if s.debt_minted.is_zero() {
                U256::MAX
            } else {
                U256::from(2u8) * crate::units::pow10(18)
            }
        }))
    }

    async fn collateral_tokens(&self) -> Result<Vec<TokenId>, DscError> {
        self.view("collateral_tokens").await?;
        Ok(self.with(|s| s.accepted.clone()))
    }

    async fn collateral_balance(&self, _account: Address, token: TokenId) -> Result<Amount, DscError> {
        self.view("collateral_balance").await?;
        Ok(self.with(|s| s.collateral.get(&token).copied().unwrap_or(U256::ZERO)))
    }

    async fn allowance(&self, token: TokenId, _owner: Address, _spender: Address) -> Result<Amount, DscError> {
        self.with(|s| s.calls.push("allowance".to_string()));
        Ok(self.allowance_of(token))
    }

    async fn balance_of(&self, token: TokenId, _owner: Address) -> Result<Amount, DscError> {
        self.view("balance_of").await?;
        if self.with(|s| s.failing_balances.contains(&token)) {
            return Err(DscError::Transport("balance read timed out".into()));
        }
        Ok(self.with(|s| s.wallet.get(&token).copied().unwrap_or(U256::ZERO)))
    }

    async fn approve(&self, token: TokenId, _spender: Address, amount: Amount) -> Result<TxReceipt, DscError> {
        self.mutate("approve", |s| {
            s.allowances.insert(token, amount);
        })
        .await
    }

    async fn deposit_collateral(&self, token: TokenId, amount: Amount) -> Result<TxReceipt, DscError> {
        self.mutate("deposit_collateral", |s| {
            *s.collateral.entry(token).or_default() += amount;
        })
        .await
    }

    async fn mint(&self, amount: Amount) -> Result<TxReceipt, DscError> {
        self.mutate("mint", |s| s.debt_minted += amount).await
    }

    async fn deposit_collateral_and_mint(
        &self,
        token: TokenId,
        collateral: Amount,
        debt: Amount,
    ) -> Result<TxReceipt, DscError> {
        self.mutate("deposit_collateral_and_mint", |s| {
            *s.collateral.entry(token).or_default() += collateral;
            s.debt_minted += debt;
        })
        .await
    }

    async fn redeem_collateral(&self, token: TokenId, amount: Amount) -> Result<TxReceipt, DscError> {
        self.mutate("redeem_collateral", |s| {
            let held = s.collateral.entry(token).or_default();
            *held = held.saturating_sub(amount);
        })
        .await
    }

    async fn redeem_collateral_for_debt(
        &self,
        token: TokenId,
        collateral: Amount,
        debt: Amount,
    ) -> Result<TxReceipt, DscError> {
        self.mutate("redeem_collateral_for_debt", |s| {
            let held = s.collateral.entry(token).or_default();
            *held = held.saturating_sub(collateral);
            s.debt_minted = s.debt_minted.saturating_sub(debt);
        })
        .await
    }

    async fn burn(&self, amount: Amount) -> Result<TxReceipt, DscError> {
        self.mutate("burn", |s| s.debt_minted = s.debt_minted.saturating_sub(amount))
            .await
    }

    async fn liquidate(
        &self,
        _collateral: TokenId,
        _user: Address,
        _debt_to_cover: Amount,
    ) -> Result<TxReceipt, DscError> {
        self.mutate("liquidate", |_| {}).await
    }
}
