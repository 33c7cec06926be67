//! Deterministic in-memory ledger for simulation and tests.
//!
//! Models the engine's custody, debt and health-factor rules closely enough to
//! exercise every client flow offline, including reverts and partial failures.

use crate::contracts::{IDSCEngine, IERC20};
use alloy::sol_types::SolCall;
use alloy_primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use dsc_core::units::pow10;
use dsc_core::{
    AccountInformation, Amount, DscError, LedgerClient, Session, SessionProvider, TokenId,
    TxReceipt,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Share of collateral value that counts towards the health factor, in percent.
const LIQUIDATION_THRESHOLD: u64 = 50;
const LIQUIDATION_BONUS: u64 = 10;

/// Injected failure for a ledger method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    Transport(String),
    Revert(String),
}

#[derive(Debug, Clone)]
struct CollateralToken {
    decimals: u8,
    /// Quote value of one whole token, 18 decimals.
    price: U256,
}

#[derive(Debug, Clone, Default)]
struct Book {
    collateral_tokens: BTreeMap<TokenId, CollateralToken>,
    order: Vec<TokenId>,
    balances: HashMap<(TokenId, Address), U256>,
    allowances: HashMap<(TokenId, Address, Address), U256>,
    deposits: HashMap<(Address, TokenId), U256>,
    minted: HashMap<Address, U256>,
}

#[derive(Default)]
struct State {
    book: Book,
    faults: HashMap<String, Fault>,
    calls: Vec<String>,
    transactions: HashMap<B256, Vec<u8>>,
    block: u64,
}

/// In-memory engine bound to one caller account, like a wallet-backed client.
pub struct MockLedger {
    caller: Address,
    engine: Address,
    debt_token: TokenId,
    state: Mutex<State>,
}

fn revert(reason: &str) -> DscError {
    DscError::rejected(format!("execution reverted: {reason}"))
}

impl Book {
    fn balance(&self, token: TokenId, owner: Address) -> U256 {
        self.balances.get(&(token, owner)).copied().unwrap_or_default()
    }

    fn credit(&mut self, token: TokenId, owner: Address, amount: U256) {
        *self.balances.entry((token, owner)).or_default() += amount;
    }

    fn debit(&mut self, token: TokenId, owner: Address, amount: U256) -> Result<(), DscError> {
        let held = self.balance(token, owner);
        let rest = held
            .checked_sub(amount)
            .ok_or_else(|| revert("ERC20: transfer amount exceeds balance"))?;
        self.balances.insert((token, owner), rest);
        Ok(())
    }

    /// `transferFrom(owner -> spender)` with allowance accounting.
    fn pull(&mut self, token: TokenId, owner: Address, spender: Address, amount: U256) -> Result<(), DscError> {
        let key = (token, owner, spender);
        let allowed = self.allowances.get(&key).copied().unwrap_or_default();
        if allowed < amount {
            return Err(revert("ERC20: insufficient allowance"));
        }
        if allowed != U256::MAX {
            self.allowances.insert(key, allowed - amount);
        }
        self.debit(token, owner, amount)?;
        self.credit(token, spender, amount);
        Ok(())
    }

    fn deposited(&self, user: Address, token: TokenId) -> U256 {
        self.deposits.get(&(user, token)).copied().unwrap_or_default()
    }

    fn minted(&self, user: Address) -> U256 {
        self.minted.get(&user).copied().unwrap_or_default()
    }

    fn collateral_value(&self, user: Address) -> Result<U256, DscError> {
        self.collateral_tokens
            .iter()
            .try_fold(U256::ZERO, |total, (token, info)| {
                let value = checked(self.deposited(user, *token).checked_mul(info.price))?
                    / pow10(info.decimals);
                checked(total.checked_add(value))
            })
    }

    fn health_factor(&self, user: Address) -> Result<U256, DscError> {
        let minted = self.minted(user);
        if minted.is_zero() {
            return Ok(U256::MAX);
        }
        let value = self.collateral_value(user)?;
        let adjusted =
            checked(value.checked_mul(U256::from(LIQUIDATION_THRESHOLD)))? / U256::from(100u8);
        Ok(checked(adjusted.checked_mul(pow10(18)))? / minted)
    }

    fn require_healthy(&self, user: Address) -> Result<(), DscError> {
        if self.health_factor(user)? < pow10(18) {
            return Err(revert("DSCEngine__BreaksHealthFactor"));
        }
        Ok(())
    }

    fn require_allowed(&self, token: TokenId) -> Result<&CollateralToken, DscError> {
        self.collateral_tokens
            .get(&token)
            .ok_or_else(|| revert("DSCEngine__NotAllowedToken"))
    }

    fn deposit(&mut self, engine: Address, user: Address, token: TokenId, amount: U256) -> Result<(), DscError> {
        require_positive(amount)?;
        self.require_allowed(token)?;
        self.pull(token, user, engine, amount)?;
        *self.deposits.entry((user, token)).or_default() += amount;
        Ok(())
    }

    fn mint(&mut self, debt_token: TokenId, user: Address, amount: U256) -> Result<(), DscError> {
        require_positive(amount)?;
        *self.minted.entry(user).or_default() += amount;
        self.require_healthy(user)?;
        self.credit(debt_token, user, amount);
        Ok(())
    }

    fn redeem(&mut self, engine: Address, from: Address, to: Address, token: TokenId, amount: U256) -> Result<(), DscError> {
        require_positive(amount)?;
        let held = self.deposited(from, token);
        let rest = held
            .checked_sub(amount)
            .ok_or_else(|| revert("DSCEngine__TransferFailed"))?;
        self.deposits.insert((from, token), rest);
        self.debit(token, engine, amount)?;
        self.credit(token, to, amount);
        Ok(())
    }

    fn burn(&mut self, engine: Address, debt_token: TokenId, on_behalf_of: Address, payer: Address, amount: U256) -> Result<(), DscError> {
        require_positive(amount)?;
        let owed = self.minted(on_behalf_of);
        let rest = owed
            .checked_sub(amount)
            .ok_or_else(|| revert("DSCEngine__BurnAmountExceedsMinted"))?;
        self.pull(debt_token, payer, engine, amount)?;
        self.debit(debt_token, engine, amount)?;
        self.minted.insert(on_behalf_of, rest);
        Ok(())
    }
}

fn checked(value: Option<U256>) -> Result<U256, DscError> {
    value.ok_or_else(|| revert("arithmetic overflow"))
}

fn require_positive(amount: U256) -> Result<(), DscError> {
    if amount.is_zero() {
        return Err(revert("DSCEngine__NeedsMoreThanZero"));
    }
    Ok(())
}

impl MockLedger {
    pub fn new(caller: Address) -> Self {
        Self {
            caller,
            engine: Address::from([0xe0; 20]),
            debt_token: TokenId::new(Address::from([0xd5; 20])),
            state: Mutex::new(State::default()),
        }
    }

    /// Two collateral tokens priced like the reference deployment, with the caller funded.
    pub fn demo(caller: Address) -> Self {
        let ledger = Self::new(caller)
            .with_collateral_token(Self::demo_weth(), 18, U256::from(2_000u64) * pow10(18))
            .with_collateral_token(Self::demo_wbtc(), 8, U256::from(1_000u64) * pow10(18));
        ledger.fund(caller, Self::demo_weth(), U256::from(10u8) * pow10(18));
        ledger.fund(caller, Self::demo_wbtc(), U256::from(10u8) * pow10(8));
        ledger
    }

    pub fn demo_weth() -> TokenId {
        TokenId::new(Address::from([0xa1; 20]))
    }

    pub fn demo_wbtc() -> TokenId {
        TokenId::new(Address::from([0xb1; 20]))
    }

    pub fn with_collateral_token(self, token: TokenId, decimals: u8, price: U256) -> Self {
        {
            let mut state = self.lock();
            state
                .book
                .collateral_tokens
                .insert(token, CollateralToken { decimals, price });
            state.book.order.push(token);
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn caller(&self) -> Address {
        self.caller
    }

    pub fn fund(&self, owner: Address, token: TokenId, amount: U256) {
        self.lock().book.credit(token, owner, amount);
    }

    pub fn set_price(&self, token: TokenId, price: U256) {
        if let Some(info) = self.lock().book.collateral_tokens.get_mut(&token) {
            info.price = price;
        }
    }

    pub fn set_allowance(&self, token: TokenId, owner: Address, amount: U256) {
        let engine = self.engine;
        self.lock().book.allowances.insert((token, owner, engine), amount);
    }

    /// Act as `user` directly against the book, bypassing faults and the call log.
    pub fn seed_position(&self, user: Address, token: TokenId, collateral: U256, debt: U256) -> Result<(), DscError> {
        let mut state = self.lock();
        let mut book = state.book.clone();
        book.credit(token, user, collateral);
        book.allowances.insert((token, user, self.engine), collateral);
        book.deposit(self.engine, user, token, collateral)?;
        if !debt.is_zero() {
            book.mint(self.debt_token, user, debt)?;
        }
        state.book = book;
        Ok(())
    }

    pub fn inject(&self, method: &str, fault: Fault) {
        self.lock().faults.insert(method.to_string(), fault);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|call| *call == method).count()
    }

    pub fn allowance_of(&self, token: TokenId, owner: Address) -> U256 {
        let engine = self.engine;
        self.lock()
            .book
            .allowances
            .get(&(token, owner, engine))
            .copied()
            .unwrap_or_default()
    }

    /// Calldata of a transaction this ledger mined.
    pub fn transaction(&self, tx_hash: &B256) -> Option<Vec<u8>> {
        self.lock().transactions.get(tx_hash).cloned()
    }

    fn enter(&self, method: &str) -> Result<(), DscError> {
        let mut state = self.lock();
        state.calls.push(method.to_string());
        match state.faults.get(method) {
            Some(Fault::Transport(reason)) => Err(DscError::Transport(reason.clone())),
            Some(Fault::Revert(reason)) => Err(revert(reason)),
            None => Ok(()),
        }
    }

    fn read<R>(&self, method: &str, read: impl FnOnce(&Book) -> Result<R, DscError>) -> Result<R, DscError> {
        self.enter(method)?;
        read(&self.lock().book)
    }

    /// Apply `apply` to a copy of the book and commit only if it succeeds.
    fn transact(
        &self,
        method: &str,
        calldata: Vec<u8>,
        apply: impl FnOnce(&mut Book) -> Result<(), DscError>,
    ) -> Result<TxReceipt, DscError> {
        self.enter(method)?;
        let mut state = self.lock();
        let mut book = state.book.clone();
        apply(&mut book)?;
        state.book = book;

        state.block += 1;
        let mut preimage = calldata.clone();
        preimage.extend_from_slice(&state.block.to_be_bytes());
        let tx_hash = keccak256(&preimage);
        state.transactions.insert(tx_hash, calldata);

        tracing::trace!(method, tx_hash = %tx_hash, block = state.block, "Simulated transaction mined");
        Ok(TxReceipt {
            tx_hash,
            block_number: Some(state.block),
        })
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn engine_address(&self) -> Address {
        self.engine
    }

    fn debt_token(&self) -> TokenId {
        self.debt_token
    }

    async fn account_information(&self, account: Address) -> Result<AccountInformation, DscError> {
        self.read("account_information", |book| {
            Ok(AccountInformation {
                total_debt_minted: book.minted(account),
                collateral_value_in_quote: book.collateral_value(account)?,
            })
        })
    }

    async fn health_factor(&self, account: Address) -> Result<U256, DscError> {
        self.read("health_factor", |book| book.health_factor(account))
    }

    async fn collateral_tokens(&self) -> Result<Vec<TokenId>, DscError> {
        self.read("collateral_tokens", |book| Ok(book.order.clone()))
    }

    async fn collateral_balance(&self, account: Address, token: TokenId) -> Result<Amount, DscError> {
        self.read("collateral_balance", |book| Ok(book.deposited(account, token)))
    }

    async fn allowance(&self, token: TokenId, owner: Address, spender: Address) -> Result<Amount, DscError> {
        self.read("allowance", |book| {
            Ok(book
                .allowances
                .get(&(token, owner, spender))
                .copied()
                .unwrap_or_default())
        })
    }

    async fn balance_of(&self, token: TokenId, owner: Address) -> Result<Amount, DscError> {
        self.read("balance_of", |book| Ok(book.balance(token, owner)))
    }

    async fn approve(&self, token: TokenId, spender: Address, amount: Amount) -> Result<TxReceipt, DscError> {
        let caller = self.caller;
        let calldata = IERC20::approveCall {
            spender,
            value: amount,
        }
        .abi_encode();
        self.transact("approve", calldata, |book| {
            book.allowances.insert((token, caller, spender), amount);
            Ok(())
        })
    }

    async fn deposit_collateral(&self, token: TokenId, amount: Amount) -> Result<TxReceipt, DscError> {
        let (caller, engine) = (self.caller, self.engine);
        let calldata = IDSCEngine::depositCollateralCall {
            tokenCollateralAddress: token.address(),
            amountCollateral: amount,
        }
        .abi_encode();
        self.transact("deposit_collateral", calldata, |book| {
            book.deposit(engine, caller, token, amount)
        })
    }

    async fn mint(&self, amount: Amount) -> Result<TxReceipt, DscError> {
        let (caller, debt_token) = (self.caller, self.debt_token);
        let calldata = IDSCEngine::mintDscCall { amountDscToMint: amount }.abi_encode();
        self.transact("mint", calldata, |book| book.mint(debt_token, caller, amount))
    }

    async fn deposit_collateral_and_mint(
        &self,
        token: TokenId,
        collateral: Amount,
        debt: Amount,
    ) -> Result<TxReceipt, DscError> {
        let (caller, engine, debt_token) = (self.caller, self.engine, self.debt_token);
        let calldata = IDSCEngine::depositCollateralAndMintDscCall {
            tokenCollateralAddress: token.address(),
            amountCollateral: collateral,
            amountDscToMint: debt,
        }
        .abi_encode();
        self.transact("deposit_collateral_and_mint", calldata, |book| {
            book.deposit(engine, caller, token, collateral)?;
            book.mint(debt_token, caller, debt)
        })
    }

    async fn redeem_collateral(&self, token: TokenId, amount: Amount) -> Result<TxReceipt, DscError> {
        let (caller, engine) = (self.caller, self.engine);
        let calldata = IDSCEngine::redeemCollateralCall {
            tokenCollateralAddress: token.address(),
            amountCollateral: amount,
        }
        .abi_encode();
        self.transact("redeem_collateral", calldata, |book| {
            book.redeem(engine, caller, caller, token, amount)?;
            book.require_healthy(caller)
        })
    }

    async fn redeem_collateral_for_debt(
        &self,
        token: TokenId,
        collateral: Amount,
        debt: Amount,
    ) -> Result<TxReceipt, DscError> {
        let (caller, engine, debt_token) = (self.caller, self.engine, self.debt_token);
        let calldata = IDSCEngine::redeemCollateralForDscCall {
            tokenCollateralAddress: token.address(),
            amountCollateral: collateral,
            amountDscToBurn: debt,
        }
        .abi_encode();
        self.transact("redeem_collateral_for_debt", calldata, |book| {
            book.burn(engine, debt_token, caller, caller, debt)?;
            book.redeem(engine, caller, caller, token, collateral)?;
            book.require_healthy(caller)
        })
    }

    async fn burn(&self, amount: Amount) -> Result<TxReceipt, DscError> {
        let (caller, engine, debt_token) = (self.caller, self.engine, self.debt_token);
        let calldata = IDSCEngine::burnDscCall { amount }.abi_encode();
        self.transact("burn", calldata, |book| {
            book.burn(engine, debt_token, caller, caller, amount)
        })
    }

    async fn liquidate(
        &self,
        collateral: TokenId,
        user: Address,
        debt_to_cover: Amount,
    ) -> Result<TxReceipt, DscError> {
        let (caller, engine, debt_token) = (self.caller, self.engine, self.debt_token);
        let calldata = IDSCEngine::liquidateCall {
            collateral: collateral.address(),
            user,
            debtToCover: debt_to_cover,
        }
        .abi_encode();
        self.transact("liquidate", calldata, |book| {
            require_positive(debt_to_cover)?;
            let starting = book.health_factor(user)?;
            if starting >= pow10(18) {
                return Err(revert("DSCEngine__HealthFactorOk"));
            }

            let info = book.require_allowed(collateral)?.clone();
            let covered = debt_to_cover
                .checked_mul(pow10(info.decimals))
                .and_then(|scaled| scaled.checked_div(info.price))
                .ok_or_else(|| revert("DSCEngine__InvalidPrice"))?;
            let bonus = checked(covered.checked_mul(U256::from(LIQUIDATION_BONUS)))? / U256::from(100u8);

            book.redeem(engine, user, caller, collateral, checked(covered.checked_add(bonus))?)?;
            book.burn(engine, debt_token, user, caller, debt_to_cover)?;

            if book.health_factor(user)? <= starting {
                return Err(revert("DSCEngine__HealthFactorNotImproved"));
            }
            book.require_healthy(caller)
        })
    }
}

/// Fixed session over a [`MockLedger`]; transaction lookups hit the ledger's mined history.
pub struct MockSessionProvider {
    session: Option<Session>,
    ledger: Arc<MockLedger>,
}

impl MockSessionProvider {
    pub fn new(ledger: Arc<MockLedger>, chain_id: u64) -> Self {
        Self {
            session: Some(Session {
                account: ledger.caller(),
                chain_id,
            }),
            ledger,
        }
    }

    pub fn disconnected(ledger: Arc<MockLedger>) -> Self {
        Self {
            session: None,
            ledger,
        }
    }
}

#[async_trait]
impl SessionProvider for MockSessionProvider {
    async fn session(&self) -> Result<Option<Session>, DscError> {
        Ok(self.session)
    }

    async fn transaction_calldata(&self, tx_hash: B256) -> Result<Option<Vec<u8>>, DscError> {
        Ok(self.ledger.transaction(&tx_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address::from([0x01; 20])
    }

    fn weth() -> TokenId {
        MockLedger::demo_weth()
    }

    #[tokio::test]
    async fn deposit_needs_allowance() {
        let ledger = MockLedger::demo(alice());
        let err = ledger.deposit_collateral(weth(), pow10(18)).await.unwrap_err();
        assert!(err.to_string().contains("insufficient allowance"));

        ledger
            .approve(weth(), ledger.engine_address(), U256::MAX)
            .await
            .unwrap();
        ledger.deposit_collateral(weth(), pow10(18)).await.unwrap();

        assert_eq!(ledger.collateral_balance(alice(), weth()).await.unwrap(), pow10(18));
        assert_eq!(ledger.allowance_of(weth(), alice()), U256::MAX);
    }

    #[tokio::test]
    async fn failed_combined_call_rolls_back() {
        let ledger = MockLedger::demo(alice());
        ledger.set_allowance(weth(), alice(), U256::MAX);

        // 1 WETH is worth 2000, half of which backs at most 1000 debt.
        let err = ledger
            .deposit_collateral_and_mint(weth(), pow10(18), U256::from(1_001u64) * pow10(18))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("DSCEngine__BreaksHealthFactor"));
        assert_eq!(ledger.collateral_balance(alice(), weth()).await.unwrap(), U256::ZERO);
        assert_eq!(
            ledger.balance_of(weth(), alice()).await.unwrap(),
            U256::from(10u8) * pow10(18)
        );
    }

    #[tokio::test]
    async fn health_factor_is_max_without_debt() {
        let ledger = MockLedger::demo(alice());
        assert_eq!(ledger.health_factor(alice()).await.unwrap(), U256::MAX);
    }

    #[tokio::test]
    async fn injected_fault_is_returned_and_logged() {
        let ledger = MockLedger::demo(alice());
        ledger.inject("balance_of", Fault::Transport("node offline".into()));

        let err = ledger.balance_of(weth(), alice()).await.unwrap_err();
        assert!(matches!(err, DscError::Transport(_)));
        assert_eq!(ledger.count("balance_of"), 1);
    }

    #[tokio::test]
    async fn mined_transactions_are_resolvable() {
        let ledger = Arc::new(MockLedger::demo(alice()));
        let receipt = ledger
            .approve(weth(), ledger.engine_address(), U256::MAX)
            .await
            .unwrap();

        let provider = MockSessionProvider::new(Arc::clone(&ledger), 31337);
        let calldata = provider
            .transaction_calldata(receipt.tx_hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&calldata[..4], &IERC20::approveCall::SELECTOR);
    }

    #[tokio::test]
    async fn liquidation_against_zero_price_reverts() {
        let ledger = MockLedger::demo(alice());
        let bob = Address::from([0x02; 20]);
        ledger
            .seed_position(bob, weth(), pow10(18), U256::from(900u64) * pow10(18))
            .unwrap();
        ledger.fund(alice(), ledger.debt_token(), U256::from(100u64) * pow10(18));
        ledger.set_allowance(ledger.debt_token(), alice(), U256::MAX);
        ledger.set_price(weth(), U256::ZERO);

        let err = ledger
            .liquidate(weth(), bob, U256::from(100u64) * pow10(18))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("DSCEngine__InvalidPrice"));
        assert_eq!(ledger.collateral_balance(bob, weth()).await.unwrap(), pow10(18));
    }

    #[tokio::test]
    async fn oversized_price_reverts_instead_of_wrapping() {
        let ledger = MockLedger::demo(alice());
        ledger
            .seed_position(alice(), weth(), pow10(18), U256::from(100u64) * pow10(18))
            .unwrap();
        ledger.set_price(weth(), U256::MAX);

        let err = ledger.health_factor(alice()).await.unwrap_err();
        assert!(err.to_string().contains("arithmetic overflow"));
    }
}
