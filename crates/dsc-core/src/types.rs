use crate::error::DscError;
use crate::units::pow10;
use alloy_primitives::{hex, Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Raw on-chain integer amount, scaled by the token's decimals.
pub type Amount = U256;

/// Fixed precision of the debt token and of engine-reported ratios.
pub const DEBT_TOKEN_DECIMALS: u8 = 18;

/// Decimals assumed for tokens missing from the registry.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Parse a `0x`-prefixed 20-byte hex identifier, accepting any letter case.
pub fn parse_address(input: &str) -> Result<Address, DscError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| DscError::InputValidation(format!("address '{trimmed}' must start with 0x")))?;

    if digits.len() != 40 {
        return Err(DscError::InputValidation(format!(
            "address '{trimmed}' must have 40 hex digits, got {}",
            digits.len()
        )));
    }

    let bytes = hex::decode(digits)
        .map_err(|e| DscError::InputValidation(format!("address '{trimmed}': {e}")))?;
    Ok(Address::from_slice(&bytes))
}

/// Canonical lowercase rendering of an address.
pub fn lowercase_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// Token identifier. Equality, ordering and display ignore the letter case of the input.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId(Address);

impl TokenId {
    pub fn new(address: Address) -> Self {
        Self(address)
    }

    pub fn address(&self) -> Address {
        self.0
    }
}

impl FromStr for TokenId {
    type Err = DscError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_address(s).map(Self)
    }
}

impl TryFrom<String> for TokenId {
    type Error = DscError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TokenId> for String {
    fn from(value: TokenId) -> Self {
        value.to_string()
    }
}

impl From<Address> for TokenId {
    fn from(value: Address) -> Self {
        Self(value)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&lowercase_address(&self.0))
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({self})")
    }
}

/// Per-token balances. A missing key reads as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalances(BTreeMap<TokenId, Amount>);

impl TokenBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: TokenId, amount: Amount) {
        self.0.insert(token, amount);
    }

    pub fn get(&self, token: &TokenId) -> Amount {
        self.0.get(token).copied().unwrap_or(U256::ZERO)
    }

    /// Lookup by a caller-supplied identifier string in any letter case.
    pub fn get_by_str(&self, token: &str) -> Result<Amount, DscError> {
        Ok(self.get(&token.parse()?))
    }

    pub fn recorded(&self, token: &TokenId) -> Option<Amount> {
        self.0.get(token).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TokenId, &Amount)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(TokenId, Amount)> for TokenBalances {
    fn from_iter<T: IntoIterator<Item = (TokenId, Amount)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Wallet-held funds outside engine custody.
pub type WalletBalances = TokenBalances;

/// Engine-reported ratio of collateral value to debt, or infinite when there is no debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "raw", rename_all = "snake_case")]
pub enum HealthFactor {
    Ratio(U256),
    Infinite,
}

impl HealthFactor {
    /// Ratios above this many whole units are reported as infinite.
    pub const INFINITE_ABOVE: u64 = 1_000_000;

    /// Classify a raw 18-decimal ratio returned by the engine.
    pub fn from_raw(raw: U256) -> Self {
        let ceiling = U256::from(Self::INFINITE_ABOVE) * pow10(DEBT_TOKEN_DECIMALS);
        if raw > ceiling {
            Self::Infinite
        } else {
            Self::Ratio(raw)
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }

    pub fn status(&self) -> HealthStatus {
        let one = pow10(DEBT_TOKEN_DECIMALS);
        match self {
            Self::Infinite => HealthStatus::NoDebt,
            Self::Ratio(raw) if *raw < one => HealthStatus::Liquidatable,
            Self::Ratio(raw) if *raw < one * U256::from(2u8) => HealthStatus::AtRisk,
            Self::Ratio(_) => HealthStatus::Healthy,
        }
    }
}

impl Default for HealthFactor {
    fn default() -> Self {
        Self::Infinite
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    NoDebt,
    Healthy,
    AtRisk,
    Liquidatable,
}

impl HealthStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::NoDebt => "no debt",
            Self::Healthy => "healthy",
            Self::AtRisk => "at risk",
            Self::Liquidatable => "liquidatable",
        }
    }
}

/// Aggregate account figures reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInformation {
    pub total_debt_minted: Amount,
    pub collateral_value_in_quote: Amount,
}

/// The user's position inside the engine. Replaced wholesale on every sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub total_debt_minted: Amount,
    pub collateral_value_in_quote: Amount,
    pub health_factor: HealthFactor,
    pub collateral_balances: TokenBalances,
}

impl Position {
    pub fn collateral_balance(&self, token: &TokenId) -> Amount {
        self.collateral_balances.get(token)
    }
}

/// Immutable result of one synchronization pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account: Address,
    pub position: Position,
    pub wallet_balances: WalletBalances,
    pub debt_token_balance: Amount,
    pub collateral_tokens: Vec<TokenId>,
    /// Sequence number of the pass that produced this snapshot; 0 before the first pass.
    pub pass: u64,
    pub synced_at: Option<DateTime<Utc>>,
}

impl AccountSnapshot {
    pub fn empty(account: Address) -> Self {
        Self {
            account,
            position: Position::default(),
            wallet_balances: WalletBalances::default(),
            debt_token_balance: U256::ZERO,
            collateral_tokens: Vec::new(),
            pass: 0,
            synced_at: None,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced_at.is_some()
    }
}

/// Confirmation of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

/// Mutating operations exposed by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Deposit,
    Mint,
    DepositAndMint,
    Redeem,
    RedeemAndBurn,
    Burn,
    Liquidate,
}

impl OperationKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Mint => "mint",
            Self::DepositAndMint => "deposit_and_mint",
            Self::Redeem => "redeem",
            Self::RedeemAndBurn => "redeem_and_burn",
            Self::Burn => "burn",
            Self::Liquidate => "liquidate",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static metadata for a token the client knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u8,
}

/// Statically configured tokens. Also the display set merged into wallet balance reads.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: BTreeMap<TokenId, TokenInfo>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, token: TokenId, info: TokenInfo) {
        self.tokens.insert(token, info);
    }

    pub fn with_token(mut self, token: TokenId, symbol: impl Into<String>, decimals: u8) -> Self {
        self.register(
            token,
            TokenInfo {
                symbol: symbol.into(),
                decimals,
            },
        );
        self
    }

    pub fn decimals(&self, token: &TokenId) -> u8 {
        self.tokens
            .get(token)
            .map(|info| info.decimals)
            .unwrap_or(DEFAULT_TOKEN_DECIMALS)
    }

    pub fn symbol(&self, token: &TokenId) -> Option<&str> {
        self.tokens.get(token).map(|info| info.symbol.as_str())
    }

    /// Resolve a symbol (case-insensitive) or an address string to a token.
    pub fn resolve(&self, token: &str) -> Result<TokenId, DscError> {
        if let Some((id, _)) = self
            .tokens
            .iter()
            .find(|(_, info)| info.symbol.eq_ignore_ascii_case(token.trim()))
        {
            return Ok(*id);
        }
        token.parse()
    }

    pub fn display_set(&self) -> Vec<TokenId> {
        self.tokens.keys().copied().collect()
    }
}
