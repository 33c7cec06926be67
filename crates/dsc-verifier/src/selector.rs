use alloy_primitives::{hex, B256};
use dsc_core::{DscError, SessionProvider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// First four bytes of calldata.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FunctionSelector([u8; 4]);

impl FunctionSelector {
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn from_calldata(calldata: &[u8]) -> Result<Self, DscError> {
        match calldata.get(..4) {
            Some(&[a, b, c, d]) => Ok(Self([a, b, c, d])),
            _ => Err(DscError::MalformedInput(format!(
                "calldata has {} bytes, a selector needs 4",
                calldata.len()
            ))),
        }
    }
}

impl fmt::Display for FunctionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for FunctionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionSelector({self})")
    }
}

impl FromStr for FunctionSelector {
    type Err = DscError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = strip_hex_prefix(s.trim());
        if digits.len() != 8 {
            return Err(DscError::MalformedInput(format!(
                "selector '{s}' must be exactly 8 hex digits"
            )));
        }
        parse_calldata_selector(digits)
    }
}

impl TryFrom<String> for FunctionSelector {
    type Error = DscError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FunctionSelector> for String {
    fn from(value: FunctionSelector) -> Self {
        value.to_string()
    }
}

/// What the user pasted into the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalldataInput {
    TransactionHash(B256),
    Calldata(String),
}

impl CalldataInput {
    /// `0x` plus exactly 64 hex digits is a transaction hash; anything else is calldata.
    pub fn classify(input: &str) -> Self {
        let trimmed = input.trim();
        if let Some(digits) = trimmed.strip_prefix("0x") {
            if digits.len() == 64 {
                if let Ok(bytes) = hex::decode(digits) {
                    return Self::TransactionHash(B256::from_slice(&bytes));
                }
            }
        }
        Self::Calldata(trimmed.to_string())
    }

    pub fn kind(&self) -> InputKind {
        match self {
            Self::TransactionHash(_) => InputKind::TransactionHash,
            Self::Calldata(_) => InputKind::Calldata,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    TransactionHash,
    Calldata,
}

fn strip_hex_prefix(input: &str) -> &str {
    input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input)
}

/// Selector of raw hex calldata, with or without the `0x` prefix.
pub fn parse_calldata_selector(calldata: &str) -> Result<FunctionSelector, DscError> {
    let payload = strip_hex_prefix(calldata.trim());

    if payload.len() < 8 {
        return Err(DscError::MalformedInput(format!(
            "calldata '{}' is shorter than a 4-byte selector",
            calldata.trim()
        )));
    }
    if !payload.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DscError::MalformedInput(format!(
            "calldata '{}' contains non-hex characters",
            calldata.trim()
        )));
    }

    let bytes = hex::decode(&payload[..8])
        .map_err(|e| DscError::MalformedInput(format!("selector: {e}")))?;
    FunctionSelector::from_calldata(&bytes)
}

/// Resolve `input` to a selector, looking transaction hashes up through `provider`.
pub async fn extract_selector(
    input: &str,
    provider: &dyn SessionProvider,
) -> Result<FunctionSelector, DscError> {
    match CalldataInput::classify(input) {
        CalldataInput::TransactionHash(tx_hash) => {
            let calldata = provider
                .transaction_calldata(tx_hash)
                .await?
                .ok_or_else(|| DscError::NotFound(format!("transaction {tx_hash}")))?;
            tracing::debug!(tx_hash = %tx_hash, bytes = calldata.len(), "Resolved transaction calldata");
            FunctionSelector::from_calldata(&calldata)
        }
        CalldataInput::Calldata(calldata) => parse_calldata_selector(&calldata),
    }
}
