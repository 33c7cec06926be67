//! Mutating position commands. Each connects, runs one operation and prints the settled snapshot.

use crate::client::Backend;
use crate::output::{print_outcome, OutcomeView, OutputFormat};
use clap::Subcommand;
use dsc_core::types::parse_address;
use dsc_core::{DscError, OperationRequest};

#[derive(Subcommand)]
pub enum OperateCommands {
    /// Deposit collateral
    Deposit {
        /// Token symbol or address
        token: String,
        /// Amount in whole tokens, e.g. 1.5
        amount: String,
    },

    /// Mint DSC against deposited collateral
    Mint { amount: String },

    /// Deposit collateral and mint DSC in one transaction
    DepositMint {
        token: String,
        collateral: String,
        debt: String,
    },

    /// Redeem collateral
    Redeem { token: String, amount: String },

    /// Burn DSC and redeem collateral in one transaction
    RedeemBurn {
        token: String,
        collateral: String,
        debt: String,
    },

    /// Burn DSC to reduce debt
    Burn { amount: String },

    /// Cover another account's debt and seize its collateral
    Liquidate {
        /// Collateral token to seize
        token: String,
        /// Account to liquidate
        account: String,
        /// DSC debt to cover
        debt: String,
    },
}

impl OperateCommands {
    pub fn into_request(self, backend: &Backend) -> Result<OperationRequest, DscError> {
        let request = match self {
            Self::Deposit { token, amount } => OperationRequest::Deposit {
                token: backend.token(&token)?,
                amount,
            },
            Self::Mint { amount } => OperationRequest::Mint { amount },
            Self::DepositMint {
                token,
                collateral,
                debt,
            } => OperationRequest::DepositAndMint {
                token: backend.token(&token)?,
                collateral,
                debt,
            },
            Self::Redeem { token, amount } => OperationRequest::Redeem {
                token: backend.token(&token)?,
                amount,
            },
            Self::RedeemBurn {
                token,
                collateral,
                debt,
            } => OperationRequest::RedeemAndBurn {
                token: backend.token(&token)?,
                collateral,
                debt,
            },
            Self::Burn { amount } => OperationRequest::Burn { amount },
            Self::Liquidate {
                token,
                account,
                debt,
            } => OperationRequest::Liquidate {
                collateral: backend.token(&token)?,
                user: parse_address(&account)?,
                debt_to_cover: debt,
            },
        };
        Ok(request)
    }
}

pub async fn execute(
    command: OperateCommands,
    backend: &Backend,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let request = command.into_request(backend)?;
    let session = backend.connect(None).await?;

    let result = session.orchestrator().execute(request).await;
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            session.disconnect().await;
            return Err(e.into());
        }
    };

    let view = OutcomeView::new(session.session(), &outcome, backend.registry());
    print_outcome(
        &view,
        outcome.snapshot.position.health_factor.status(),
        format,
    );
    session.disconnect().await;
    Ok(())
}
