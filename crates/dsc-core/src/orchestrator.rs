use crate::error::DscError;
use crate::flow::{Phase, PhaseMachine};
use crate::ledger::LedgerClient;
use crate::sync::AccountSynchronizer;
use crate::types::{
    AccountSnapshot, Amount, OperationKind, TokenId, TokenRegistry, TxReceipt,
    DEBT_TOKEN_DECIMALS,
};
use crate::units::parse_units;
use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Caller-facing operation request. Amounts are decimal strings in whole token units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationRequest {
    Deposit {
        token: TokenId,
        amount: String,
    },
    Mint {
        amount: String,
    },
    DepositAndMint {
        token: TokenId,
        collateral: String,
        debt: String,
    },
    Redeem {
        token: TokenId,
        amount: String,
    },
    RedeemAndBurn {
        token: TokenId,
        collateral: String,
        debt: String,
    },
    Burn {
        amount: String,
    },
    Liquidate {
        collateral: TokenId,
        user: Address,
        debt_to_cover: String,
    },
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Deposit { .. } => OperationKind::Deposit,
            Self::Mint { .. } => OperationKind::Mint,
            Self::DepositAndMint { .. } => OperationKind::DepositAndMint,
            Self::Redeem { .. } => OperationKind::Redeem,
            Self::RedeemAndBurn { .. } => OperationKind::RedeemAndBurn,
            Self::Burn { .. } => OperationKind::Burn,
            Self::Liquidate { .. } => OperationKind::Liquidate,
        }
    }
}

/// Validated parameters, scaled to raw ledger units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationParams {
    Deposit {
        token: TokenId,
        amount: Amount,
    },
    Mint {
        amount: Amount,
    },
    DepositAndMint {
        token: TokenId,
        collateral: Amount,
        debt: Amount,
    },
    Redeem {
        token: TokenId,
        amount: Amount,
    },
    RedeemAndBurn {
        token: TokenId,
        collateral: Amount,
        debt: Amount,
    },
    Burn {
        amount: Amount,
    },
    Liquidate {
        collateral: TokenId,
        user: Address,
        debt_to_cover: Amount,
    },
}

impl OperationParams {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Deposit { .. } => OperationKind::Deposit,
            Self::Mint { .. } => OperationKind::Mint,
            Self::DepositAndMint { .. } => OperationKind::DepositAndMint,
            Self::Redeem { .. } => OperationKind::Redeem,
            Self::RedeemAndBurn { .. } => OperationKind::RedeemAndBurn,
            Self::Burn { .. } => OperationKind::Burn,
            Self::Liquidate { .. } => OperationKind::Liquidate,
        }
    }

    /// Token and amount the engine will pull from the caller, if any.
    pub fn spend(&self, debt_token: TokenId) -> Option<(TokenId, Amount)> {
        match self {
            Self::Deposit { token, amount } => Some((*token, *amount)),
            Self::DepositAndMint {
                token, collateral, ..
            } => Some((*token, *collateral)),
            Self::RedeemAndBurn { debt, .. } => Some((debt_token, *debt)),
            Self::Burn { amount } => Some((debt_token, *amount)),
            Self::Liquidate { debt_to_cover, .. } => Some((debt_token, *debt_to_cover)),
            Self::Mint { .. } | Self::Redeem { .. } => None,
        }
    }
}

/// The one live operation, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingOperation {
    pub id: Uuid,
    pub kind: OperationKind,
    pub params: OperationParams,
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
}

/// Result of a settled operation.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub id: Uuid,
    pub kind: OperationKind,
    /// Present only when the allowance had to be raised first.
    pub approval: Option<TxReceipt>,
    pub action: TxReceipt,
    pub snapshot: Arc<AccountSnapshot>,
}

/// Runs mutating operations one at a time: idle -> [approving ->] acting -> syncing -> idle.
///
/// A request made while another operation is live is rejected without touching
/// the ledger. Errors while approving or acting end the operation immediately
/// and are returned wrapped with the phase they happened in; the post-action
/// sync never fails the operation.
///
/// Each accepted operation runs on its own task. Dropping the future returned
/// by [`execute`](Self::execute) stops waiting for the outcome but not the
/// operation, and the slot stays taken until its ledger calls resolve.
pub struct TransactionOrchestrator {
    flow: Flow,
    registry: TokenRegistry,
    state: Arc<watch::Sender<Option<PendingOperation>>>,
}

/// Ledger-facing half of the orchestrator, moved onto the operation task.
#[derive(Clone)]
struct Flow {
    ledger: Arc<dyn LedgerClient>,
    synchronizer: Arc<AccountSynchronizer>,
}

impl TransactionOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        synchronizer: Arc<AccountSynchronizer>,
        registry: TokenRegistry,
    ) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            flow: Flow {
                ledger,
                synchronizer,
            },
            registry,
            state: Arc::new(state),
        }
    }

    pub fn account(&self) -> Address {
        self.flow.synchronizer.account()
    }

    pub fn phase(&self) -> Phase {
        self.state
            .borrow()
            .as_ref()
            .map(|pending| pending.phase)
            .unwrap_or(Phase::Idle)
    }

    pub fn pending(&self) -> Option<PendingOperation> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PendingOperation>> {
        self.state.subscribe()
    }

    pub async fn deposit(&self, token: TokenId, amount: &str) -> Result<OperationOutcome, DscError> {
        self.execute(OperationRequest::Deposit {
            token,
            amount: amount.to_string(),
        })
        .await
    }

    pub async fn mint(&self, amount: &str) -> Result<OperationOutcome, DscError> {
        self.execute(OperationRequest::Mint {
            amount: amount.to_string(),
        })
        .await
    }

    pub async fn deposit_and_mint(
        &self,
        token: TokenId,
        collateral: &str,
        debt: &str,
    ) -> Result<OperationOutcome, DscError> {
        self.execute(OperationRequest::DepositAndMint {
            token,
            collateral: collateral.to_string(),
            debt: debt.to_string(),
        })
        .await
    }

    pub async fn redeem(&self, token: TokenId, amount: &str) -> Result<OperationOutcome, DscError> {
        self.execute(OperationRequest::Redeem {
            token,
            amount: amount.to_string(),
        })
        .await
    }

    pub async fn redeem_and_burn(
        &self,
        token: TokenId,
        collateral: &str,
        debt: &str,
    ) -> Result<OperationOutcome, DscError> {
        self.execute(OperationRequest::RedeemAndBurn {
            token,
            collateral: collateral.to_string(),
            debt: debt.to_string(),
        })
        .await
    }

    pub async fn burn(&self, amount: &str) -> Result<OperationOutcome, DscError> {
        self.execute(OperationRequest::Burn {
            amount: amount.to_string(),
        })
        .await
    }

    pub async fn liquidate(
        &self,
        collateral: TokenId,
        user: Address,
        debt_to_cover: &str,
    ) -> Result<OperationOutcome, DscError> {
        self.execute(OperationRequest::Liquidate {
            collateral,
            user,
            debt_to_cover: debt_to_cover.to_string(),
        })
        .await
    }

    pub async fn execute(&self, request: OperationRequest) -> Result<OperationOutcome, DscError> {
        let params = self.validate(request)?;
        let spend = params.spend(self.flow.ledger.debt_token());
        let first = if spend.is_some() {
            Phase::Approving
        } else {
            Phase::Acting
        };

        let flight = self.begin(&params, first)?;
        tokio::spawn(self.flow.clone().run(flight, params, spend))
            .await
            .map_err(|e| DscError::InvariantViolation(format!("operation task ended abnormally: {e}")))?
    }

    /// Parse and scale every amount. Pure; never touches the ledger.
    pub fn validate(&self, request: OperationRequest) -> Result<OperationParams, DscError> {
        let debt = |text: &str| positive(text, DEBT_TOKEN_DECIMALS);
        let collateral = |token: &TokenId, text: &str| positive(text, self.registry.decimals(token));

        Ok(match request {
            OperationRequest::Deposit { token, amount } => OperationParams::Deposit {
                amount: collateral(&token, &amount)?,
                token,
            },
            OperationRequest::Mint { amount } => OperationParams::Mint {
                amount: debt(&amount)?,
            },
            OperationRequest::DepositAndMint {
                token,
                collateral: collateral_amount,
                debt: debt_amount,
            } => OperationParams::DepositAndMint {
                collateral: collateral(&token, &collateral_amount)?,
                debt: debt(&debt_amount)?,
                token,
            },
            OperationRequest::Redeem { token, amount } => OperationParams::Redeem {
                amount: collateral(&token, &amount)?,
                token,
            },
            OperationRequest::RedeemAndBurn {
                token,
                collateral: collateral_amount,
                debt: debt_amount,
            } => OperationParams::RedeemAndBurn {
                collateral: collateral(&token, &collateral_amount)?,
                debt: debt(&debt_amount)?,
                token,
            },
            OperationRequest::Burn { amount } => OperationParams::Burn {
                amount: debt(&amount)?,
            },
            OperationRequest::Liquidate {
                collateral: token,
                user,
                debt_to_cover,
            } => OperationParams::Liquidate {
                collateral: token,
                user,
                debt_to_cover: debt(&debt_to_cover)?,
            },
        })
    }

    fn begin(&self, params: &OperationParams, first: Phase) -> Result<Flight, DscError> {
        let kind = params.kind();
        let mut machine = PhaseMachine::new();
        machine.transition(first)?;

        let pending = PendingOperation {
            id: Uuid::new_v4(),
            kind,
            params: params.clone(),
            phase: first,
            started_at: Utc::now(),
        };
        let id = pending.id;

        let mut busy_with = None;
        self.state.send_if_modified(|slot| match slot {
            Some(live) => {
                busy_with = Some(live.kind);
                false
            }
            None => {
                *slot = Some(pending);
                true
            }
        });

        if let Some(live) = busy_with {
            tracing::warn!(kind = %kind, live = %live, "Rejected operation, another is in progress");
            return Err(DscError::AlreadyInProgress { kind: live });
        }

        tracing::debug!(operation_id = %id, kind = %kind, phase = %first, "Phase entered");
        Ok(Flight {
            state: Arc::clone(&self.state),
            machine,
            id,
            kind,
        })
    }
}

impl Flow {
    async fn run(
        self,
        mut flight: Flight,
        params: OperationParams,
        spend: Option<(TokenId, Amount)>,
    ) -> Result<OperationOutcome, DscError> {
        let kind = flight.kind;
        tracing::info!(
            operation_id = %flight.id,
            kind = %kind,
            account = %self.synchronizer.account(),
            "Operation started"
        );

        let approval = match spend {
            Some((token, amount)) => {
                let approval = match self.ensure_allowance(token, amount).await {
                    Ok(approval) => approval,
                    Err(e) => return Err(flight.fail(e)),
                };
                flight.enter(Phase::Acting)?;
                approval
            }
            None => None,
        };

        let action = match self.act(&params).await {
            Ok(receipt) => receipt,
            Err(e) => return Err(flight.fail(e)),
        };

        flight.enter(Phase::Syncing)?;
        let snapshot = self.synchronizer.sync().await;
        flight.enter(Phase::Idle)?;

        tracing::info!(
            operation_id = %flight.id,
            kind = %kind,
            tx_hash = %action.tx_hash,
            approved = approval.is_some(),
            "Operation settled"
        );

        Ok(OperationOutcome {
            id: flight.id,
            kind,
            approval,
            action,
            snapshot,
        })
    }

    /// Re-read the allowance and raise it to unlimited when it does not cover `amount`.
    async fn ensure_allowance(
        &self,
        token: TokenId,
        amount: Amount,
    ) -> Result<Option<TxReceipt>, DscError> {
        let spender = self.ledger.engine_address();
        let account = self.synchronizer.account();
        let current = self.ledger.allowance(token, account, spender).await?;

        if current >= amount {
            tracing::debug!(token = %token, allowance = %current, required = %amount, "Allowance sufficient");
            return Ok(None);
        }

        tracing::debug!(token = %token, allowance = %current, required = %amount, "Raising allowance");
        let receipt = self.ledger.approve(token, spender, U256::MAX).await?;
        Ok(Some(receipt))
    }

    async fn act(&self, params: &OperationParams) -> Result<TxReceipt, DscError> {
        let ledger = self.ledger.as_ref();
        match params {
            OperationParams::Deposit { token, amount } => {
                ledger.deposit_collateral(*token, *amount).await
            }
            OperationParams::Mint { amount } => ledger.mint(*amount).await,
            OperationParams::DepositAndMint {
                token,
                collateral,
                debt,
            } => ledger.deposit_collateral_and_mint(*token, *collateral, *debt).await,
            OperationParams::Redeem { token, amount } => {
                ledger.redeem_collateral(*token, *amount).await
            }
            OperationParams::RedeemAndBurn {
                token,
                collateral,
                debt,
            } => ledger.redeem_collateral_for_debt(*token, *collateral, *debt).await,
            OperationParams::Burn { amount } => ledger.burn(*amount).await,
            OperationParams::Liquidate {
                collateral,
                user,
                debt_to_cover,
            } => ledger.liquidate(*collateral, *user, *debt_to_cover).await,
        }
    }
}

fn positive(text: &str, decimals: u8) -> Result<Amount, DscError> {
    let amount = parse_units(text, decimals)?;
    if amount.is_zero() {
        return Err(DscError::InputValidation(format!(
            "amount '{}' must be greater than zero",
            text.trim()
        )));
    }
    Ok(amount)
}

/// Ownership of the single-flight slot. Dropping it returns the orchestrator to idle.
struct Flight {
    state: Arc<watch::Sender<Option<PendingOperation>>>,
    machine: PhaseMachine,
    id: Uuid,
    kind: OperationKind,
}

impl Flight {
    fn enter(&mut self, next: Phase) -> Result<(), DscError> {
        self.machine.transition(next)?;
        self.state.send_modify(|slot| {
            if let Some(pending) = slot {
                pending.phase = next;
            }
        });
        tracing::debug!(operation_id = %self.id, kind = %self.kind, phase = %next, "Phase entered");
        Ok(())
    }

    fn fail(&mut self, cause: DscError) -> DscError {
        let phase = self.machine.phase();
        tracing::warn!(
            operation_id = %self.id,
            kind = %self.kind,
            phase = %phase,
            error = %cause,
            "Operation aborted"
        );
        if let Err(e) = self.machine.transition(Phase::Idle) {
            tracing::error!(error = %e, "Abort from unexpected phase");
        }
        DscError::operation(self.kind, phase, cause)
    }
}

impl Drop for Flight {
    fn drop(&mut self) {
        self.state.send_replace(None);
    }
}
