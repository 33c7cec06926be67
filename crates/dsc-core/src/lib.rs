//! Client core for a collateralized-debt position.
//!
//! This crate owns the account-side state machine:
//! - an [`AccountSynchronizer`] that keeps an immutable snapshot of the user's
//!   position in step with the ledger,
//! - a single-flight [`TransactionOrchestrator`] running approve-then-act
//!   operations against a [`LedgerClient`],
//! - the error taxonomy and amount codec shared by the other crates.

#![deny(unsafe_code)]

pub mod account;
pub mod error;
pub mod flow;
pub mod ledger;
pub mod orchestrator;
pub mod session;
pub mod sync;
pub mod types;
pub mod units;

#[cfg(test)]
pub(crate) mod test_support;

pub use account::{AccountSession, SessionOptions};
pub use error::{DscError, ErrorCategory};
pub use flow::{Phase, PhaseMachine};
pub use ledger::LedgerClient;
pub use orchestrator::{
    OperationOutcome, OperationParams, OperationRequest, PendingOperation, TransactionOrchestrator,
};
pub use session::{network_name, Session, SessionProvider};
pub use sync::{AccountSynchronizer, SyncTask, DEFAULT_SYNC_PERIOD};
pub use types::*;
pub use units::{format_health_factor, format_units, format_usd, parse_units, short_address};
