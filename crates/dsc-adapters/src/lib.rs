//! Ledger and session adapters.
//!
//! [`RpcLedgerClient`] and [`RpcSessionProvider`] talk to a node through an alloy
//! HTTP provider; [`MockLedger`] is a deterministic in-memory engine for simulation
//! and chaos tests.

#![deny(unsafe_code)]

pub mod contracts;
pub mod ledger;
pub mod mock;
pub mod rpc;
pub mod session;

pub use alloy::providers::RootProvider;
pub use ledger::{ConfirmationPolicy, RpcLedgerClient};
pub use mock::{Fault, MockLedger, MockSessionProvider};
pub use rpc::http_provider;
pub use session::RpcSessionProvider;
