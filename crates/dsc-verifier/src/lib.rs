//! Transaction screening: selector extraction plus a remote-first, denylist-backed
//! risk classifier.

#![deny(unsafe_code)]

pub mod assessment;
pub mod classifier;
pub mod denylist;
pub mod remote;
pub mod selector;
pub mod verifier;

pub use assessment::{RiskAssessment, RiskLevel};
pub use classifier::{RiskClassifier, Verdict, VerdictSource, DEFAULT_REMOTE_TIMEOUT};
pub use remote::{OpenAiRiskModel, RemoteModelConfig, RemoteModelError, RiskModel};
pub use selector::{
    extract_selector, parse_calldata_selector, CalldataInput, FunctionSelector, InputKind,
};
pub use verifier::{TransactionVerifier, VerificationReport};
