use crate::flow::Phase;
use crate::types::OperationKind;
use thiserror::Error;

/// Client errors, grouped by [`ErrorCategory`].
#[derive(Debug, Error)]
pub enum DscError {
    #[error("Invalid input: {0}")]
    InputValidation(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Rejected by ledger: {reason}")]
    RemoteRejection { reason: String },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation already in progress: {kind}")]
    AlreadyInProgress { kind: OperationKind },

    #[error("No active session")]
    NotConnected,

    #[error("Connected to chain {actual}, expected chain {expected}")]
    WrongNetwork { expected: u64, actual: u64 },

    #[error("{kind} failed while {phase}: {source}")]
    Operation {
        kind: OperationKind,
        phase: Phase,
        #[source]
        source: Box<DscError>,
    },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Coarse error taxonomy callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InputValidation,
    RemoteRejection,
    TransportFailure,
    NotFound,
    Conflict,
    Internal,
}

impl DscError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::RemoteRejection {
            reason: reason.into(),
        }
    }

    pub fn operation(kind: OperationKind, phase: Phase, source: DscError) -> Self {
        Self::Operation {
            kind,
            phase,
            source: Box::new(source),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InputValidation(_) | Self::MalformedInput(_) => ErrorCategory::InputValidation,
            Self::RemoteRejection { .. } => ErrorCategory::RemoteRejection,
            Self::Transport(_) => ErrorCategory::TransportFailure,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::AlreadyInProgress { .. } | Self::NotConnected | Self::WrongNetwork { .. } => {
                ErrorCategory::Conflict
            }
            Self::Operation { source, .. } => source.category(),
            Self::InvariantViolation(_) => ErrorCategory::Internal,
        }
    }

    /// Innermost cause, unwrapping operation context.
    pub fn root_cause(&self) -> &DscError {
        match self {
            Self::Operation { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
