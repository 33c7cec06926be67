use crate::error::DscError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phases of a mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Approving,
    Acting,
    Syncing,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Approving => "approving",
            Self::Acting => "acting",
            Self::Syncing => "syncing",
        }
    }

    pub fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Enforces idle -> [approving ->] acting -> syncing -> idle.
///
/// A failure while approving or acting drops straight back to idle.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: Phase,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn allows(from: Phase, to: Phase) -> bool {
        matches!(
            (from, to),
            (Phase::Idle, Phase::Approving)
                | (Phase::Idle, Phase::Acting)
                | (Phase::Approving, Phase::Acting)
                | (Phase::Acting, Phase::Syncing)
                | (Phase::Syncing, Phase::Idle)
                | (Phase::Approving, Phase::Idle)
                | (Phase::Acting, Phase::Idle)
        )
    }

    pub fn transition(&mut self, next: Phase) -> Result<(), DscError> {
        if !Self::allows(self.phase, next) {
            return Err(DscError::InvariantViolation(format!(
                "phase transition not allowed: {} -> {}",
                self.phase, next
            )));
        }
        self.phase = next;
        Ok(())
    }
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}
