use crate::assessment::RiskAssessment;
use crate::classifier::{RiskClassifier, VerdictSource};
use crate::denylist;
use crate::selector::{extract_selector, CalldataInput, FunctionSelector, InputKind};
use chrono::{DateTime, Utc};
use dsc_core::{DscError, SessionProvider};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of screening one pasted transaction hash or calldata blob.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub input_kind: InputKind,
    pub selector: FunctionSelector,
    /// Known signature when the selector is on the denylist.
    pub signature: Option<&'static str>,
    pub assessment: RiskAssessment,
    pub source: VerdictSource,
    pub verified_at: DateTime<Utc>,
}

pub struct TransactionVerifier {
    provider: Arc<dyn SessionProvider>,
    classifier: RiskClassifier,
}

impl TransactionVerifier {
    pub fn new(provider: Arc<dyn SessionProvider>, classifier: RiskClassifier) -> Self {
        Self {
            provider,
            classifier,
        }
    }

    pub fn has_remote(&self) -> bool {
        self.classifier.has_remote()
    }

    /// Parse `input` and classify its selector.
    ///
    /// Fails only for input problems (`MalformedInput`, `NotFound`) or a failed
    /// hash lookup; classification itself always succeeds.
    pub async fn verify(&self, input: &str) -> Result<VerificationReport, DscError> {
        if input.trim().is_empty() {
            return Err(DscError::MalformedInput(
                "enter a transaction hash or calldata".into(),
            ));
        }

        let input_kind = CalldataInput::classify(input).kind();
        let selector = extract_selector(input, self.provider.as_ref()).await?;
        let verdict = self.classifier.classify(&selector).await;

        tracing::info!(
            selector = %selector,
            risk = %verdict.assessment.risk,
            source = ?verdict.source,
            "Transaction screened"
        );

        Ok(VerificationReport {
            input_kind,
            selector,
            signature: denylist::lookup(&selector),
            assessment: verdict.assessment,
            source: verdict.source,
            verified_at: Utc::now(),
        })
    }
}
