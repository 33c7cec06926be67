use crate::assessment::RiskAssessment;
use crate::denylist::classify_offline;
use crate::remote::RiskModel;
use crate::selector::FunctionSelector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Stage that produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictSource {
    Remote,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub assessment: RiskAssessment,
    pub source: VerdictSource,
}

/// Two-stage classifier: the remote model when configured, otherwise or on any
/// failure the deterministic denylist. Always yields a verdict.
#[derive(Clone)]
pub struct RiskClassifier {
    remote: Option<Arc<dyn RiskModel>>,
    timeout: Duration,
}

impl RiskClassifier {
    /// Denylist only.
    pub fn offline() -> Self {
        Self {
            remote: None,
            timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    pub fn with_remote(model: Arc<dyn RiskModel>, timeout: Duration) -> Self {
        Self {
            remote: Some(model),
            timeout,
        }
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub async fn classify(&self, selector: &FunctionSelector) -> Verdict {
        let Some(model) = self.remote.as_ref() else {
            return Self::fallback(selector);
        };

        match tokio::time::timeout(self.timeout, model.assess(selector)).await {
            Ok(Ok(assessment)) => {
                tracing::debug!(selector = %selector, model = model.name(), risk = %assessment.risk, "Remote verdict");
                Verdict {
                    assessment,
                    source: VerdictSource::Remote,
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(selector = %selector, error = %e, "Remote classifier failed, using denylist");
                Self::fallback(selector)
            }
            Err(_) => {
                tracing::warn!(
                    selector = %selector,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Remote classifier timed out, using denylist"
                );
                Self::fallback(selector)
            }
        }
    }

    fn fallback(selector: &FunctionSelector) -> Verdict {
        Verdict {
            assessment: classify_offline(selector),
            source: VerdictSource::Fallback,
        }
    }
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::offline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::RiskLevel;
    use crate::remote::RemoteModelError;
    use async_trait::async_trait;

    enum Behaviour {
        Answer(RiskAssessment),
        Fail,
        Hang,
    }

    struct StubModel(Behaviour);

    #[async_trait]
    impl RiskModel for StubModel {
        fn name(&self) -> &str {
            "stub"
        }

        async fn assess(&self, _selector: &FunctionSelector) -> Result<RiskAssessment, RemoteModelError> {
            match &self.0 {
                Behaviour::Answer(assessment) => Ok(assessment.clone()),
                Behaviour::Fail => Err(RemoteModelError::Transport("connection refused".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(RemoteModelError::Transport("unreachable".into()))
                }
            }
        }
    }

    fn transfer() -> FunctionSelector {
        FunctionSelector::new([0xa9, 0x05, 0x9c, 0xbb])
    }

    fn classifier(behaviour: Behaviour) -> RiskClassifier {
        RiskClassifier::with_remote(Arc::new(StubModel(behaviour)), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn prefers_remote_verdict() {
        let remote = RiskAssessment {
            risk: RiskLevel::Medium,
            safe: false,
            explanation: "ERC-20 transfer".into(),
            recommendation: "check the recipient".into(),
        };
        let verdict = classifier(Behaviour::Answer(remote.clone()))
            .classify(&transfer())
            .await;
        assert_eq!(verdict.source, VerdictSource::Remote);
        assert_eq!(verdict.assessment, remote);
    }

    #[tokio::test]
    async fn falls_back_on_remote_error() {
        let verdict = classifier(Behaviour::Fail).classify(&transfer()).await;
        assert_eq!(verdict.source, VerdictSource::Fallback);
        assert_eq!(verdict.assessment.risk, RiskLevel::High);
        assert!(!verdict.assessment.safe);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_when_remote_hangs() {
        let verdict = classifier(Behaviour::Hang).classify(&transfer()).await;
        assert_eq!(verdict.source, VerdictSource::Fallback);
        assert!(!verdict.assessment.safe);
    }

    #[tokio::test]
    async fn offline_classifier_never_calls_out() {
        let verdict = RiskClassifier::offline().classify(&transfer()).await;
        assert_eq!(verdict.source, VerdictSource::Fallback);
        assert_eq!(verdict.assessment.risk, RiskLevel::High);
    }
}
