use crate::error::DscError;
use crate::ledger::LedgerClient;
use crate::orchestrator::TransactionOrchestrator;
use crate::session::{Session, SessionProvider};
use crate::sync::{AccountSynchronizer, SyncTask, DEFAULT_SYNC_PERIOD};
use crate::types::{AccountSnapshot, TokenRegistry};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub registry: TokenRegistry,
    /// `None` disables the background poll.
    pub sync_period: Option<Duration>,
    /// Refuse to connect when the session reports a different chain.
    pub expected_chain_id: Option<u64>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            registry: TokenRegistry::default(),
            sync_period: Some(DEFAULT_SYNC_PERIOD),
            expected_chain_id: None,
        }
    }
}

/// Everything bound to one connected account. Built on connect, torn down on disconnect.
pub struct AccountSession {
    session: Session,
    synchronizer: Arc<AccountSynchronizer>,
    orchestrator: TransactionOrchestrator,
    poller: Option<SyncTask>,
}

impl AccountSession {
    pub async fn connect(
        provider: &dyn SessionProvider,
        ledger: Arc<dyn LedgerClient>,
        options: SessionOptions,
    ) -> Result<Self, DscError> {
        let session = provider.require_session().await?;
        Self::establish(session, ledger, options).await
    }

    /// Check the network, run the first sync and start the background poll.
    pub async fn establish(
        session: Session,
        ledger: Arc<dyn LedgerClient>,
        options: SessionOptions,
    ) -> Result<Self, DscError> {
        if let Some(expected) = options.expected_chain_id {
            if expected != session.chain_id {
                return Err(DscError::WrongNetwork {
                    expected,
                    actual: session.chain_id,
                });
            }
        }

        let synchronizer = Arc::new(AccountSynchronizer::new(
            Arc::clone(&ledger),
            session.account,
            options.registry.display_set(),
        ));
        synchronizer.sync().await;

        let poller = options
            .sync_period
            .map(|period| synchronizer.spawn_periodic(period));
        let orchestrator =
            TransactionOrchestrator::new(ledger, Arc::clone(&synchronizer), options.registry);

        tracing::info!(
            account = %session.account,
            chain_id = session.chain_id,
            network = %session.network_name(),
            "Session established"
        );

        Ok(Self {
            session,
            synchronizer,
            orchestrator,
            poller,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn orchestrator(&self) -> &TransactionOrchestrator {
        &self.orchestrator
    }

    pub fn synchronizer(&self) -> &Arc<AccountSynchronizer> {
        &self.synchronizer
    }

    pub fn snapshot(&self) -> Arc<AccountSnapshot> {
        self.synchronizer.snapshot()
    }

    pub async fn disconnect(mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop().await;
        }
        tracing::info!(account = %self.session.account, "Session closed");
    }
}
