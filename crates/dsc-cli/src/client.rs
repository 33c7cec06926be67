//! Ledger and session wiring for either a live node or the in-memory simulation.

use crate::config::{ClientConfig, ContractsConfig};
use alloy_primitives::Address;
use anyhow::Context;
use dsc_adapters::{
    http_provider, ConfirmationPolicy, MockLedger, MockSessionProvider, RootProvider,
    RpcLedgerClient, RpcSessionProvider,
};
use dsc_core::{
    AccountSession, DscError, LedgerClient, SessionOptions, SessionProvider, TokenId,
    TokenRegistry,
};
use dsc_verifier::{OpenAiRiskModel, RiskClassifier, TransactionVerifier};
use std::sync::Arc;
use std::time::Duration;

/// Account used by `--simulate`: the first Anvil dev account.
pub const SIMULATED_ACCOUNT: Address = Address::new([
    0xf3, 0x9f, 0xd6, 0xe5, 0x1a, 0xad, 0x88, 0xf6, 0xf4, 0xce, 0x6a, 0xb8, 0x82, 0x72, 0x79, 0xcf,
    0xff, 0xb9, 0x22, 0x66,
]);

const SIMULATED_CHAIN_ID: u64 = 31337;

enum LedgerSource {
    Simulated(Arc<MockLedger>),
    Rpc {
        provider: RootProvider,
        contracts: ContractsConfig,
        confirmation: ConfirmationPolicy,
    },
}

pub struct Backend {
    source: LedgerSource,
    provider: Arc<dyn SessionProvider>,
    registry: TokenRegistry,
    expected_chain_id: u64,
}

impl Backend {
    pub fn from_config(config: &ClientConfig, simulate: bool) -> anyhow::Result<Self> {
        if simulate {
            Self::simulated(config)
        } else {
            Self::rpc(config)
        }
    }

    /// In-memory ledger with the demo WETH/WBTC market and a funded account.
    pub fn simulated(config: &ClientConfig) -> anyhow::Result<Self> {
        let ledger = Arc::new(MockLedger::demo(SIMULATED_ACCOUNT));
        let provider = Arc::new(MockSessionProvider::new(
            Arc::clone(&ledger),
            SIMULATED_CHAIN_ID,
        ));

        let mut registry = config.registry()?;
        if registry.display_set().is_empty() {
            registry = registry
                .with_token(MockLedger::demo_weth(), "WETH", 18)
                .with_token(MockLedger::demo_wbtc(), "WBTC", 8);
        }

        tracing::debug!(account = %SIMULATED_ACCOUNT, "Using simulated ledger");
        Ok(Self {
            source: LedgerSource::Simulated(ledger),
            provider,
            registry,
            expected_chain_id: SIMULATED_CHAIN_ID,
        })
    }

    pub fn rpc(config: &ClientConfig) -> anyhow::Result<Self> {
        let network = &config.network;
        let confirmation = ConfirmationPolicy {
            poll_interval: Duration::from_millis(network.confirmation_poll_ms),
            timeout: Duration::from_secs(network.confirmation_timeout_secs),
        };
        let provider = http_provider(
            &network.rpc_url,
            Duration::from_secs(network.request_timeout_secs),
            confirmation.poll_interval,
        )
        .context("JSON-RPC provider")?;
        let sessions = Arc::new(RpcSessionProvider::new(provider.clone(), config.account()?));

        Ok(Self {
            source: LedgerSource::Rpc {
                provider,
                contracts: config.contracts.clone(),
                confirmation,
            },
            provider: sessions,
            registry: config.registry()?,
            expected_chain_id: network.chain_id,
        })
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self.source, LedgerSource::Simulated(_))
    }

    /// Resolve a symbol from the registry or a raw address.
    pub fn token(&self, token: &str) -> Result<TokenId, DscError> {
        self.registry.resolve(token)
    }

    /// Connect the account. `sync_period` of `None` skips the background poll.
    pub async fn connect(&self, sync_period: Option<Duration>) -> Result<AccountSession, DscError> {
        let session = self.provider.require_session().await?;

        let ledger: Arc<dyn LedgerClient> = match &self.source {
            LedgerSource::Simulated(ledger) => Arc::clone(ledger) as Arc<dyn LedgerClient>,
            LedgerSource::Rpc {
                provider,
                contracts,
                confirmation,
            } => Arc::new(RpcLedgerClient::new(
                provider.clone(),
                session.account,
                contracts.engine()?,
                contracts.debt_token()?,
                *confirmation,
            )),
        };

        let options = SessionOptions {
            registry: self.registry.clone(),
            sync_period,
            expected_chain_id: Some(self.expected_chain_id),
        };
        AccountSession::establish(session, ledger, options).await
    }

    /// Remote-first verifier. A remote model that cannot be built degrades to the denylist.
    pub fn verifier(&self, config: &ClientConfig) -> TransactionVerifier {
        let classifier = match config.remote_model().map(OpenAiRiskModel::new) {
            Some(Ok(model)) => RiskClassifier::with_remote(Arc::new(model), config.verifier_timeout()),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Remote risk model unavailable, screening with the selector denylist only");
                RiskClassifier::offline()
            }
            None => {
                tracing::info!("No API key configured, screening with the selector denylist only");
                RiskClassifier::offline()
            }
        };
        TransactionVerifier::new(Arc::clone(&self.provider), classifier)
    }
}
