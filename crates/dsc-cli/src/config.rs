//! Configuration for dscctl

use alloy_primitives::Address;
use dsc_core::types::parse_address;
use dsc_core::{DscError, TokenId, TokenInfo, TokenRegistry, DEFAULT_TOKEN_DECIMALS};
use dsc_verifier::remote::{DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use dsc_verifier::RemoteModelConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Node connection
    #[serde(default)]
    pub network: NetworkConfig,

    /// Deployed contract addresses
    #[serde(default)]
    pub contracts: ContractsConfig,

    /// Statically known tokens shown in wallet balances
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,

    /// Account synchronization
    #[serde(default)]
    pub sync: SyncConfig,

    /// Transaction risk screening
    #[serde(default)]
    pub verifier: VerifierConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Chain the client expects to be connected to
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Sending account; the node's first unlocked account when unset
    #[serde(default)]
    pub account: Option<String>,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Receipt polling interval in milliseconds
    #[serde(default = "default_confirmation_poll")]
    pub confirmation_poll_ms: u64,

    /// Give up waiting for a receipt after this many seconds
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: default_chain_id(),
            account: None,
            request_timeout_secs: default_request_timeout(),
            confirmation_poll_ms: default_confirmation_poll(),
            confirmation_timeout_secs: default_confirmation_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// Position engine
    #[serde(default)]
    pub engine: Option<String>,

    /// Debt token (DSC)
    #[serde(default)]
    pub debt_token: Option<String>,
}

impl ContractsConfig {
    pub fn engine(&self) -> Result<Address, DscError> {
        required_address("contracts.engine", self.engine.as_deref())
    }

    pub fn debt_token(&self) -> Result<TokenId, DscError> {
        required_address("contracts.debt_token", self.debt_token.as_deref()).map(TokenId::new)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub address: String,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Background refresh period in seconds
    #[serde(default = "default_sync_period")]
    pub period_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            period_secs: default_sync_period(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Chat-completions endpoint
    #[serde(default = "default_verifier_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_verifier_model")]
    pub model: String,

    /// Inline API key; takes precedence over `api_key_env`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Remote verdict deadline in seconds before falling back to the denylist
    #[serde(default = "default_verifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_verifier_endpoint(),
            model: default_verifier_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            timeout_secs: default_verifier_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_chain_id() -> u64 {
    31337
}

fn default_request_timeout() -> u64 {
    30
}

fn default_confirmation_poll() -> u64 {
    1000
}

fn default_confirmation_timeout() -> u64 {
    120
}

fn default_decimals() -> u8 {
    DEFAULT_TOKEN_DECIMALS
}

fn default_sync_period() -> u64 {
    10
}

fn default_verifier_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_verifier_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_verifier_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Values given on the command line; these win over every other source.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub rpc_url: Option<String>,
    pub account: Option<String>,
    pub log_level: Option<String>,
}

impl ClientConfig {
    /// Defaults, then the optional file, then `DSC_` environment variables, then CLI flags.
    pub fn load(path: Option<&str>, overrides: &CliOverrides) -> Result<Self, config::ConfigError> {
        let file = path.map(|path| config::File::with_name(path).required(true));
        Self::assemble(file, overrides)
    }

    fn assemble<S>(file: Option<S>, overrides: &CliOverrides) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&ClientConfig::default())?);

        if let Some(file) = file {
            builder = builder.add_source(file);
        }

        // DSC_NETWORK__RPC_URL, DSC_SYNC__PERIOD_SECS, ...
        builder = builder.add_source(
            config::Environment::with_prefix("DSC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .set_override_option("network.rpc_url", overrides.rpc_url.clone())?
            .set_override_option("network.account", overrides.account.clone())?
            .set_override_option("logging.level", overrides.log_level.clone())?
            .build()?
            .try_deserialize()
    }

    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync.period_secs)
    }

    pub fn account(&self) -> Result<Option<Address>, DscError> {
        self.network
            .account
            .as_deref()
            .map(parse_address)
            .transpose()
    }

    /// Registry built from the `tokens` section.
    pub fn registry(&self) -> Result<TokenRegistry, DscError> {
        let mut registry = TokenRegistry::new();
        for token in &self.tokens {
            registry.register(
                token.address.parse()?,
                TokenInfo {
                    symbol: token.symbol.clone(),
                    decimals: token.decimals,
                },
            );
        }
        Ok(registry)
    }

    /// Remote model settings, or `None` when no API key is available.
    pub fn remote_model(&self) -> Option<RemoteModelConfig> {
        let api_key = self
            .verifier
            .api_key
            .clone()
            .or_else(|| std::env::var(&self.verifier.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())?;

        let mut remote = RemoteModelConfig::new(api_key);
        remote.endpoint = self.verifier.endpoint.clone();
        remote.model = self.verifier.model.clone();
        remote.temperature = self.verifier.temperature;
        remote.request_timeout = self.verifier_timeout();
        Some(remote)
    }

    pub fn verifier_timeout(&self) -> Duration {
        Duration::from_secs(self.verifier.timeout_secs)
    }
}

fn required_address(key: &str, value: Option<&str>) -> Result<Address, DscError> {
    match value {
        Some(raw) => parse_address(raw),
        None => Err(DscError::InputValidation(format!("{key} is not configured"))),
    }
}
