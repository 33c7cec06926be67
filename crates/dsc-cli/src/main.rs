//! dscctl - operate a collateralized-debt position from the terminal
//!
//! - Inspect the account's position and health factor
//! - Deposit, mint, redeem, burn and liquidate through the approve-then-act flow
//! - Screen a transaction hash or calldata before signing

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod client;
mod commands;
mod config;
mod output;

use client::Backend;
use commands::operate::{self, OperateCommands};
use commands::{status, verify};
use crate::config::{CliOverrides, ClientConfig};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "dscctl")]
#[command(about = "Collateralized-debt position client", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DSC_CONFIG")]
    config: Option<String>,

    /// Run against an in-memory ledger with a funded demo account
    #[arg(long)]
    simulate: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// JSON-RPC endpoint, overrides network.rpc_url
    #[arg(long)]
    rpc_url: Option<String>,

    /// Sending account, overrides network.account
    #[arg(long)]
    account: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current position
    Status,

    /// Keep the position refreshed until Ctrl-C
    Watch {
        /// Refresh period in seconds, overrides sync.period_secs
        #[arg(long)]
        period: Option<u64>,
    },

    #[command(flatten)]
    Operate(OperateCommands),

    /// Screen a transaction hash or calldata for risky calls
    Verify {
        /// 0x-prefixed transaction hash, or hex calldata
        input: String,
    },

    /// Show the effective configuration
    Config,
}

fn init_tracing(config: &ClientConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = CliOverrides {
        rpc_url: cli.rpc_url,
        account: cli.account,
        log_level: cli.verbose.then(|| "debug".to_string()),
    };
    let config = ClientConfig::load(cli.config.as_deref(), &overrides)?;
    init_tracing(&config);

    let backend = Backend::from_config(&config, cli.simulate)?;
    if backend.is_simulated() {
        tracing::info!("Simulation mode: nothing is sent to a network");
    }

    match cli.command {
        Commands::Status => status::status(&backend, cli.output).await,
        Commands::Watch { period } => {
            let period = period
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| config.sync_period());
            status::watch(&backend, period, cli.output).await
        }
        Commands::Operate(command) => operate::execute(command, &backend, cli.output).await,
        Commands::Verify { input } => verify::execute(&input, &backend, &config, cli.output).await,
        Commands::Config => {
            let mut shown = config.clone();
            if shown.verifier.api_key.is_some() {
                shown.verifier.api_key = Some("<redacted>".to_string());
            }
            output::print_json(&shown);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
