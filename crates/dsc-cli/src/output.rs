//! Output formatting utilities

use colored::*;
use dsc_core::{
    format_health_factor, format_units, format_usd, short_address, AccountSnapshot, HealthStatus,
    OperationOutcome, Session, TokenRegistry, DEBT_TOKEN_DECIMALS,
};
use dsc_verifier::{RiskLevel, VerificationReport};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table format
    #[default]
    #[value(alias = "text")]
    Table,
    /// JSON format
    Json,
}

/// Table row for one token balance
#[derive(Debug, Serialize, Tabled)]
pub struct TokenLine {
    /// Token address
    #[tabled(rename = "Address", display_with = "display_address")]
    pub token: String,
    /// Registry symbol, when known
    #[tabled(rename = "Token", display_with = "display_symbol")]
    pub symbol: Option<String>,
    /// Amount scaled by the token's decimals
    #[tabled(rename = "Amount")]
    pub amount: String,
}

fn display_address(token: &str) -> String {
    short_address_str(token)
}

fn display_symbol(symbol: &Option<String>) -> String {
    symbol.clone().unwrap_or_else(|| "?".to_string())
}

/// Display-ready view of a snapshot. Numbers are already scaled and formatted.
#[derive(Debug, Serialize)]
pub struct PositionView {
    pub account: String,
    pub network: String,
    pub pass: u64,
    pub health_factor: String,
    pub status: String,
    pub debt_minted: String,
    pub collateral_value: String,
    pub debt_token_balance: String,
    pub collateral: Vec<TokenLine>,
    pub wallet: Vec<TokenLine>,
}

impl PositionView {
    pub fn new(session: &Session, snapshot: &AccountSnapshot, registry: &TokenRegistry) -> Self {
        let position = &snapshot.position;
        let line = |token: &dsc_core::TokenId, amount| TokenLine {
            token: token.to_string(),
            symbol: registry.symbol(token).map(str::to_string),
            amount: format_units(amount, registry.decimals(token)),
        };

        Self {
            account: snapshot.account.to_string(),
            network: session.network_name(),
            pass: snapshot.pass,
            health_factor: format_health_factor(&position.health_factor),
            status: position.health_factor.status().label().to_string(),
            debt_minted: format_units(position.total_debt_minted, DEBT_TOKEN_DECIMALS),
            collateral_value: format_usd(position.collateral_value_in_quote),
            debt_token_balance: format_units(snapshot.debt_token_balance, DEBT_TOKEN_DECIMALS),
            collateral: snapshot
                .collateral_tokens
                .iter()
                .map(|token| line(token, position.collateral_balance(token)))
                .collect(),
            wallet: snapshot
                .wallet_balances
                .iter()
                .map(|(token, amount)| line(token, *amount))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OutcomeView {
    pub id: String,
    pub kind: String,
    pub approval_tx: Option<String>,
    pub tx: String,
    pub block: Option<u64>,
    pub position: PositionView,
}

impl OutcomeView {
    pub fn new(session: &Session, outcome: &OperationOutcome, registry: &TokenRegistry) -> Self {
        Self {
            id: outcome.id.to_string(),
            kind: outcome.kind.to_string(),
            approval_tx: outcome.approval.as_ref().map(|r| r.tx_hash.to_string()),
            tx: outcome.action.tx_hash.to_string(),
            block: outcome.action.block_number,
            position: PositionView::new(session, &outcome.snapshot, registry),
        }
    }
}

fn status_colored(view: &PositionView, status: HealthStatus) -> ColoredString {
    let text = format!("{} ({})", view.health_factor, view.status);
    match status {
        HealthStatus::NoDebt | HealthStatus::Healthy => text.green(),
        HealthStatus::AtRisk => text.yellow(),
        HealthStatus::Liquidatable => text.red().bold(),
    }
}

fn print_tokens(title: &str, lines: &[TokenLine]) {
    println!("{}", title.bold());
    if lines.is_empty() {
        println!("  {}", "none".dimmed());
    } else {
        println!("{}", Table::new(lines).with(Style::rounded()));
    }
}

fn short_address_str(raw: &str) -> String {
    match dsc_core::types::parse_address(raw) {
        Ok(address) => short_address(&address),
        Err(_) => raw.to_string(),
    }
}

pub fn print_position(view: &PositionView, status: HealthStatus, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(view),
        OutputFormat::Table => {
            println!(
                "{} {} on {} (pass {})",
                "Account".bold(),
                short_address_str(&view.account),
                view.network,
                view.pass
            );
            println!("  Health factor     {}", status_colored(view, status));
            println!("  Debt minted       {} DSC", view.debt_minted);
            println!("  Collateral value  {}", view.collateral_value);
            println!("  DSC in wallet     {}", view.debt_token_balance);
            print_tokens("Deposited collateral", &view.collateral);
            print_tokens("Wallet", &view.wallet);
        }
    }
}

pub fn print_outcome(view: &OutcomeView, status: HealthStatus, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(view),
        OutputFormat::Table => {
            if let Some(approval) = &view.approval_tx {
                print_success(&format!("Approval mined: {approval}"));
            }
            let block = view
                .block
                .map(|b| format!(" in block {b}"))
                .unwrap_or_default();
            print_success(&format!("{} settled: {}{}", view.kind, view.tx, block));
            print_position(&view.position, status, format);
        }
    }
}

pub fn print_report(report: &VerificationReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let risk = match report.assessment.risk {
                RiskLevel::Low => "LOW".green(),
                RiskLevel::Medium => "MEDIUM".yellow(),
                RiskLevel::High => "HIGH".red().bold(),
                RiskLevel::Critical => "CRITICAL".white().on_red().bold(),
            };
            println!("{} {}", "Selector".bold(), report.selector);
            if let Some(signature) = report.signature {
                println!("  Function        {signature}");
            }
            println!("  Risk            {risk}");
            println!(
                "  Safe            {}",
                if report.assessment.safe { "yes" } else { "no" }
            );
            println!("  Verdict from    {:?}", report.source);
            println!("  {}", report.assessment.explanation);
            print_info(&report.assessment.recommendation);
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{json}"),
        Err(e) => print_error(&format!("failed to render JSON: {e}")),
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}
