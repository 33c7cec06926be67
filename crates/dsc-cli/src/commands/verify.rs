use crate::client::Backend;
use crate::config::ClientConfig;
use crate::output::{print_report, print_warning, OutputFormat};
use dsc_verifier::RiskLevel;

/// Screen a transaction hash or raw calldata.
pub async fn execute(
    input: &str,
    backend: &Backend,
    config: &ClientConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let verifier = backend.verifier(config);
    let report = verifier.verify(input).await?;

    print_report(&report, format);
    if format == OutputFormat::Table && report.assessment.risk >= RiskLevel::High {
        print_warning("Do not sign this transaction unless you trust the contract");
    }
    Ok(())
}
