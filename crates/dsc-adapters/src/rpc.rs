//! HTTP provider construction and node error mapping.

use alloy::providers::{PendingTransactionError, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::transports::http::{reqwest, Http};
use alloy::transports::TransportError;
use dsc_core::DscError;
use std::time::Duration;

/// JSON-RPC error code nodes use for a reverted call.
const EXECUTION_REVERTED: i64 = 3;

/// Provider over HTTP with a per-request timeout. `poll_interval` paces receipt polling.
pub fn http_provider(
    url: &str,
    request_timeout: Duration,
    poll_interval: Duration,
) -> Result<RootProvider, DscError> {
    let url: reqwest::Url = url
        .parse()
        .map_err(|e| DscError::InputValidation(format!("invalid RPC URL '{url}': {e}")))?;
    let client = reqwest::Client::builder()
        .timeout(request_timeout)
        .build()
        .map_err(|e| DscError::Transport(format!("failed to build HTTP client: {e}")))?;

    let transport = Http::with_client(client, url);
    let is_local = transport.guess_local();
    let rpc = RpcClient::new(transport, is_local).with_poll_interval(poll_interval);
    Ok(RootProvider::new(rpc))
}

/// Whether the node refused the call because contract execution reverted.
pub fn is_revert(err: &TransportError) -> bool {
    err.as_error_resp()
        .is_some_and(|payload| payload.code == EXECUTION_REVERTED || payload.message.contains("revert"))
}

/// Reverts become rejections; everything else is a transport failure.
pub fn rpc_error(err: TransportError) -> DscError {
    match err.as_error_resp() {
        Some(payload) if is_revert(&err) => DscError::rejected(payload.message.to_string()),
        _ => DscError::Transport(err.to_string()),
    }
}

pub fn pending_error(err: PendingTransactionError) -> DscError {
    match err {
        PendingTransactionError::TransportError(err) => rpc_error(err),
        other => DscError::Transport(other.to_string()),
    }
}
