use alloy::sol_types::SolCall;
use alloy_primitives::{hex, Address, B256, U256};
use dsc_adapters::contracts::{IDSCEngine, IERC20};
use dsc_adapters::{http_provider, ConfirmationPolicy, RootProvider, RpcLedgerClient, RpcSessionProvider};
use dsc_core::{DscError, LedgerClient, SessionProvider, TokenId};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const ACCOUNT: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

fn account() -> Address {
    dsc_core::types::parse_address(ACCOUNT).unwrap()
}

fn engine() -> Address {
    Address::from([0xe0; 20])
}

fn weth() -> TokenId {
    TokenId::new(Address::from([0xa1; 20]))
}

/// JSON-RPC reply that echoes the request id.
struct Reply(Value);

impl Respond for Reply {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id = serde_json::from_slice::<Value>(&request.body)
            .ok()
            .and_then(|body| body.get("id").cloned())
            .unwrap_or(json!(0));
        let mut body = self.0.clone();
        body["jsonrpc"] = json!("2.0");
        body["id"] = id;
        ResponseTemplate::new(200).set_body_json(body)
    }
}

fn rpc_result(result: Value) -> Reply {
    Reply(json!({ "result": result }))
}

fn rpc_error(code: i64, message: &str) -> Reply {
    Reply(json!({ "error": { "code": code, "message": message } }))
}

fn receipt(tx_hash: B256, status: &str, block: &str) -> Value {
    json!({
        "type": "0x2",
        "status": status,
        "cumulativeGasUsed": "0x5208",
        "logs": [],
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "transactionHash": tx_hash.to_string(),
        "transactionIndex": "0x0",
        "blockHash": B256::from([0x99; 32]).to_string(),
        "blockNumber": block,
        "gasUsed": "0x5208",
        "effectiveGasPrice": "0x1",
        "from": ACCOUNT,
        "to": engine().to_string(),
        "contractAddress": null
    })
}

async fn on(server: &MockServer, rpc_method: &str, reply: Reply) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(reply)
        .mount(server)
        .await;
}

fn provider(server: &MockServer) -> RootProvider {
    http_provider(&server.uri(), Duration::from_secs(5), Duration::from_millis(10)).unwrap()
}

fn ledger(server: &MockServer) -> RpcLedgerClient {
    RpcLedgerClient::new(
        provider(server),
        account(),
        engine(),
        TokenId::new(Address::from([0xd5; 20])),
        ConfirmationPolicy {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(300),
        },
    )
}

#[tokio::test]
async fn session_reads_first_account_and_chain() {
    let server = MockServer::start().await;
    on(&server, "eth_accounts", rpc_result(json!([ACCOUNT]))).await;
    on(&server, "eth_chainId", rpc_result(json!("0x7a69"))).await;

    let sessions = RpcSessionProvider::new(provider(&server), None);
    let session = sessions.require_session().await.unwrap();

    assert_eq!(session.account, account());
    assert_eq!(session.chain_id, 31337);
    assert_eq!(session.network_name(), "Anvil Local");
}

#[tokio::test]
async fn no_accounts_means_no_session() {
    let server = MockServer::start().await;
    on(&server, "eth_accounts", rpc_result(json!([]))).await;

    let sessions = RpcSessionProvider::new(provider(&server), None);
    assert!(matches!(
        sessions.require_session().await,
        Err(DscError::NotConnected)
    ));
}

#[tokio::test]
async fn transaction_lookup_returns_input_or_none() {
    let server = MockServer::start().await;
    let known = B256::from([0x11; 32]);
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_getTransactionByHash",
            "params": [known.to_string()]
        })))
        .respond_with(rpc_result(json!({
            "type": "0x0",
            "hash": known.to_string(),
            "nonce": "0x0",
            "gasPrice": "0x1",
            "gas": "0x5208",
            "to": engine().to_string(),
            "value": "0x0",
            "input": "0xa9059cbb00",
            "v": "0x1b",
            "r": "0x1",
            "s": "0x1",
            "from": ACCOUNT,
            "blockHash": null,
            "blockNumber": null,
            "transactionIndex": null
        })))
        .mount(&server)
        .await;
    on(&server, "eth_getTransactionByHash", rpc_result(Value::Null)).await;

    let sessions = RpcSessionProvider::new(provider(&server), Some(account()));

    let calldata = sessions.transaction_calldata(known).await.unwrap().unwrap();
    assert_eq!(calldata, vec![0xa9, 0x05, 0x9c, 0xbb, 0x00]);
    assert!(sessions
        .transaction_calldata(B256::from([0x22; 32]))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn decodes_engine_views() {
    let server = MockServer::start().await;
    let info_call = IDSCEngine::getAccountInformationCall { user: account() }.abi_encode();
    let info_reply = IDSCEngine::getAccountInformationCall::abi_encode_returns(
        &IDSCEngine::getAccountInformationReturn {
            totalDscMinted: U256::from(100u8),
            collateralValueInUsd: U256::from(4_000u64),
        },
    );
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_call",
            "params": [{ "input": format!("0x{}", hex::encode(info_call)) }]
        })))
        .respond_with(rpc_result(json!(format!("0x{}", hex::encode(info_reply)))))
        .mount(&server)
        .await;
    on(
        &server,
        "eth_call",
        rpc_result(json!(format!("0x{}", hex::encode(U256::MAX.to_be_bytes::<32>())))),
    )
    .await;

    let ledger = ledger(&server);
    let info = ledger.account_information(account()).await.unwrap();
    assert_eq!(info.total_debt_minted, U256::from(100u8));
    assert_eq!(info.collateral_value_in_quote, U256::from(4_000u64));

    assert_eq!(ledger.health_factor(account()).await.unwrap(), U256::MAX);
}

#[tokio::test]
async fn short_view_reply_is_a_transport_error() {
    let server = MockServer::start().await;
    on(&server, "eth_call", rpc_result(json!("0x"))).await;

    let err = ledger(&server).balance_of(weth(), account()).await.unwrap_err();
    assert!(matches!(err, DscError::Transport(_)));
}

#[tokio::test]
async fn revert_during_estimation_is_rejected_without_sending() {
    let server = MockServer::start().await;
    on(
        &server,
        "eth_estimateGas",
        rpc_error(3, "execution reverted: DSCEngine__NotAllowedToken"),
    )
    .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_sendTransaction" })))
        .respond_with(rpc_result(json!(B256::ZERO.to_string())))
        .expect(0)
        .mount(&server)
        .await;

    let err = ledger(&server)
        .deposit_collateral(weth(), U256::from(1u8))
        .await
        .unwrap_err();

    match err {
        DscError::RemoteRejection { reason } => assert!(reason.contains("DSCEngine__NotAllowedToken")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn approval_sends_erc20_calldata() {
    let server = MockServer::start().await;
    let tx_hash = B256::from([0x66; 32]);
    let approve = IERC20::approveCall {
        spender: engine(),
        value: U256::MAX,
    }
    .abi_encode();
    on(&server, "eth_estimateGas", rpc_result(json!("0xb411"))).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_sendTransaction",
            "params": [{ "gas": "0xb411", "input": format!("0x{}", hex::encode(approve)) }]
        })))
        .respond_with(rpc_result(json!(tx_hash.to_string())))
        .expect(1)
        .mount(&server)
        .await;
    on(
        &server,
        "eth_getTransactionReceipt",
        rpc_result(receipt(tx_hash, "0x1", "0x7")),
    )
    .await;

    let receipt = ledger(&server)
        .approve(weth(), engine(), U256::MAX)
        .await
        .unwrap();
    assert_eq!(receipt.tx_hash, tx_hash);
}

#[tokio::test]
async fn mutation_waits_for_receipt() {
    let server = MockServer::start().await;
    let tx_hash = B256::from([0x33; 32]);
    on(&server, "eth_estimateGas", rpc_result(json!("0x5208"))).await;
    on(&server, "eth_sendTransaction", rpc_result(json!(tx_hash.to_string()))).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getTransactionReceipt" })))
        .respond_with(rpc_result(Value::Null))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    on(
        &server,
        "eth_getTransactionReceipt",
        rpc_result(receipt(tx_hash, "0x1", "0x2a")),
    )
    .await;

    let receipt = ledger(&server).mint(U256::from(5u8)).await.unwrap();

    assert_eq!(receipt.tx_hash, tx_hash);
    assert_eq!(receipt.block_number, Some(42));
}

#[tokio::test]
async fn failed_receipt_status_is_a_rejection() {
    let server = MockServer::start().await;
    let tx_hash = B256::from([0x44; 32]);
    on(&server, "eth_estimateGas", rpc_result(json!("0x5208"))).await;
    on(&server, "eth_sendTransaction", rpc_result(json!(tx_hash.to_string()))).await;
    on(
        &server,
        "eth_getTransactionReceipt",
        rpc_result(receipt(tx_hash, "0x0", "0x2b")),
    )
    .await;

    let err = ledger(&server).burn(U256::from(1u8)).await.unwrap_err();
    assert!(matches!(err, DscError::RemoteRejection { .. }));
}

#[tokio::test]
async fn unconfirmed_transaction_times_out() {
    let server = MockServer::start().await;
    on(&server, "eth_estimateGas", rpc_result(json!("0x5208"))).await;
    on(
        &server,
        "eth_sendTransaction",
        rpc_result(json!(B256::from([0x55; 32]).to_string())),
    )
    .await;
    on(&server, "eth_getTransactionReceipt", rpc_result(Value::Null)).await;

    let err = ledger(&server)
        .approve(weth(), engine(), U256::MAX)
        .await
        .unwrap_err();

    assert!(matches!(err, DscError::Transport(message) if message.contains("not confirmed")));
}

#[tokio::test]
async fn unreachable_node_is_a_transport_failure() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let provider =
        http_provider(&uri, Duration::from_millis(500), Duration::from_millis(10)).unwrap();
    let sessions = RpcSessionProvider::new(provider, None);
    let err = sessions.session().await.unwrap_err();
    assert!(matches!(err, DscError::Transport(_)));
}
