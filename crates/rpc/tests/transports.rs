use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use intentdesk_core::domain::intent::{Commitment, PublishIntent};
use intentdesk_core::domain::request::QuoteRequest;
use intentdesk_core::errors::IntentError;
use intentdesk_core::network::{FailureKind, FunctionCall, SettlementNetwork};
use intentdesk_core::negotiation::SolverBus;
use intentdesk_core::signer::KeyMaterial;
use intentdesk_core::MinorUnits;
use intentdesk_rpc::{NearRpcClient, SolverBusClient};
use serde_json::{json, Value};

type Recorded = Arc<Mutex<Vec<Value>>>;

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{address}/rpc")
}

fn recorded(requests: &Recorded) -> Vec<Value> {
    requests.lock().expect("lock").clone()
}

fn quote_request() -> QuoteRequest {
    QuoteRequest {
        defuse_asset_identifier_in: "near".to_string(),
        defuse_asset_identifier_out: "nep141:zec.omft.near".to_string(),
        exact_amount_in: MinorUnits(500_000_000_000_000_000_000_000),
        min_deadline_ms: 60_000,
        exact_amount_out: None,
    }
}

async fn solver_bus(State(requests): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    requests.lock().expect("lock").push(body.clone());
    match body["method"].as_str() {
        Some("quote") => Json(json!({
            "id": "dontcare",
            "jsonrpc": "2.0",
            "result": [
                {"quote_hash": "a", "amount_out": "100", "expiration_time": "2026-10-18T12:00:00Z"},
                {"quote_hash": "b", "amount_out": "250", "defuse_asset_identifier_in": "near"}
            ]
        })),
        Some("publish_intent") => Json(json!({
            "id": "dontcare",
            "jsonrpc": "2.0",
            "result": {"status": "OK", "intent_hash": "h1"}
        })),
        _ => Json(json!({
            "id": "dontcare",
            "jsonrpc": "2.0",
            "error": {"code": -32601, "message": "method not found"}
        })),
    }
}

#[tokio::test]
async fn quote_sends_envelope_and_parses_options() {
    let requests = Recorded::default();
    let url = spawn(Router::new().route("/rpc", post(solver_bus)).with_state(requests.clone())).await;
    let client = SolverBusClient::new(url, Duration::from_secs(5)).expect("client");

    let options = client.quote(&quote_request()).await.expect("quote");

    assert_eq!(options.len(), 2);
    assert_eq!(options[1].quote_hash, "b");
    assert_eq!(options[1].extra["defuse_asset_identifier_in"], "near");
    let sent = recorded(&requests);
    assert_eq!(sent[0]["id"], "dontcare");
    assert_eq!(sent[0]["jsonrpc"], "2.0");
    assert_eq!(sent[0]["method"], "quote");
    assert_eq!(sent[0]["params"][0]["exact_amount_in"], "500000000000000000000000");
    assert!(sent[0]["params"][0].get("exact_amount_out").is_none());
}

#[tokio::test]
async fn publish_returns_the_whole_bus_reply() {
    let requests = Recorded::default();
    let url = spawn(Router::new().route("/rpc", post(solver_bus)).with_state(requests.clone())).await;
    let client = SolverBusClient::new(url, Duration::from_secs(5)).expect("client");
    let intent = PublishIntent {
        signed_data: Commitment {
            standard: "raw_ed25519".to_string(),
            payload: "{}".to_string(),
            signature: "ed25519:sig".to_string(),
            public_key: "ed25519:pk".to_string(),
        },
        quote_hashes: vec!["b".to_string()],
    };

    let response = client.publish_intent(&intent).await.expect("publish");

    assert_eq!(response["result"], json!({"status": "OK", "intent_hash": "h1"}));
    assert_eq!(response["id"], "dontcare");
    let sent = recorded(&requests);
    assert_eq!(sent[0]["method"], "publish_intent");
    assert_eq!(sent[0]["params"][0]["quote_hashes"], json!(["b"]));
    assert_eq!(sent[0]["params"][0]["signed_data"]["standard"], "raw_ed25519");
}

fn signed_intent() -> PublishIntent {
    PublishIntent {
        signed_data: Commitment {
            standard: "raw_ed25519".to_string(),
            payload: "{}".to_string(),
            signature: "ed25519:sig".to_string(),
            public_key: "ed25519:pk".to_string(),
        },
        quote_hashes: vec!["stale".to_string()],
    }
}

#[tokio::test]
async fn publish_refusal_is_returned_not_raised() {
    let url = spawn(Router::new().route(
        "/rpc",
        post(|| async {
            Json(json!({
                "id": "dontcare",
                "jsonrpc": "2.0",
                "error": {"code": -32000, "message": "quote expired", "data": {"quote_hash": "stale"}}
            }))
        }),
    ))
    .await;
    let client = SolverBusClient::new(url, Duration::from_secs(5)).expect("client");

    let response = client.publish_intent(&signed_intent()).await.expect("bus answered");

    assert_eq!(response["error"]["message"], "quote expired");
    assert_eq!(response["error"]["data"]["quote_hash"], "stale");
    assert!(response.get("result").is_none());
}

#[tokio::test]
async fn publish_against_unreachable_bus_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr");
    drop(listener);
    let client =
        SolverBusClient::new(format!("http://{address}/rpc"), Duration::from_secs(2)).expect("client");

    let error = client.publish_intent(&signed_intent()).await.expect_err("connection refused");
    assert!(matches!(error, IntentError::TransportError(_)), "got {error:?}");
}

#[tokio::test]
async fn malformed_options_are_skipped_not_fatal() {
    let url = spawn(Router::new().route(
        "/rpc",
        post(|| async {
            Json(json!({
                "id": "dontcare",
                "jsonrpc": "2.0",
                "result": [
                    {"quote_hash": "numeric", "amount_out": 400},
                    {"amount_out": "900"},
                    {"quote_hash": "broken", "amount_out": {"value": "1"}},
                    {"quote_hash": "text", "amount_out": "300"}
                ]
            }))
        }),
    ))
    .await;
    let client = SolverBusClient::new(url, Duration::from_secs(5)).expect("client");

    let options = client.quote(&quote_request()).await.expect("quote");

    let hashes: Vec<&str> = options.iter().map(|option| option.quote_hash.as_str()).collect();
    assert_eq!(hashes, vec!["numeric", "text"]);
    assert_eq!(options[0].amount_out, "400");
}

#[tokio::test]
async fn missing_result_means_no_market() {
    let url = spawn(Router::new().route(
        "/rpc",
        post(|| async { Json(json!({"id": "dontcare", "jsonrpc": "2.0", "result": null})) }),
    ))
    .await;
    let client = SolverBusClient::new(url, Duration::from_secs(5)).expect("client");

    assert!(client.quote(&quote_request()).await.expect("quote").is_empty());
}

#[tokio::test]
async fn slow_service_surfaces_timeout() {
    let url = spawn(Router::new().route(
        "/rpc",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({"id": "dontcare", "jsonrpc": "2.0", "result": []}))
        }),
    ))
    .await;
    let client = SolverBusClient::new(url, Duration::from_secs(1)).expect("client");

    let error = client.quote(&quote_request()).await.expect_err("times out");
    assert!(matches!(error, IntentError::Timeout(_)), "got {error:?}");
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr");
    drop(listener);
    let client =
        SolverBusClient::new(format!("http://{address}/rpc"), Duration::from_secs(2)).expect("client");

    let error = client.quote(&quote_request()).await.expect_err("connection refused");
    assert!(matches!(error, IntentError::TransportError(_)), "got {error:?}");
}

async fn near_node(State(requests): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    requests.lock().expect("lock").push(body.clone());
    let params = &body["params"];
    let result = match (body["method"].as_str(), params["request_type"].as_str()) {
        (Some("query"), Some("view_account")) => json!({
            "amount": "2500000000000000000000000",
            "locked": "0",
            "storage_usage": 182,
            "code_hash": "11111111111111111111111111111111",
            "block_height": 1
        }),
        (Some("query"), Some("call_function")) => {
            let bytes: Vec<u8> = br#""1500000""#.to_vec();
            json!({"result": bytes, "logs": [], "block_height": 1})
        }
        (Some("query"), Some("view_access_key")) => json!({
            "nonce": 41,
            "permission": "FullAccess",
            "block_hash": bs58::encode([5u8; 32]).into_string(),
            "block_height": 1
        }),
        (Some("broadcast_tx_commit"), _) => {
            let signed = STANDARD.decode(params[0].as_str().unwrap_or_default()).unwrap_or_default();
            let status = if signed.windows(b"fail_me".len()).any(|window| window == b"fail_me") {
                json!({"Failure": {"ActionError": {"index": 0, "kind": "MethodNotFound"}}})
            } else {
                json!({"SuccessValue": ""})
            };
            json!({"status": status, "transaction": {"hash": "4xTx"}})
        }
        _ => {
            return Json(json!({
                "id": "dontcare",
                "jsonrpc": "2.0",
                "error": {
                    "code": -32000,
                    "message": "Server error",
                    "cause": {"name": "UNKNOWN_REQUEST"},
                    "data": "unsupported"
                }
            }))
        }
    };
    Json(json!({"id": "dontcare", "jsonrpc": "2.0", "result": result}))
}

async fn near_client(requests: &Recorded) -> NearRpcClient {
    let url = spawn(Router::new().route("/rpc", post(near_node)).with_state(requests.clone())).await;
    let key = Arc::new(KeyMaterial::from_seed("alice.near", [1; 32]));
    NearRpcClient::new(url, Duration::from_secs(5), key).expect("client")
}

#[tokio::test]
async fn view_account_reads_exact_balance() {
    let requests = Recorded::default();
    let client = near_client(&requests).await;

    let view = client.view_account("alice.near").await.expect("account");

    assert_eq!(view.amount, MinorUnits(2_500_000_000_000_000_000_000_000));
    assert_eq!(view.storage_usage, 182);
    assert_eq!(recorded(&requests)[0]["params"]["finality"], "final");
}

#[tokio::test]
async fn view_function_encodes_args_and_decodes_result() {
    let requests = Recorded::default();
    let client = near_client(&requests).await;
    let args = json!({"account_id": "alice.near"});

    let value = client.view_function("usdc.near", "ft_balance_of", &args).await.expect("view");

    assert_eq!(value, json!("1500000"));
    let sent = recorded(&requests);
    assert_eq!(sent[0]["params"]["method_name"], "ft_balance_of");
    assert_eq!(sent[0]["params"]["args_base64"], STANDARD.encode(args.to_string()));
}

#[tokio::test]
async fn function_call_signs_with_next_nonce_and_commits() {
    let requests = Recorded::default();
    let client = near_client(&requests).await;

    let outcome = client
        .function_call(
            FunctionCall::new("intents.near", "add_public_key", json!({"public_key": "ed25519:x"}))
                .with_deposit(MinorUnits(1)),
        )
        .await
        .expect("committed");

    assert_eq!(outcome.transaction_hash, "4xTx");
    assert_eq!(outcome.value, None);
    let sent = recorded(&requests);
    assert_eq!(sent[0]["params"]["request_type"], "view_access_key");
    assert_eq!(sent[1]["method"], "broadcast_tx_commit");
    let envelope = STANDARD.decode(sent[1]["params"][0].as_str().expect("base64")).expect("decode");
    let nonce_offset = 4 + "alice.near".len() + 1 + 32;
    assert_eq!(&envelope[nonce_offset..nonce_offset + 8], &42u64.to_le_bytes());
}

#[tokio::test]
async fn failed_execution_is_rejected() {
    let requests = Recorded::default();
    let client = near_client(&requests).await;

    let failure = client
        .function_call(FunctionCall::new("intents.near", "fail_me", json!({})))
        .await
        .expect_err("execution failure");

    assert_eq!(failure.kind, FailureKind::Rejected);
    assert!(failure.message.contains("4xTx"));
}

#[tokio::test]
async fn node_errors_are_rejections() {
    let url = spawn(Router::new().route(
        "/rpc",
        post(|| async {
            Json(json!({
                "id": "dontcare",
                "jsonrpc": "2.0",
                "error": {
                    "code": -32000,
                    "message": "Server error",
                    "cause": {"name": "UNKNOWN_ACCOUNT"},
                    "data": "account ghost.near does not exist"
                }
            }))
        }),
    ))
    .await;
    let key = Arc::new(KeyMaterial::from_seed("ghost.near", [2; 32]));
    let client = NearRpcClient::new(url, Duration::from_secs(5), key).expect("client");

    let failure = client.view_account("ghost.near").await.expect_err("unknown account");
    assert_eq!(failure.kind, FailureKind::Rejected);
    assert!(failure.message.contains("UNKNOWN_ACCOUNT"));
}
