//! Tests for the bitcoind reference chain client against a local HTTP fixture.

mod common;

use std::time::Duration;

use btc_relay_watchdog::bitcoind::BitcoindRpc;
use btc_relay_watchdog::rpc::RpcAuth;
use btc_relay_watchdog::source::{ReferenceChain, SourceError, SourceErrorKind};

use common::{dead_url, serve_once, tip_hash, TIP_HASH};

fn client(url: String) -> BitcoindRpc {
    BitcoindRpc::new(url, None, Duration::from_secs(5))
}

#[tokio::test]
async fn tip_height_reads_getblockcount() {
    let (url, request) = serve_once("200 OK", r#"{"result":850123,"error":null,"id":1}"#).await;

    let height = client(url).tip_height().await.expect("height");

    assert_eq!(height, 850_123);
    let request = request.await.expect("request captured");
    assert!(request.starts_with("POST / HTTP/1.1"));
    assert!(request.contains(r#""method":"getblockcount""#));
}

#[tokio::test]
async fn basic_auth_is_sent_when_configured() {
    let (url, request) = serve_once("200 OK", r#"{"result":1,"error":null,"id":1}"#).await;
    let rpc = BitcoindRpc::new(
        url,
        Some(RpcAuth {
            username: "user".to_owned(),
            password: "pass".to_owned(),
        }),
        Duration::from_secs(5),
    );

    rpc.tip_height().await.expect("height");

    let request = request.await.expect("request captured").to_lowercase();
    // base64("user:pass")
    assert!(request.contains("authorization: basic dxnlcjpwyxnz"));
}

#[tokio::test]
async fn confirmed_header_is_in_main_chain() {
    let body = format!(
        r#"{{"result":{{"hash":"{TIP_HASH}","confirmations":4,"height":850000}},"error":null,"id":1}}"#
    );
    let (url, request) = serve_once("200 OK", &body).await;

    let in_chain = client(url)
        .is_in_main_chain(&tip_hash())
        .await
        .expect("lookup");

    assert!(in_chain);
    let request = request.await.expect("request captured");
    assert!(request.contains(r#""method":"getblockheader""#));
    assert!(request.contains(TIP_HASH));
}

#[tokio::test]
async fn stale_header_is_not_in_main_chain() {
    let body = format!(
        r#"{{"result":{{"hash":"{TIP_HASH}","confirmations":-1,"height":850000}},"error":null,"id":1}}"#
    );
    let (url, _request) = serve_once("200 OK", &body).await;

    let in_chain = client(url)
        .is_in_main_chain(&tip_hash())
        .await
        .expect("lookup");

    assert!(!in_chain);
}

#[tokio::test]
async fn unknown_block_is_not_in_main_chain() {
    let (url, _request) = serve_once(
        "500 Internal Server Error",
        r#"{"result":null,"error":{"code":-5,"message":"Block not found"},"id":1}"#,
    )
    .await;

    let in_chain = client(url)
        .is_in_main_chain(&tip_hash())
        .await
        .expect("lookup");

    assert!(!in_chain);
}

#[tokio::test]
async fn other_rpc_errors_are_application_errors() {
    let (url, _request) = serve_once(
        "500 Internal Server Error",
        r#"{"result":null,"error":{"code":-28,"message":"Loading block index..."},"id":1}"#,
    )
    .await;

    let err = client(url)
        .is_in_main_chain(&tip_hash())
        .await
        .expect_err("rpc error");

    assert!(matches!(err, SourceError::Rpc { code: -28, .. }));
    assert_eq!(err.kind(), SourceErrorKind::Application);
}

#[tokio::test]
async fn refused_connection_is_transient() {
    let err = client(dead_url().await)
        .tip_height()
        .await
        .expect_err("nothing listening");

    assert!(err.is_transient(), "expected transient, got {err}");
}

#[tokio::test]
async fn gateway_error_is_transient() {
    let (url, _request) = serve_once("503 Service Unavailable", "<html>down</html>").await;

    let err = client(url).tip_height().await.expect_err("gateway error");

    assert!(matches!(err, SourceError::HttpStatus { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn unauthorized_is_an_application_error() {
    let (url, _request) = serve_once("401 Unauthorized", "").await;

    let err = client(url).tip_height().await.expect_err("unauthorized");

    assert!(matches!(err, SourceError::HttpStatus { status: 401, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn malformed_payload_is_an_application_error() {
    let (url, _request) = serve_once("200 OK", r#"{"result":"tall","error":null,"id":1}"#).await;

    let err = client(url).tip_height().await.expect_err("bad payload");

    assert!(matches!(err, SourceError::Decode { .. }));
    assert!(!err.is_transient());
}
