//! HTTP tests for the signature middleware and the API server.
//!
//! Each test binds a real server on an ephemeral port and speaks plain
//! HTTP/1.1 to it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{Extension, Json, Router};
use forgeauth::session::{canonical_message, personal_message_hash, SignatureVerifier, VerifierError};
use forgeauth::tick::ManualClock;
use forgeauth::{ApiServer, ApiServerBuilder, AuthConfig, AuthenticatedUser};
use k256::ecdsa::SigningKey;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
const OTHER_ADDRESS: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
const NOW: u64 = 1_700_000_000_000;
const MINUTE_MS: u64 = 60_000;

// =========================================================================
// Helpers
// =========================================================================

fn sign(message: &str) -> String {
    let key = SigningKey::from_slice(&hex::decode(DEV_KEY).unwrap()).unwrap();
    let (sig, recid) = key
        .sign_prehash_recoverable(&personal_message_hash(message))
        .unwrap();
    let mut bytes = sig.to_bytes().to_vec();
    bytes.push(recid.to_byte() + 27);
    format!("0x{}", hex::encode(bytes))
}

/// A bearer token signed by the dev key, claiming `address`.
fn token(address: &str, timestamp: u64) -> String {
    let signature = sign(&canonical_message("TokenForge", timestamp));
    format!("Bearer {address}:{signature}:{timestamp}")
}

async fn me(Extension(user): Extension<AuthenticatedUser>) -> Json<Value> {
    Json(json!({ "address": user.address, "timestamp": user.timestamp }))
}

/// Starts a server frozen at `NOW` and returns its address.
async fn start_with(builder: ApiServerBuilder) -> SocketAddr {
    let server = builder
        .bind("127.0.0.1:0")
        .clock(Arc::new(ManualClock::new(NOW)))
        .build(Router::new().route("/api/me", get(me)))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn start() -> SocketAddr {
    start_with(ApiServer::builder()).await
}

/// Sends `GET path` and returns the status code and JSON body.
async fn get_json(addr: SocketAddr, path: &str, authorization: Option<&str>) -> (u16, Value) {
    let mut request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n");
    if let Some(value) = authorization {
        request.push_str(&format!("Authorization: {value}\r\n"));
    }
    request.push_str("\r\n");

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    let status = response[9..12].parse().unwrap();
    let (_, body) = response.split_once("\r\n\r\n").unwrap();
    (status, serde_json::from_str(body).unwrap())
}

async fn call(addr: SocketAddr, authorization: Option<&str>) -> (u16, Value) {
    get_json(addr, "/api/me", authorization).await
}

fn rejected(body: &Value, message: &str) {
    assert_eq!(body, &json!({ "success": false, "error": message }));
}

// =========================================================================
// Rejections
// =========================================================================

#[tokio::test]
async fn test_missing_header_is_401() {
    let (status, body) = call(start().await, None).await;

    assert_eq!(status, 401);
    rejected(&body, "No authorization header");
}

#[tokio::test]
async fn test_non_bearer_scheme_is_401() {
    let (status, body) = call(start().await, Some("Token abc")).await;

    assert_eq!(status, 401);
    rejected(&body, "Invalid authorization format");
}

#[tokio::test]
async fn test_two_field_token_is_missing_parameters() {
    let (status, body) = call(start().await, Some("Bearer 0xabc:0xdef")).await;

    assert_eq!(status, 401);
    rejected(&body, "Missing authentication parameters");
}

#[tokio::test]
async fn test_non_numeric_timestamp_is_missing_parameters() {
    let (_, body) = call(start().await, Some("Bearer 0xabc:0xdef:soon")).await;

    rejected(&body, "Missing authentication parameters");
}

#[tokio::test]
async fn test_six_minute_old_signature_is_expired() {
    let (status, body) = call(start().await, Some(&token(DEV_ADDRESS, NOW - 6 * MINUTE_MS))).await;

    assert_eq!(status, 401);
    rejected(&body, "Signature expired");
}

#[tokio::test]
async fn test_signature_for_other_address_is_invalid() {
    let (status, body) = call(start().await, Some(&token(OTHER_ADDRESS, NOW))).await;

    assert_eq!(status, 401);
    rejected(&body, "Invalid signature");
}

#[tokio::test]
async fn test_signature_over_other_app_name_is_invalid() {
    let signature = sign(&canonical_message("SomethingElse", NOW));
    let header = format!("Bearer {DEV_ADDRESS}:{signature}:{NOW}");

    let (_, body) = call(start().await, Some(&header)).await;

    rejected(&body, "Invalid signature");
}

#[tokio::test]
async fn test_verifier_error_is_authentication_failed() {
    struct Broken;
    impl SignatureVerifier for Broken {
        fn verify(&self, _: &str, _: &str, _: &str) -> Result<bool, VerifierError> {
            Err(VerifierError("backend unreachable".into()))
        }
    }
    let addr = start_with(ApiServer::builder().verifier(Arc::new(Broken))).await;

    let (status, body) = call(addr, Some(&token(DEV_ADDRESS, NOW))).await;

    assert_eq!(status, 401);
    rejected(&body, "Authentication failed");
}

// =========================================================================
// Acceptance
// =========================================================================

#[tokio::test]
async fn test_four_minute_old_signature_is_accepted_lowercase() {
    let (status, body) = call(start().await, Some(&token(DEV_ADDRESS, NOW - 4 * MINUTE_MS))).await;

    assert_eq!(status, 200);
    assert_eq!(body["address"], DEV_ADDRESS.to_lowercase());
    assert_eq!(body["timestamp"], NOW - 4 * MINUTE_MS);
}

#[tokio::test]
async fn test_signature_exactly_at_window_is_accepted() {
    let (status, _) = call(start().await, Some(&token(DEV_ADDRESS, NOW - 5 * MINUTE_MS))).await;

    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_signature_one_ms_past_window_is_expired() {
    let (status, body) =
        call(start().await, Some(&token(DEV_ADDRESS, NOW - 5 * MINUTE_MS - 1))).await;

    assert_eq!(status, 401);
    rejected(&body, "Signature expired");
}

#[tokio::test]
async fn test_wider_window_accepts_older_signature() {
    let addr = start_with(ApiServer::builder().auth_config(AuthConfig {
        replay_window: Duration::from_secs(15 * 60),
        ..Default::default()
    }))
    .await;

    let (status, _) = call(addr, Some(&token(DEV_ADDRESS, NOW - 10 * MINUTE_MS))).await;

    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_health_needs_no_credential() {
    let (status, body) = get_json(start().await, "/health", None).await;

    assert_eq!(status, 200);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_credential_is_checked_per_request() {
    let addr = start().await;

    let (first, _) = call(addr, Some(&token(DEV_ADDRESS, NOW))).await;
    let (second, _) = call(addr, None).await;

    assert_eq!(first, 200);
    assert_eq!(second, 401);
}
