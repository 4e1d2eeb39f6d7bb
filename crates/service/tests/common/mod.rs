//! Shared fixtures for driving the HTTP router in-process
#![allow(dead_code)]

use axum::body::Body;
use axum::Router;
use http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::wallet::Wallet;
use service::database::Database;
use service::{http_server, ServiceConfig, ServiceState};

pub const JWT_SECRET: &str = "integration-test-secret";

/// Build the full router over a fresh in-memory database
pub async fn setup_app(jwt_secret: Option<&str>) -> Router {
    let config = ServiceConfig {
        jwt_secret: jwt_secret.map(str::to_string),
        ..ServiceConfig::default()
    };
    let database = Database::in_memory().await.unwrap();
    let state = ServiceState::new(database, &config);
    let http_config = http_server::Config::new(config.listen_addr, Vec::new());
    http_server::router(&http_config, state)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: http::HeaderMap,
    pub body: Value,
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

/// Run the nonce challenge for `wallet` and return its bearer token
pub async fn sign_in(app: &Router, wallet: &Wallet) -> String {
    let address = wallet.address().to_string();
    let res = send(
        app,
        Method::POST,
        "/api/v0/auth/request-nonce",
        None,
        Some(json!({ "walletAddress": address })),
    )
    .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let nonce = res.body["nonce"].as_str().unwrap().to_string();

    let signature = wallet.sign_message(&nonce).unwrap();
    let res = send(
        app,
        Method::POST,
        "/api/v0/auth/verify",
        None,
        Some(json!({ "walletAddress": address, "signature": signature })),
    )
    .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    res.body["token"].as_str().unwrap().to_string()
}

pub async fn register_patient(app: &Router, wallet: &Wallet, patient_id: &str) {
    let res = send(
        app,
        Method::POST,
        "/api/v0/patients/register",
        None,
        Some(json!({
            "walletAddress": wallet.address().to_string(),
            "patientId": patient_id,
            "name": "Test Patient",
        })),
    )
    .await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
}

pub async fn register_provider(app: &Router, wallet: &Wallet) {
    let res = send(
        app,
        Method::POST,
        "/api/v0/providers/register",
        None,
        Some(json!({
            "walletAddress": wallet.address().to_string(),
            "hospitalName": "General Hospital",
        })),
    )
    .await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
}
