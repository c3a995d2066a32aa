//! HTTP adapter routes driven in-process through the router

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use stakehouse::{
    api::build_app,
    clock::SystemClock,
    config::{ApiConfig, MonitoringConfig},
    games::rng::ScriptedRandom,
    ledger::MemoryStore,
    Casino, StakehouseConfig,
};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    app_with(ScriptedRandom::default())
}

fn app_with(rng: ScriptedRandom) -> Router {
    let casino = Casino::new(
        &StakehouseConfig::for_testing(),
        Arc::new(MemoryStore::new()),
        Arc::new(rng),
        Arc::new(SystemClock),
    );
    build_app(Arc::new(casino), &ApiConfig::default(), &MonitoringConfig::default())
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_reports_running() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Running");
}

#[tokio::test]
async fn coin_flip_round_over_http() {
    let app = app();
    let (status, body) =
        send(&app, Method::POST, "/games/coinflip/start", Some(json!({"account": 5, "stake": 100}))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"]["status"], "active");

    let (status, body) = send(
        &app,
        Method::POST,
        "/games/coinflip/turn",
        Some(json!({"account": 5, "action": "flip", "side": "heads"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["multiplier"], 2.0);

    let (status, body) = send(&app, Method::POST, "/games/coinflip/cashout", Some(json!({"account": 5}))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["payout"], 200);
    let entry_id = body["entry_id"].as_u64().unwrap();

    let (status, body) = send(&app, Method::POST, "/games/coinflip/cashout", Some(json!({"account": 5}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STATE_CONFLICT");

    let (_, body) = send(&app, Method::GET, "/accounts/5/balance", None).await;
    assert_eq!(body["balance"], 600);

    let (status, body) = send(&app, Method::GET, &format!("/ledger/{}", entry_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount"], 200);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/admin/ledger/{}/rollback", entry_id),
        Some(json!({"admin_id": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["balance"], 400);

    let (_, body) = send(&app, Method::GET, "/accounts/5/history?reversed=true", None).await;
    assert_eq!(body["total"], 1);

    let (_, body) = send(&app, Method::GET, "/accounts/5/reconcile", None).await;
    assert_eq!(body["balance"], 400);
    assert_eq!(body["entries_effect"], -100);
}

#[tokio::test]
async fn validation_failures_are_bad_requests() {
    let app = app();
    let (status, body) =
        send(&app, Method::POST, "/games/coinflip/start", Some(json!({"account": 5, "stake": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["request_id"].is_string());

    let (status, _) = send(&app, Method::POST, "/games/crash/start", Some(json!({"account": 5, "stake": 10}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        send(&app, Method::POST, "/games/mines/start", Some(json!({"account": 5, "stake": 10}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, Method::GET, "/accounts/5/balance", None).await;
    assert_eq!(body["balance"], 500);
}

#[tokio::test]
async fn out_of_range_pages_are_bad_requests() {
    let app = app();
    let (status, body) =
        send(&app, Method::GET, "/accounts/1/history?page=18446744073709551615&page_size=100", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = send(&app, Method::GET, "/admin/adjustments?page=18446744073709551615&page_size=2", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_entry_is_not_found() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/ledger/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn reset_requires_confirmation() {
    let app = app();
    send(&app, Method::POST, "/admin/accounts/5/balance", Some(json!({"admin_id": 1, "operation": "add", "amount": 50})))
        .await;

    let (status, _) = send(&app, Method::POST, "/admin/accounts/5/reset", Some(json!({"admin_id": 1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, body) = send(&app, Method::GET, "/accounts/5/balance", None).await;
    assert_eq!(body["balance"], 550);

    let (status, body) =
        send(&app, Method::POST, "/admin/accounts/5/reset", Some(json!({"admin_id": 1, "confirm": true}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 500);
}

#[tokio::test]
async fn admin_actions_are_listed_and_reversible() {
    let app = app();
    let (status, body) = send(&app, Method::POST, "/admin/promos", Some(json!({"admin_id": 1, "code": "BONUS", "reward": 20}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let promo_log = body["adjustment_id"].as_u64().unwrap();

    let (status, _) = send(&app, Method::DELETE, "/admin/promos/BONUS?admin_id=1", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::DELETE, "/admin/promos/BONUS?admin_id=1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, Method::POST, "/admin/accounts/8/block", Some(json!({"admin_id": 1}))).await;
    let block_log = body["adjustment_id"].as_u64().unwrap();
    let (_, body) = send(&app, Method::GET, "/accounts/8/balance", None).await;
    assert_eq!(body["blocked"], true);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/admin/adjustments/{}/rollback", block_log),
        Some(json!({"admin_id": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["reversed"], true);
    let (_, body) = send(&app, Method::GET, "/accounts/8/balance", None).await;
    assert_eq!(body["blocked"], false);

    let (_, body) = send(&app, Method::GET, "/admin/adjustments?page_size=50", None).await;
    assert_eq!(body["total"], 4);
    let (_, body) = send(&app, Method::GET, "/admin/adjustments?account=8&reversed=true", None).await;
    assert_eq!(body["total"], 1);
    assert!(promo_log < block_log);
}

#[tokio::test]
async fn crash_round_over_http() {
    let app = app_with(ScriptedRandom::new([0.5]));
    let (status, body) = send(&app, Method::POST, "/crash/start", Some(json!({"account": 3, "stake": 100}))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["state"], "flying");

    let (status, body) = send(&app, Method::POST, "/crash/cashout", Some(json!({"account": 3}))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["payout"], 100);

    let (status, body) = send(&app, Method::POST, "/crash/cashout", Some(json!({"account": 4}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "This round is already over");
}

#[tokio::test]
async fn bonuses_over_http() {
    let app = app();
    let (status, body) = send(&app, Method::POST, "/bonus/hourly", Some(json!({"account": 6, "guess": 1}))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["reward"], 100);
    assert_eq!(body["balance"], 600);

    let (status, body) = send(&app, Method::POST, "/bonus/hourly", Some(json!({"account": 6, "guess": 1}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]["details"]["remaining_secs"].as_i64().unwrap() > 3500);

    let (status, _) = send(&app, Method::POST, "/bonus/hourly", Some(json!({"account": 7, "guess": 9}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::POST, "/bonus/wheel", Some(json!({"account": 6, "paid": true}))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["cost"], 100);
    assert_eq!(body["balance"], 500);

    send(
        &app,
        Method::POST,
        "/admin/promos",
        Some(json!({"admin_id": 1, "code": "HELLO", "reward": 30, "max_uses": 1})),
    )
    .await;
    let (status, body) = send(&app, Method::POST, "/promos/HELLO/redeem", Some(json!({"account": 6}))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["balance"], 530);
    let (status, body) = send(&app, Method::POST, "/promos/HELLO/redeem", Some(json!({"account": 7}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "This promo code has run out");
    let (status, _) = send(&app, Method::POST, "/promos/NOPE/redeem", Some(json!({"account": 7}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, Method::GET, "/accounts/6/history?game=promo", None).await;
    assert_eq!(body["total"], 1);
    let (_, body) = send(&app, Method::GET, "/accounts/6/reconcile", None).await;
    assert_eq!(body["balance"], 530);
}

#[tokio::test]
async fn metrics_are_exported_and_request_ids_echoed() {
    let app = app();
    send(&app, Method::GET, "/health", None).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-42");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("stakehouse_http_requests_total"));
}
