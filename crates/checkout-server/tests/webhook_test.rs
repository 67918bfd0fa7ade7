mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use checkout_payments::{
    MemoryQuotaStore, Plan, WebhookVerification,
    testing::{FlakyStore, RecordingProvider, SlowStore},
};
use common::{TestApp, body_json, completed_event, sign};

#[tokio::test]
async fn test_invalid_signature_rejected_without_side_effects() {
    let app = TestApp::spawn();
    let payload = completed_event("evt_1", "Basic");
    let forged = checkout_payments::signature_header(
        &payload,
        "whsec_attacker",
        chrono::Utc::now().timestamp(),
    )
    .unwrap();

    let response = app.post_webhook(&payload, Some(&forged)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.post_webhook(&payload, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(app.store.quota("U1", "G1").await.unwrap().is_none());
    assert!(app.store.purchases("U1", "G1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stale_signature_rejected() {
    let app = TestApp::spawn();
    let payload = completed_event("evt_1", "Basic");
    let stale = checkout_payments::signature_header(
        &payload,
        common::WEBHOOK_SECRET,
        chrono::Utc::now().timestamp() - 3600,
    )
    .unwrap();

    let response = app.post_webhook(&payload, Some(&stale)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_basic_purchase_sets_quota() {
    let app = TestApp::spawn();
    let payload = completed_event("evt_1", "Basic");

    let response = app.post_webhook(&payload, Some(&sign(&payload))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let quota = app.store.quota("U1", "G1").await.unwrap().unwrap();
    assert_eq!(quota.plan, Plan::Basic);
    assert_eq!(quota.quota, 1_000_000);
    assert_eq!(quota.group_limit, 3);
}

#[tokio::test]
async fn test_expert_purchase_sets_quota() {
    let app = TestApp::spawn();
    let payload = completed_event("evt_1", "Expert");

    let response = app.post_webhook(&payload, Some(&sign(&payload))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let quota = app.store.quota("U1", "G1").await.unwrap().unwrap();
    assert_eq!(quota.quota, 4_000_000);
    assert_eq!(quota.group_limit, 10);
}

#[tokio::test]
async fn test_redelivery_grants_once() {
    let app = TestApp::spawn();
    let payload = completed_event("evt_1", "Basic");
    let signature = sign(&payload);

    for _ in 0..2 {
        let response = app.post_webhook(&payload, Some(&signature)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let purchases = app.store.purchases("U1", "G1").await.unwrap();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].event_id, "evt_1");
}

#[tokio::test]
async fn test_persistence_failure_triggers_redelivery() {
    let app = TestApp::with(
        common::signed(),
        RecordingProvider::new(),
        Arc::new(FlakyStore::new(1)),
    );
    let payload = completed_event("evt_1", "Basic");
    let signature = sign(&payload);

    let response = app.post_webhook(&payload, Some(&signature)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.store.quota("U1", "G1").await.unwrap().is_none());

    // Stripe redelivers the same event
    let response = app.post_webhook(&payload, Some(&signature)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.store.purchases("U1", "G1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_slow_store_times_out_with_server_error() {
    let app = TestApp::with_timeout(
        common::signed(),
        RecordingProvider::new(),
        Arc::new(SlowStore::new(Duration::from_millis(500))),
        Duration::from_millis(20),
    );
    let payload = completed_event("evt_1", "Basic");

    let response = app.post_webhook(&payload, Some(&sign(&payload))).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"]["code"], "TIMEOUT");
}

#[tokio::test]
async fn test_extreme_signature_timestamp_rejected() {
    let app = TestApp::spawn();
    let payload = completed_event("evt_1", "Basic");
    let signature = format!("t={},v1=00", i64::MIN);

    let response = app.post_webhook(&payload, Some(&signature)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.store.quota("U1", "G1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_plan_acknowledged_without_changes() {
    let app = TestApp::spawn();
    let payload = completed_event("evt_1", "Platinum");

    let response = app.post_webhook(&payload, Some(&sign(&payload))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.store.quota("U1", "G1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_other_event_types_acknowledged() {
    let app = TestApp::spawn();
    let payload = br#"{"id":"evt_2","type":"invoice.paid","data":{"object":{"id":"in_1"}}}"#;

    let response = app.post_webhook(payload, Some(&sign(payload))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_envelope_rejected() {
    let app = TestApp::spawn();
    let payload = br#"{"type":"checkout.session.completed"}"#;

    let response = app.post_webhook(payload, Some(&sign(payload))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unverified_mode_accepts_unsigned_body() {
    let app = TestApp::with(
        WebhookVerification::Unverified,
        RecordingProvider::new(),
        Arc::new(MemoryQuotaStore::new()),
    );
    let payload = completed_event("evt_1", "Basic");

    let response = app.post_webhook(&payload, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.store.quota("U1", "G1").await.unwrap().is_some());
}
