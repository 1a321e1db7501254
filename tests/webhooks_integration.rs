use actix_web::test::TestRequest;
use actix_web::{test, web, App};
use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::json;
use sqlx::Row;
use uuid::Uuid;

use drink_tracker_api::api::webhooks_paypal::paypal_webhook;

mod support;

fn unique_email(prefix: &str) -> String {
    format!("{prefix}_{}@example.com", Uuid::new_v4())
}

fn activation_payload(subscription_id: &str) -> serde_json::Value {
    json!({
        "id": "WH-ACTIVATED-1",
        "event_type": "BILLING.SUBSCRIPTION.ACTIVATED",
        "resource": {
            "id": subscription_id,
            "subscriber": { "payer_id": "PAYER123" }
        }
    })
}

macro_rules! post_webhook {
    ($app:expr, $payload:expr) => {{
        let req = TestRequest::post()
            .uri("/webhook/paypal")
            .set_json($payload)
            .to_request();
        let resp = test::call_service($app, req).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        body
    }};
}

#[actix_web::test]
async fn activation_event_upgrades_subscription() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    let user_id = support::insert_user(pool, &unique_email("activate")).await;
    let sub_id = format!("I-{}", Uuid::new_v4().simple());
    support::insert_subscription(pool, user_id, &sub_id, "pending").await;

    let state = web::Data::new(support::build_state(
        pool.clone(),
        "http://localhost:1",
        "http://localhost:1",
        None,
    ));
    let app = test::init_service(App::new().app_data(state.clone()).service(paypal_webhook)).await;

    let body = post_webhook!(&app, &activation_payload(&sub_id));
    assert_eq!(body["received"], true);

    let row = sqlx::query(
        "SELECT tier, status, paypal_payer_id, current_period_end FROM subscriptions WHERE paypal_subscription_id = $1",
    )
    .bind(&sub_id)
    .fetch_one(pool)
    .await
    .expect("select subscription");

    assert_eq!(row.get::<String, _>("tier"), "premium");
    assert_eq!(row.get::<String, _>("status"), "active");
    assert_eq!(
        row.get::<Option<String>, _>("paypal_payer_id").as_deref(),
        Some("PAYER123")
    );
    assert!(row
        .get::<Option<chrono::DateTime<chrono::Utc>>, _>("current_period_end")
        .is_some());
}

#[actix_web::test]
async fn cancellation_after_activation_ends_free_cancelled() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    let user_id = support::insert_user(pool, &unique_email("cancel")).await;
    let sub_id = format!("I-{}", Uuid::new_v4().simple());
    support::insert_subscription(pool, user_id, &sub_id, "pending").await;

    let state = web::Data::new(support::build_state(
        pool.clone(),
        "http://localhost:1",
        "http://localhost:1",
        None,
    ));
    let app = test::init_service(App::new().app_data(state.clone()).service(paypal_webhook)).await;

    let _ = post_webhook!(&app, &activation_payload(&sub_id));
    let _ = post_webhook!(
        &app,
        &json!({
            "id": "WH-CANCELLED-1",
            "event_type": "BILLING.SUBSCRIPTION.CANCELLED",
            "resource": { "id": sub_id }
        })
    );

    let row = sqlx::query(
        "SELECT tier, status, metadata FROM subscriptions WHERE paypal_subscription_id = $1",
    )
    .bind(&sub_id)
    .fetch_one(pool)
    .await
    .expect("select subscription");

    assert_eq!(row.get::<String, _>("tier"), "free");
    assert_eq!(row.get::<String, _>("status"), "cancelled");
    let metadata: serde_json::Value = row.get("metadata");
    assert!(metadata.get("cancelled_at").is_some());
}

#[actix_web::test]
async fn replayed_activation_is_idempotent() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    let user_id = support::insert_user(pool, &unique_email("replay")).await;
    let sub_id = format!("I-{}", Uuid::new_v4().simple());
    support::insert_subscription(pool, user_id, &sub_id, "pending").await;

    let state = web::Data::new(support::build_state(
        pool.clone(),
        "http://localhost:1",
        "http://localhost:1",
        None,
    ));
    let app = test::init_service(App::new().app_data(state.clone()).service(paypal_webhook)).await;

    let _ = post_webhook!(&app, &activation_payload(&sub_id));
    let _ = post_webhook!(&app, &activation_payload(&sub_id));

    let rows = sqlx::query(
        "SELECT tier, status, paypal_payer_id FROM subscriptions WHERE paypal_subscription_id = $1",
    )
    .bind(&sub_id)
    .fetch_all(pool)
    .await
    .expect("select subscriptions");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<String, _>("tier"), "premium");
    assert_eq!(rows[0].get::<String, _>("status"), "active");
    assert_eq!(
        rows[0]
            .get::<Option<String>, _>("paypal_payer_id")
            .as_deref(),
        Some("PAYER123")
    );
}

#[actix_web::test]
async fn payment_completed_records_payment_once() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    let user_id = support::insert_user(pool, &unique_email("payment")).await;
    let sub_id = format!("I-{}", Uuid::new_v4().simple());
    support::insert_subscription(pool, user_id, &sub_id, "active").await;

    let state = web::Data::new(support::build_state(
        pool.clone(),
        "http://localhost:1",
        "http://localhost:1",
        None,
    ));
    let app = test::init_service(App::new().app_data(state.clone()).service(paypal_webhook)).await;

    let tx_id = format!("TX-{}", Uuid::new_v4().simple());
    let payload = json!({
        "id": "WH-PAYMENT-1",
        "event_type": "PAYMENT.SALE.COMPLETED",
        "resource": {
            "id": tx_id,
            "billing_agreement_id": sub_id,
            "amount": { "total": "4.99", "currency": "USD" }
        }
    });

    let _ = post_webhook!(&app, &payload);
    // Provider redelivery of the same transaction must not double-count.
    let _ = post_webhook!(&app, &payload);

    let rows = sqlx::query(
        r#"SELECT user_id, amount::text AS amount, currency, status
           FROM payments WHERE provider_transaction_id = $1"#,
    )
    .bind(&tx_id)
    .fetch_all(pool)
    .await
    .expect("select payments");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<i32, _>("user_id"), user_id);
    assert_eq!(rows[0].get::<String, _>("amount"), "4.99");
    assert_eq!(rows[0].get::<String, _>("currency"), "USD");
    assert_eq!(rows[0].get::<String, _>("status"), "completed");
}

#[actix_web::test]
async fn payment_for_unknown_subscription_is_a_noop() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let state = web::Data::new(support::build_state(
        pool.clone(),
        "http://localhost:1",
        "http://localhost:1",
        None,
    ));
    let app = test::init_service(App::new().app_data(state.clone()).service(paypal_webhook)).await;

    let body = post_webhook!(
        &app,
        &json!({
            "id": "WH-PAYMENT-2",
            "event_type": "PAYMENT.SALE.COMPLETED",
            "resource": {
                "id": "TX-ORPHAN",
                "billing_agreement_id": "I-DOES-NOT-EXIST",
                "amount": { "total": "4.99", "currency": "USD" }
            }
        })
    );
    assert_eq!(body["received"], true);

    let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM payments")
        .fetch_one(pool)
        .await
        .expect("count payments")
        .get("count");
    assert_eq!(count, 0);
}

#[actix_web::test]
async fn unknown_event_type_is_acknowledged_without_changes() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    let user_id = support::insert_user(pool, &unique_email("unknown")).await;
    let sub_id = format!("I-{}", Uuid::new_v4().simple());
    support::insert_subscription(pool, user_id, &sub_id, "pending").await;

    let state = web::Data::new(support::build_state(
        pool.clone(),
        "http://localhost:1",
        "http://localhost:1",
        None,
    ));
    let app = test::init_service(App::new().app_data(state.clone()).service(paypal_webhook)).await;

    let body = post_webhook!(
        &app,
        &json!({
            "id": "WH-OTHER-1",
            "event_type": "BILLING.PLAN.UPDATED",
            "resource": { "id": sub_id }
        })
    );
    assert_eq!(body["received"], true);

    let row = sqlx::query("SELECT tier, status FROM subscriptions WHERE paypal_subscription_id = $1")
        .bind(&sub_id)
        .fetch_one(pool)
        .await
        .expect("select subscription");
    assert_eq!(row.get::<String, _>("tier"), "free");
    assert_eq!(row.get::<String, _>("status"), "pending");
}

#[actix_web::test]
async fn unverifiable_envelope_mutates_nothing_but_still_acknowledges() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/v1/oauth2/token");
        then.status(200).json_body(json!({"access_token": "tok"}));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/v1/notifications/verify-webhook-signature");
        then.status(200)
            .json_body(json!({"verification_status": "FAILURE"}));
    });

    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    let user_id = support::insert_user(pool, &unique_email("forged")).await;
    let sub_id = format!("I-{}", Uuid::new_v4().simple());
    support::insert_subscription(pool, user_id, &sub_id, "pending").await;

    let state = web::Data::new(support::build_state(
        pool.clone(),
        "http://localhost:1",
        &server.base_url(),
        Some("WH-ID-1"),
    ));
    let app = test::init_service(App::new().app_data(state.clone()).service(paypal_webhook)).await;

    let req = TestRequest::post()
        .uri("/webhook/paypal")
        .insert_header(("paypal-transmission-id", "tid-1"))
        .insert_header(("paypal-transmission-time", "2026-08-06T00:00:00Z"))
        .insert_header(("paypal-cert-url", "https://api.paypal.com/cert"))
        .insert_header(("paypal-auth-algo", "SHA256withRSA"))
        .insert_header(("paypal-transmission-sig", "sig-1"))
        .set_json(activation_payload(&sub_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["received"], true);
    assert!(body.get("error").is_some());

    let row = sqlx::query("SELECT tier, status FROM subscriptions WHERE paypal_subscription_id = $1")
        .bind(&sub_id)
        .fetch_one(pool)
        .await
        .expect("select subscription");
    assert_eq!(row.get::<String, _>("tier"), "free");
    assert_eq!(row.get::<String, _>("status"), "pending");
}

#[actix_web::test]
async fn verified_envelope_is_applied() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/v1/oauth2/token");
        then.status(200).json_body(json!({"access_token": "tok"}));
    });
    let verify_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/notifications/verify-webhook-signature")
            .json_body_partial(r#"{"webhook_id": "WH-ID-1", "transmission_id": "tid-2"}"#);
        then.status(200)
            .json_body(json!({"verification_status": "SUCCESS"}));
    });

    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    let user_id = support::insert_user(pool, &unique_email("verified")).await;
    let sub_id = format!("I-{}", Uuid::new_v4().simple());
    support::insert_subscription(pool, user_id, &sub_id, "pending").await;

    let state = web::Data::new(support::build_state(
        pool.clone(),
        "http://localhost:1",
        &server.base_url(),
        Some("WH-ID-1"),
    ));
    let app = test::init_service(App::new().app_data(state.clone()).service(paypal_webhook)).await;

    let req = TestRequest::post()
        .uri("/webhook/paypal")
        .insert_header(("paypal-transmission-id", "tid-2"))
        .insert_header(("paypal-transmission-time", "2026-08-06T00:00:00Z"))
        .insert_header(("paypal-cert-url", "https://api.paypal.com/cert"))
        .insert_header(("paypal-auth-algo", "SHA256withRSA"))
        .insert_header(("paypal-transmission-sig", "sig-2"))
        .set_json(activation_payload(&sub_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    verify_mock.assert();

    let row = sqlx::query("SELECT tier, status FROM subscriptions WHERE paypal_subscription_id = $1")
        .bind(&sub_id)
        .fetch_one(pool)
        .await
        .expect("select subscription");
    assert_eq!(row.get::<String, _>("tier"), "premium");
    assert_eq!(row.get::<String, _>("status"), "active");
}

#[actix_web::test]
async fn missing_signature_headers_are_rejected_without_changes() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    let user_id = support::insert_user(pool, &unique_email("headless")).await;
    let sub_id = format!("I-{}", Uuid::new_v4().simple());
    support::insert_subscription(pool, user_id, &sub_id, "pending").await;

    let state = web::Data::new(support::build_state(
        pool.clone(),
        "http://localhost:1",
        "http://localhost:1",
        Some("WH-ID-1"),
    ));
    let app = test::init_service(App::new().app_data(state.clone()).service(paypal_webhook)).await;

    let body = post_webhook!(&app, &activation_payload(&sub_id));
    assert_eq!(body["received"], true);
    assert_eq!(body["error"], "missing verification headers");

    let row = sqlx::query("SELECT status FROM subscriptions WHERE paypal_subscription_id = $1")
        .bind(&sub_id)
        .fetch_one(pool)
        .await
        .expect("select subscription");
    assert_eq!(row.get::<String, _>("status"), "pending");
}
