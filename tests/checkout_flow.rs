use gateway_checkout::app::config::Config;
use gateway_checkout::models::{CreateOrderRequest, MethodDetails, PaymentStatus};
use gateway_checkout::services::{
    ApiError, CheckoutOptions, HostBridge, InProcessSurface, PaymentApi, PaymentServiceClient,
    SessionOutcome, SharedPaymentApi,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    Config {
        api_base_url: format!("{}/api/v1", server.uri()),
        checkout_url: "http://checkout.test".to_string(),
        poll_interval_ms: 20,
        ..Config::default()
    }
}

fn order_json(id: &str, amount: u64) -> Value {
    json!({
        "id": id,
        "merchant_id": null,
        "amount": amount,
        "currency": "INR",
        "status": "created",
        "receipt": null,
        "notes": {},
        "created_at": "2026-10-17T09:00:00Z",
        "updated_at": "2026-10-17T09:00:00Z"
    })
}

fn payment_json(status: &str) -> Value {
    json!({
        "id": "pay_wm1",
        "order_id": "order_wm1",
        "amount": 10000,
        "currency": "INR",
        "method": "upi",
        "status": status,
        "vpa": "user@bank",
        "created_at": "2026-10-17T09:00:01Z",
        "updated_at": "2026-10-17T09:00:02Z"
    })
}

async fn mount_order_endpoints(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/orders/public"))
        .and(body_json(json!({"amount": 10000, "currency": "INR", "notes": {}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(order_json("order_wm1", 10000)))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/orders/public/order_wm1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(order_json("order_wm1", 10000)))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/payments/public"))
        .and(body_json(json!({"order_id": "order_wm1", "method": "upi", "vpa": "user@bank"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(payment_json("processing")))
        .expect(1)
        .mount(server)
        .await;
}

fn bridge_for(server: &MockServer) -> HostBridge {
    let config = config_for(server);
    let api: SharedPaymentApi = Arc::new(PaymentServiceClient::new(&config).unwrap());
    let input = MethodDetails::Upi { vpa: "user@bank".to_string() };
    let surface = Arc::new(InProcessSurface::new(api.clone(), config.poll_policy(), Some(input)));
    HostBridge::new(api, surface, &config).unwrap()
}

#[tokio::test]
async fn client_decodes_service_error_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orders/public/order_nope"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "detail": {"error": {"code": "NOT_FOUND_ERROR", "description": "Order not found"}}
        })))
        .mount(&server)
        .await;

    let client = PaymentServiceClient::new(&config_for(&server)).unwrap();
    let err = client.get_order("order_nope").await.unwrap_err();

    assert_eq!(
        err,
        ApiError::Status {
            status: 404,
            code: Some("NOT_FOUND_ERROR".to_string()),
            description: "Order not found".to_string(),
        }
    );
    assert!(err.is_not_found());
}

#[tokio::test]
async fn client_sends_notes_and_receipt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/orders/public"))
        .and(body_json(json!({
            "amount": 25000,
            "currency": "USD",
            "notes": {"sku": "tee-42"},
            "receipt": "rcpt_7"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(order_json("order_usd", 25000)))
        .expect(1)
        .mount(&server)
        .await;

    let client = PaymentServiceClient::new(&config_for(&server)).unwrap();
    let mut notes = BTreeMap::new();
    notes.insert("sku".to_string(), "tee-42".to_string());
    let order = client
        .create_order(&CreateOrderRequest {
            amount: 25000,
            currency: "USD".to_string(),
            notes,
            receipt: Some("rcpt_7".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(order.id, "order_usd");
    assert_eq!(order.amount, 25000);
}

#[tokio::test]
async fn client_rejects_unparseable_payment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/payments/public/pay_wm1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = PaymentServiceClient::new(&config_for(&server)).unwrap();
    assert!(matches!(client.get_payment("pay_wm1").await, Err(ApiError::Decode(_))));
}

#[tokio::test]
async fn successful_session_over_http() {
    let server = MockServer::start().await;
    mount_order_endpoints(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/payments/public/pay_wm1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(payment_json("processing")))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/payments/public/pay_wm1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(payment_json("success")))
        .expect(1)
        .mount(&server)
        .await;

    let bridge = bridge_for(&server);
    let received = Arc::new(Mutex::new(Vec::new()));
    let options = CheckoutOptions::new(10000).on_success({
        let received = received.clone();
        move |attempt| received.lock().push(attempt)
    });

    let handle = bridge.open(options).await.unwrap();
    assert_eq!(handle.surface_url.as_str(), "http://checkout.test/?order_id=order_wm1");

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.outcome())
        .await
        .expect("session did not settle");

    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].status(), PaymentStatus::Succeeded);
    assert!(matches!(outcome, Some(SessionOutcome::Succeeded(ref a)) if a.id() == "pay_wm1"));
    assert!(!bridge.overlay_visible());
}

#[tokio::test]
async fn minimal_payment_records_settle_as_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/orders/public"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "order_wm1", "amount": 10000})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orders/public/order_wm1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_wm1",
            "amount": 10000,
            "created_at": "2026-10-17T09:00:00.123456"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/payments/public"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "pay_1", "status": "processing"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/payments/public/pay_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "pay_1", "status": "processing"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    let settled = json!({"id": "pay_1", "status": "succeeded", "captured": true});
    Mock::given(method("GET"))
        .and(path("/api/v1/payments/public/pay_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(settled.clone()))
        .mount(&server)
        .await;

    let bridge = bridge_for(&server);
    let handle = bridge.open(CheckoutOptions::new(10000)).await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.outcome())
        .await
        .expect("session did not settle");

    match outcome {
        Some(SessionOutcome::Succeeded(attempt)) => {
            assert_eq!(serde_json::to_value(&attempt).unwrap(), settled);
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn poll_error_fails_session_without_payload() {
    let server = MockServer::start().await;
    mount_order_endpoints(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/payments/public/pay_wm1"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .expect(1)
        .mount(&server)
        .await;

    let bridge = bridge_for(&server);
    let received = Arc::new(Mutex::new(Vec::new()));
    let options = CheckoutOptions::new(10000).on_failure({
        let received = received.clone();
        move |payload| received.lock().push(payload)
    });

    let handle = bridge.open(options).await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.outcome())
        .await
        .expect("session did not settle");

    // Give a retry the chance to happen; the mock expectation catches it.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(outcome, Some(SessionOutcome::Failed(None)));
    assert_eq!(*received.lock(), vec![None]);
}
