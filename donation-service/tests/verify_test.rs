mod common;

use common::TestApp;
use donation_service::models::{DonationTotal, InvoiceRecord, Transaction};
use mongodb::bson::doc;
use serde_json::json;

fn tamper(signature: &str) -> String {
    let mut chars: Vec<char> = signature.chars().collect();
    let last = chars.len() - 1;
    chars[last] = if chars[last] == '0' { '1' } else { '0' };
    chars.into_iter().collect()
}

#[tokio::test]
async fn missing_parameters_produce_failed_record() {
    let app = TestApp::spawn().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/verify-public-order", app.address))
        .json(&json!({}))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.expect("Invalid response body");
    assert_eq!(body["success"], json!(false));
    assert!(!body["error"].as_str().unwrap_or_default().is_empty());

    let transactions = app.db.collection::<Transaction>("transactions");
    assert_eq!(
        transactions.count_documents(None, None).await.unwrap(),
        1,
        "exactly one ledger record per attempt"
    );
    let failed = transactions
        .find_one(doc! { "status": "FAILED" }, None)
        .await
        .unwrap()
        .expect("failed record missing");
    assert!(!failed.failure_reason.unwrap_or_default().is_empty());

    app.cleanup().await;
}

#[tokio::test]
async fn tampered_signature_is_rejected_without_gateway_fetch() {
    let app = TestApp::spawn().await;
    let client = reqwest::Client::new();

    let signature = TestApp::signature_for("order_1", "pay_1");

    let response = client
        .post(format!("{}/verify-public-order", app.address))
        .json(&json!({
            "razorpay_order_id": "order_1",
            "razorpay_payment_id": "pay_1",
            "razorpay_signature": tamper(&signature),
            "name": "Asha",
            "email": "asha@example.com",
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.expect("Invalid response body");
    assert_eq!(body["success"], json!(false));

    // The gateway must never be consulted for a forged signature.
    assert!(app
        .razorpay_server
        .received_requests()
        .await
        .unwrap()
        .is_empty());

    let transactions = app.db.collection::<Transaction>("transactions");
    assert_eq!(transactions.count_documents(None, None).await.unwrap(), 1);
    let failed = transactions
        .find_one(doc! { "status": "FAILED" }, None)
        .await
        .unwrap()
        .expect("failed record missing");
    assert!(!failed.failure_reason.unwrap_or_default().is_empty());

    app.cleanup().await;
}

#[tokio::test]
async fn public_donation_happy_path() {
    let app = TestApp::spawn().await;
    let client = reqwest::Client::new();

    app.mock_payment_fetch("pay_1", 50_000, None).await;
    app.mock_invoicing().await;

    let response = client
        .post(format!("{}/verify-public-order", app.address))
        .json(&json!({
            "razorpay_order_id": "order_1",
            "razorpay_payment_id": "pay_1",
            "razorpay_signature": TestApp::signature_for("order_1", "pay_1"),
            "name": "Asha",
            "email": "asha@example.com",
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Invalid response body");
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["amount"], json!(500.0));
    assert_eq!(body["data"]["currency"], json!("INR"));
    assert_eq!(body["data"]["invoice_id"], json!("inv_1"));

    let transactions = app.db.collection::<Transaction>("transactions");
    let recorded = transactions
        .find_one(doc! { "status": "SUCCESS" }, None)
        .await
        .unwrap()
        .expect("success record missing");
    assert_eq!(recorded.amount, Some(500.0));
    assert_eq!(recorded.payer_email.as_deref(), Some("asha@example.com"));
    assert_eq!(recorded.captured, Some(true));
    assert_eq!(recorded.invoice_id.as_deref(), Some("inv_1"));
    assert_eq!(
        recorded.notes.get("campaign").map(String::as_str),
        Some("annual")
    );

    let total = app
        .db
        .collection::<DonationTotal>("donation_totals")
        .find_one(None, None)
        .await
        .unwrap()
        .expect("running total missing");
    assert_eq!(total.total_amount, 500.0);

    let invoices = app.db.collection::<InvoiceRecord>("invoice_records");
    assert_eq!(invoices.count_documents(None, None).await.unwrap(), 1);

    app.cleanup().await;
}

#[tokio::test]
async fn invoicing_outage_yields_degraded_success() {
    let app = TestApp::spawn().await;
    let client = reqwest::Client::new();

    app.mock_payment_fetch("pay_2", 25_000, None).await;
    // No Zoho stubs mounted: every invoicing call fails.

    let response = client
        .post(format!("{}/verify-public-order", app.address))
        .json(&json!({
            "razorpay_order_id": "order_2",
            "razorpay_payment_id": "pay_2",
            "razorpay_signature": TestApp::signature_for("order_2", "pay_2"),
            "name": "Ravi",
            "email": "ravi@example.com",
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Invalid response body");
    assert_eq!(body["success"], json!(true));
    assert!(body["data"]["invoice_id"].is_null());
    assert!(body["data"]["invoice_url"].is_null());

    let transactions = app.db.collection::<Transaction>("transactions");
    let recorded = transactions
        .find_one(doc! { "status": "SUCCESS" }, None)
        .await
        .unwrap()
        .expect("success record missing");
    assert_eq!(recorded.invoice_id, None);

    let invoices = app.db.collection::<InvoiceRecord>("invoice_records");
    assert_eq!(invoices.count_documents(None, None).await.unwrap(), 0);

    app.cleanup().await;
}

#[tokio::test]
async fn authenticated_flow_requires_known_user() {
    let app = TestApp::spawn().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/verify-order", app.address))
        .header("X-User-ID", "u_missing")
        .json(&json!({
            "razorpay_order_id": "order_3",
            "razorpay_payment_id": "pay_3",
            "razorpay_signature": TestApp::signature_for("order_3", "pay_3"),
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.expect("Invalid response body");
    assert_eq!(body["success"], json!(false));

    // Unknown user short-circuits before the gateway is consulted.
    assert!(app
        .razorpay_server
        .received_requests()
        .await
        .unwrap()
        .is_empty());

    let transactions = app.db.collection::<Transaction>("transactions");
    let failed = transactions
        .find_one(doc! { "status": "FAILED" }, None)
        .await
        .unwrap()
        .expect("failed record missing");
    assert!(!failed.failure_reason.unwrap_or_default().is_empty());

    app.cleanup().await;
}

#[tokio::test]
async fn authenticated_flow_does_not_touch_public_total() {
    let app = TestApp::spawn().await;
    let client = reqwest::Client::new();

    app.seed_donor("u_1", "Meera", "meera@example.com").await;
    app.mock_payment_fetch("pay_4", 100_000, Some("meera@example.com"))
        .await;
    app.mock_invoicing().await;

    let response = client
        .post(format!("{}/verify-order", app.address))
        .header("X-User-ID", "u_1")
        .json(&json!({
            "razorpay_order_id": "order_4",
            "razorpay_payment_id": "pay_4",
            "razorpay_signature": TestApp::signature_for("order_4", "pay_4"),
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Invalid response body");
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["amount"], json!(1000.0));

    let recorded = app
        .db
        .collection::<Transaction>("transactions")
        .find_one(doc! { "status": "SUCCESS" }, None)
        .await
        .unwrap()
        .expect("success record missing");
    assert_eq!(recorded.payer_email.as_deref(), Some("meera@example.com"));

    // The public counter only moves for the public donation flow.
    let total = app
        .db
        .collection::<DonationTotal>("donation_totals")
        .find_one(None, None)
        .await
        .unwrap();
    assert!(total.is_none());

    app.cleanup().await;
}

#[tokio::test]
async fn gateway_failure_is_recorded_and_surfaced() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    let app = TestApp::spawn().await;
    let client = reqwest::Client::new();

    Mock::given(method("GET"))
        .and(path("/payments/pay_9"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "code": "SERVER_ERROR", "description": "upstream unavailable" }
        })))
        .mount(&app.razorpay_server)
        .await;

    let response = client
        .post(format!("{}/verify-public-order", app.address))
        .json(&json!({
            "razorpay_order_id": "order_9",
            "razorpay_payment_id": "pay_9",
            "razorpay_signature": TestApp::signature_for("order_9", "pay_9"),
            "name": "Asha",
            "email": "asha@example.com",
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.expect("Invalid response body");
    assert_eq!(body["success"], json!(false));

    let failed = app
        .db
        .collection::<Transaction>("transactions")
        .find_one(doc! { "status": "FAILED" }, None)
        .await
        .unwrap()
        .expect("failed record missing");
    let reason = failed.failure_reason.unwrap_or_default();
    assert!(reason.contains("Gateway fetch failed"));

    app.cleanup().await;
}
