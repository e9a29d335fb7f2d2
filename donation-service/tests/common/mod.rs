use donation_service::config::{
    Config, DatabaseConfig, RazorpayConfig, ServerConfig, ZohoConfig,
};
use donation_service::models::Donor;
use donation_service::startup::Application;
use secrecy::Secret;
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_RAZORPAY_SECRET: &str = "test_key_secret";

pub struct TestApp {
    pub address: String,
    pub db: mongodb::Database,
    pub db_name: String,
    pub razorpay_server: MockServer,
    pub zoho_server: MockServer,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let razorpay_server = MockServer::start().await;
        let zoho_server = MockServer::start().await;
        let db_name = format!("donation_test_{}", uuid::Uuid::new_v4());

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Random port
            },
            database: DatabaseConfig {
                url: Secret::new(
                    std::env::var("TEST_MONGODB_URI")
                        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
                ),
                db_name: db_name.clone(),
            },
            razorpay: RazorpayConfig {
                key_id: "rzp_test_key".to_string(),
                key_secret: Secret::new(TEST_RAZORPAY_SECRET.to_string()),
                api_base_url: razorpay_server.uri(),
            },
            zoho: ZohoConfig {
                client_id: "test_client".to_string(),
                client_secret: Secret::new("test_client_secret".to_string()),
                refresh_token: Secret::new("test_refresh_token".to_string()),
                accounts_base_url: zoho_server.uri(),
                api_base_url: zoho_server.uri(),
                token_ttl_seconds: 3600,
            },
            service_name: "donation-service-test".to_string(),
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);
        let db = app.db().clone();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to be ready by polling the health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            db,
            db_name,
            razorpay_server,
            zoho_server,
        }
    }

    /// Compute the signature the gateway would have issued for this pair.
    pub fn signature_for(order_id: &str, payment_id: &str) -> String {
        service_core::utils::signature::generate_gateway_signature(
            order_id,
            payment_id,
            TEST_RAZORPAY_SECRET,
        )
        .expect("Failed to compute test signature")
    }

    /// Stub the gateway's payment read API for the given payment.
    pub async fn mock_payment_fetch(
        &self,
        payment_id: &str,
        amount_paise: u64,
        email: Option<&str>,
    ) {
        Mock::given(method("GET"))
            .and(path(format!("/payments/{}", payment_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": payment_id,
                "entity": "payment",
                "amount": amount_paise,
                "currency": "INR",
                "status": "captured",
                "order_id": "order_1",
                "method": "upi",
                "description": "Donation",
                "email": email,
                "contact": "+919999999999",
                "notes": { "campaign": "annual" },
                "fee": 1180,
                "tax": 180,
                "captured": true,
                "created_at": 1_700_000_000u64,
            })))
            .mount(&self.razorpay_server)
            .await;
    }

    /// Stub the full invoicing provider: token grant, contact search
    /// (no match), contact create, invoice create, mark-sent, email.
    pub async fn mock_invoicing(&self) {
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "test_access_token",
                "expires_in": 3600,
                "token_type": "Bearer",
            })))
            .mount(&self.zoho_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "success",
                "contacts": [],
            })))
            .mount(&self.zoho_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "success",
                "contact": { "contact_id": "contact_1" },
            })))
            .mount(&self.zoho_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/invoices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "success",
                "invoice": {
                    "invoice_id": "inv_1",
                    "invoice_number": "INV-000001",
                    "invoice_url": "https://invoices.example/inv_1",
                },
            })))
            .mount(&self.zoho_server)
            .await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/invoices/[^/]+/status/sent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "Invoice status has been changed to Sent.",
            })))
            .mount(&self.zoho_server)
            .await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/invoices/[^/]+/email$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "Your invoice has been sent.",
            })))
            .mount(&self.zoho_server)
            .await;
    }

    pub async fn seed_donor(&self, id: &str, name: &str, email: &str) {
        self.db
            .collection::<Donor>("users")
            .insert_one(
                Donor {
                    id: id.to_string(),
                    name: name.to_string(),
                    email: email.to_string(),
                },
                None,
            )
            .await
            .expect("Failed to seed donor");
    }

    /// Cleanup test database after test completes.
    pub async fn cleanup(&self) {
        self.db
            .drop(None)
            .await
            .expect("Failed to drop test database");
    }
}
