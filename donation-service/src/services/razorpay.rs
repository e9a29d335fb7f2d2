//! Razorpay payment provider client.
//!
//! Implements checkout signature verification and the authoritative
//! payment fetch. Client-supplied amounts and payment attributes are never
//! trusted; the record of truth is what this client reads back from the
//! gateway.

use crate::config::RazorpayConfig;
use anyhow::{anyhow, Result};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use service_core::utils::signature::verify_gateway_signature;
use std::collections::BTreeMap;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Razorpay client for interacting with the Razorpay API.
#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    config: RazorpayConfig,
}

/// Checkout verification parameters as posted by the donation page.
#[derive(Debug)]
pub struct PaymentVerification {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

/// Razorpay payment entity, as returned by the payments read API.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub entity: String,
    /// Amount in smallest currency unit (paise for INR).
    pub amount: u64,
    pub currency: String,
    pub status: String,
    pub order_id: Option<String>,
    pub method: Option<String>,
    pub description: Option<String>,
    pub email: Option<String>,
    pub contact: Option<String>,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
    pub fee: Option<u64>,
    pub tax: Option<u64>,
    pub captured: Option<bool>,
    pub created_at: u64,
}

impl PaymentEntity {
    /// Amount in rupees.
    pub fn amount_rupees(&self) -> f64 {
        self.amount as f64 / 100.0
    }

    pub fn fee_rupees(&self) -> Option<f64> {
        self.fee.map(|f| f as f64 / 100.0)
    }

    pub fn tax_rupees(&self) -> Option<f64> {
        self.tax.map(|t| t as f64 / 100.0)
    }
}

/// Razorpay API error response.
#[derive(Debug, Deserialize)]
pub struct RazorpayError {
    pub error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayErrorDetail {
    pub code: String,
    pub description: String,
}

impl RazorpayClient {
    /// Create a new Razorpay client.
    pub fn new(config: RazorpayConfig) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    /// Verify the checkout signature posted back by the donation page.
    ///
    /// The signature is computed as:
    /// `HMAC-SHA256(order_id + "|" + payment_id, key_secret)`
    pub fn verify_payment_signature(&self, verification: &PaymentVerification) -> Result<bool> {
        let is_valid = verify_gateway_signature(
            &verification.razorpay_order_id,
            &verification.razorpay_payment_id,
            &verification.razorpay_signature,
            self.config.key_secret.expose_secret(),
        )?;

        if is_valid {
            tracing::info!(
                order_id = %verification.razorpay_order_id,
                payment_id = %verification.razorpay_payment_id,
                "Payment signature verified successfully"
            );
        } else {
            tracing::warn!(
                order_id = %verification.razorpay_order_id,
                payment_id = %verification.razorpay_payment_id,
                signature = %verification.razorpay_signature,
                "Payment signature verification failed"
            );
        }

        Ok(is_valid)
    }

    /// Fetch the authoritative payment object by id.
    pub async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentEntity> {
        let url = format!("{}/payments/{}", self.config.api_base_url, payment_id);

        let response = self
            .client
            .get(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, body = %body, "Razorpay fetch_payment response");

        if status.is_success() {
            let payment: PaymentEntity = serde_json::from_str(&body)?;
            tracing::info!(
                payment_id = %payment.id,
                amount = payment.amount,
                currency = %payment.currency,
                status = %payment.status,
                "Fetched payment from Razorpay"
            );
            Ok(payment)
        } else {
            let error: RazorpayError =
                serde_json::from_str(&body).unwrap_or_else(|_| RazorpayError {
                    error: RazorpayErrorDetail {
                        code: "UNKNOWN".to_string(),
                        description: body.clone(),
                    },
                });
            tracing::error!(
                payment_id = %payment_id,
                code = %error.error.code,
                description = %error.error.description,
                "Razorpay payment fetch failed"
            );
            Err(anyhow!(
                "Razorpay error: {} - {}",
                error.error.code,
                error.error.description
            ))
        }
    }
}
