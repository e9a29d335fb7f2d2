//! Zoho Invoice provider client.
//!
//! Two concerns live here: the OAuth token cache that keeps a single valid
//! bearer token shared across concurrent requests, and the invoice issuer
//! that turns a verified donation into a sent invoice. Everything in this
//! module is best-effort from the caller's point of view: a verified
//! payment is never failed because invoicing misbehaved.

use crate::config::ZohoConfig;
use crate::models::CachedToken;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use mongodb::bson::DateTime;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn now_millis() -> i64 {
    DateTime::now().timestamp_millis()
}

/// Durable storage for the provider token, so a restart does not force a
/// refresh round-trip while the previous token is still valid.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load_token(&self) -> Result<Option<CachedToken>>;
    async fn save_token(&self, token: &CachedToken) -> Result<()>;
}

type SharedRefresh = Shared<BoxFuture<'static, Result<CachedToken, String>>>;

#[derive(Default)]
struct TokenSlot {
    current: Option<CachedToken>,
    in_flight: Option<SharedRefresh>,
}

/// Cache of the provider bearer token with single-flight refresh.
///
/// Callers that observe a stale or absent token share one refresh call:
/// the first installs the pending future, the rest await it. The slot is
/// cleared when the refresh settles, so a failed refresh is retried by the
/// next caller instead of poisoning the cache. The mutex only guards slot
/// bookkeeping and is never held across network I/O.
pub struct TokenCache {
    client: Client,
    config: ZohoConfig,
    store: Arc<dyn TokenStore>,
    slot: Arc<Mutex<TokenSlot>>,
}

impl TokenCache {
    pub fn new(config: ZohoConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, config, store))
    }

    fn with_client(client: Client, config: ZohoConfig, store: Arc<dyn TokenStore>) -> Self {
        Self {
            client,
            config,
            store,
            slot: Arc::new(Mutex::new(TokenSlot::default())),
        }
    }

    /// Return a usable bearer token, refreshing it just-in-time.
    pub async fn get_token(&self) -> Result<String, AppError> {
        let refresh = {
            let mut slot = self.slot.lock().await;

            if let Some(token) = slot.current.as_ref().filter(|t| t.is_usable(now_millis())) {
                return Ok(token.access_token.clone());
            }

            match slot.in_flight.clone() {
                Some(pending) => pending,
                None => {
                    let pending = self.start_refresh();
                    slot.in_flight = Some(pending.clone());
                    pending
                }
            }
        };

        refresh
            .await
            .map(|token| token.access_token)
            .map_err(AppError::TokenRefresh)
    }

    /// Build the shared refresh future. It settles the slot itself: the
    /// in-flight guard is cleared and, on success, the new token installed,
    /// regardless of which waiter polls it to completion.
    fn start_refresh(&self) -> SharedRefresh {
        let client = self.client.clone();
        let config = self.config.clone();
        let store = self.store.clone();
        let slot = self.slot.clone();

        async move {
            let result = Self::resolve_token(&client, &config, store.as_ref()).await;

            let mut guard = slot.lock().await;
            guard.in_flight = None;
            match result {
                Ok(token) => {
                    guard.current = Some(token.clone());
                    Ok(token)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Zoho token refresh failed");
                    Err(e.to_string())
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn resolve_token(
        client: &Client,
        config: &ZohoConfig,
        store: &dyn TokenStore,
    ) -> Result<CachedToken> {
        // A token persisted by a previous process may still be valid.
        match store.load_token().await {
            Ok(Some(token)) if token.is_usable(now_millis()) => {
                tracing::debug!("Reusing persisted Zoho token");
                return Ok(token);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load persisted token, refreshing");
            }
        }

        let token = Self::exchange_refresh_token(client, config).await?;

        if let Err(e) = store.save_token(&token).await {
            tracing::warn!(error = %e, "Failed to persist refreshed token");
        }

        Ok(token)
    }

    /// Exchange the long-lived refresh credential for a new bearer token.
    async fn exchange_refresh_token(client: &Client, config: &ZohoConfig) -> Result<CachedToken> {
        if config.refresh_token.expose_secret().is_empty() {
            return Err(anyhow!("Zoho credentials not configured"));
        }

        let url = format!("{}/oauth/v2/token", config.accounts_base_url);
        let params = [
            ("refresh_token", config.refresh_token.expose_secret().as_str()),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose_secret().as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = client.post(&url).form(&params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(anyhow!("Token endpoint returned {}: {}", status, body));
        }

        let grant: TokenGrant = serde_json::from_str(&body)?;

        // Zoho reports some grant failures with HTTP 200 and an error field.
        if let Some(error) = grant.error {
            return Err(anyhow!("Token grant rejected: {}", error));
        }
        let access_token = grant
            .access_token
            .ok_or_else(|| anyhow!("Token endpoint response missing access_token"))?;

        let ttl_seconds = grant.expires_in.unwrap_or(config.token_ttl_seconds);
        let token = CachedToken {
            id: CachedToken::SINGLETON_ID.to_string(),
            access_token,
            expires_at: now_millis() + (ttl_seconds as i64) * 1000,
        };

        tracing::info!(expires_at = token.expires_at, "Zoho token refreshed");
        Ok(token)
    }
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

/// Invoice details surfaced back to the verification flow.
#[derive(Debug, Clone)]
pub struct InvoiceDetails {
    pub invoice_id: String,
    pub invoice_number: String,
    pub invoice_url: String,
}

/// Zoho Invoice client.
#[derive(Clone)]
pub struct ZohoClient {
    client: Client,
    config: ZohoConfig,
    tokens: Arc<TokenCache>,
}

impl ZohoClient {
    pub fn new(config: ZohoConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let tokens = Arc::new(TokenCache::with_client(
            client.clone(),
            config.clone(),
            store,
        ));
        Ok(Self {
            client,
            config,
            tokens,
        })
    }

    /// Issue an invoice for a verified donation: resolve the billing
    /// contact, create the invoice, mark it sent, and email it to the
    /// donor.
    pub async fn issue(
        &self,
        email: &str,
        name: &str,
        amount: f64,
        payment_id: &str,
    ) -> Result<InvoiceDetails, AppError> {
        let token = self.tokens.get_token().await?;

        let contact_id = self
            .find_or_create_contact(&token, email, name)
            .await
            .map_err(AppError::InvoiceIssuance)?;

        let invoice = self
            .create_invoice(&token, &contact_id, amount, payment_id)
            .await
            .map_err(AppError::InvoiceIssuance)?;

        self.mark_invoice_sent(&token, &invoice.invoice_id)
            .await
            .map_err(AppError::InvoiceIssuance)?;

        self.email_invoice(&token, &invoice.invoice_id, email)
            .await
            .map_err(AppError::InvoiceIssuance)?;

        tracing::info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            email = %email,
            "Invoice issued and emailed"
        );

        Ok(invoice)
    }

    /// Look up the billing contact by email, creating it if absent.
    async fn find_or_create_contact(
        &self,
        token: &str,
        email: &str,
        name: &str,
    ) -> Result<String> {
        let url = format!("{}/contacts", self.config.api_base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("email", email)])
            .header("Authorization", format!("Zoho-oauthtoken {}", token))
            .send()
            .await?;
        let search: ContactSearchResponse = Self::decode(response).await?;
        ensure_zoho_ok(search.code, search.message.as_deref(), "contact search")?;

        if let Some(contact) = search.contacts.into_iter().next() {
            return Ok(contact.contact_id);
        }

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Zoho-oauthtoken {}", token))
            .json(&json!({
                "contact_name": name,
                "email": email,
            }))
            .send()
            .await?;
        let created: ContactCreateResponse = Self::decode(response).await?;
        ensure_zoho_ok(created.code, created.message.as_deref(), "contact create")?;

        created
            .contact
            .map(|c| c.contact_id)
            .ok_or_else(|| anyhow!("Contact create response missing contact"))
    }

    /// Create an invoice with a single line item referencing the payment.
    async fn create_invoice(
        &self,
        token: &str,
        contact_id: &str,
        amount: f64,
        payment_id: &str,
    ) -> Result<InvoiceDetails> {
        let url = format!("{}/invoices", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Zoho-oauthtoken {}", token))
            .json(&json!({
                "customer_id": contact_id,
                "reference_number": payment_id,
                "line_items": [{
                    "name": "Donation",
                    "description": format!("Donation (payment {})", payment_id),
                    "rate": amount,
                    "quantity": 1,
                }],
            }))
            .send()
            .await?;
        let created: InvoiceCreateResponse = Self::decode(response).await?;
        ensure_zoho_ok(created.code, created.message.as_deref(), "invoice create")?;

        let invoice = created
            .invoice
            .ok_or_else(|| anyhow!("Invoice create response missing invoice"))?;

        Ok(InvoiceDetails {
            invoice_id: invoice.invoice_id,
            invoice_number: invoice.invoice_number,
            invoice_url: invoice.invoice_url,
        })
    }

    async fn mark_invoice_sent(&self, token: &str, invoice_id: &str) -> Result<()> {
        let url = format!(
            "{}/invoices/{}/status/sent",
            self.config.api_base_url, invoice_id
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Zoho-oauthtoken {}", token))
            .send()
            .await?;
        let status: StatusResponse = Self::decode(response).await?;
        ensure_zoho_ok(status.code, status.message.as_deref(), "invoice mark-sent")
    }

    async fn email_invoice(&self, token: &str, invoice_id: &str, email: &str) -> Result<()> {
        let url = format!(
            "{}/invoices/{}/email",
            self.config.api_base_url, invoice_id
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Zoho-oauthtoken {}", token))
            .json(&json!({ "to_mail_ids": [email] }))
            .send()
            .await?;
        let status: StatusResponse = Self::decode(response).await?;
        ensure_zoho_ok(status.code, status.message.as_deref(), "invoice email")
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(anyhow!("Zoho returned {}: {}", status, body));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

fn ensure_zoho_ok(code: i64, message: Option<&str>, context: &str) -> Result<()> {
    if code != 0 {
        return Err(anyhow!(
            "Zoho {} failed: code {} ({})",
            context,
            code,
            message.unwrap_or("no message")
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ContactSearchResponse {
    code: i64,
    message: Option<String>,
    #[serde(default)]
    contacts: Vec<ZohoContact>,
}

#[derive(Debug, Deserialize)]
struct ContactCreateResponse {
    code: i64,
    message: Option<String>,
    contact: Option<ZohoContact>,
}

#[derive(Debug, Deserialize)]
struct ZohoContact {
    contact_id: String,
}

#[derive(Debug, Deserialize)]
struct InvoiceCreateResponse {
    code: i64,
    message: Option<String>,
    invoice: Option<ZohoInvoice>,
}

#[derive(Debug, Deserialize)]
struct ZohoInvoice {
    invoice_id: String,
    invoice_number: String,
    #[serde(default)]
    invoice_url: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    code: i64,
    message: Option<String>,
}
