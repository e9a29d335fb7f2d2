use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One verification attempt, successful or not.
///
/// Records are append-only: once written, the only permitted change is a
/// one-time attachment of `invoice_id`/`invoice_url` after issuance.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
    pub status: TransactionStatus,
    pub failure_reason: Option<String>,
    /// Amount in rupees (the gateway reports paise).
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub method: Option<String>,
    pub payer_email: Option<String>,
    pub payer_contact: Option<String>,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
    pub fee: Option<f64>,
    pub tax: Option<f64>,
    pub captured: Option<bool>,
    /// Gateway-side creation time, unix seconds.
    pub gateway_created_at: Option<i64>,
    pub invoice_id: Option<String>,
    pub invoice_url: Option<String>,
    pub recorded_at: DateTime,
}

impl Transaction {
    /// Build a failed attempt carrying whatever the caller supplied.
    pub fn failed(
        order_id: Option<String>,
        payment_id: Option<String>,
        signature: Option<String>,
        failure_reason: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            payment_id,
            signature,
            status: TransactionStatus::Failed,
            failure_reason: Some(failure_reason),
            amount: None,
            currency: None,
            method: None,
            payer_email: None,
            payer_contact: None,
            notes: BTreeMap::new(),
            fee: None,
            tax: None,
            captured: None,
            gateway_created_at: None,
            invoice_id: None,
            invoice_url: None,
            recorded_at: DateTime::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
    Pending,
    Failed,
}

/// Singleton running total backing the public donation counter.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DonationTotal {
    #[serde(rename = "_id")]
    pub id: String,
    pub total_amount: f64,
}

/// Singleton cached bearer token for the invoicing provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CachedToken {
    #[serde(rename = "_id")]
    pub id: String,
    pub access_token: String,
    /// Expiry, unix milliseconds.
    pub expires_at: i64,
}

impl CachedToken {
    pub const SINGLETON_ID: &'static str = "zoho";

    /// Tokens go stale this long before nominal expiry so one cannot expire
    /// mid-flight of a downstream call.
    pub const EXPIRY_BUFFER_MILLIS: i64 = 5 * 60 * 1000;

    pub fn is_usable(&self, now_millis: i64) -> bool {
        now_millis < self.expires_at - Self::EXPIRY_BUFFER_MILLIS
    }
}

/// Record of a successfully issued invoice.
///
/// Deliberately not keyed to a transaction: invoicing failures must never
/// block or corrupt the ledger write, so the linkage stays informal
/// (email + amount + time) plus the best-effort back-reference on
/// [`Transaction`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InvoiceRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub transaction_email: String,
    pub provider_invoice_id: String,
    pub invoice_number: String,
    pub pdf_url: String,
    pub amount: f64,
    pub created_at: DateTime,
}

/// Donor account, owned by the surrounding application; read-only here.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Donor {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
}
