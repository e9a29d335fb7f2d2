use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::TransactionStatus;

/// Checkout verification payload for a logged-in donor.
///
/// Fields default to empty so that absent parameters surface as validation
/// failures (and a failed ledger record) instead of a deserialization error.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOrderRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "razorpay_order_id is required"))]
    pub razorpay_order_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "razorpay_payment_id is required"))]
    pub razorpay_payment_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "razorpay_signature is required"))]
    pub razorpay_signature: String,
}

/// Public donation-page variant: the donor is not logged in, so the page
/// supplies their name and email alongside the checkout parameters.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPublicOrderRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "razorpay_order_id is required"))]
    pub razorpay_order_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "razorpay_payment_id is required"))]
    pub razorpay_payment_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "razorpay_signature is required"))]
    pub razorpay_signature: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
}

/// Uniform response envelope: `{success, data?, error?}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerifyOrderData {
    pub transaction_id: Uuid,
    pub order_id: String,
    pub payment_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_url: Option<String>,
}
