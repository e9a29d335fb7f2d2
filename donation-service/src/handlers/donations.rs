//! Donation verification handlers.
//!
//! Implements the two verification routes: the authenticated flow for
//! logged-in donors and the public flow for the donation page. Both follow
//! the same discipline: every exit path, success or failure, appends
//! exactly one ledger record before the response is produced, and invoice
//! issuance can degrade but never fail an already-verified payment.

use axum::{extract::State, Json};
use mongodb::bson::DateTime;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{ApiResponse, VerifyOrderData, VerifyOrderRequest, VerifyPublicOrderRequest},
    middleware::UserContext,
    models::{InvoiceRecord, Transaction, TransactionStatus},
    services::razorpay::{PaymentEntity, PaymentVerification},
    services::zoho::InvoiceDetails,
    services::metrics,
    AppState,
};

/// One inbound verification attempt, as the caller presented it.
struct Attempt<'a> {
    route: &'static str,
    order_id: &'a str,
    payment_id: &'a str,
    signature: &'a str,
}

/// Verify a checkout for a logged-in donor.
pub async fn verify_order(
    State(state): State<AppState>,
    user: UserContext,
    Json(payload): Json<VerifyOrderRequest>,
) -> Result<Json<ApiResponse<VerifyOrderData>>, AppError> {
    let attempt = Attempt {
        route: "verify-order",
        order_id: &payload.razorpay_order_id,
        payment_id: &payload.razorpay_payment_id,
        signature: &payload.razorpay_signature,
    };

    tracing::info!(
        order_id = %attempt.order_id,
        payment_id = %attempt.payment_id,
        user_id = %user.user_id,
        "Verifying donation"
    );

    if let Err(e) = payload.validate() {
        let reason = format!("Missing or invalid parameters: {}", e);
        return Err(record_failure(&state, &attempt, reason, AppError::ValidationError(e)).await);
    }

    check_signature(&state, &attempt).await?;

    let donor = match state.repository.find_donor(&user.user_id).await {
        Ok(Some(donor)) => donor,
        Ok(None) => {
            let reason = format!("User {} not found", user.user_id);
            let error = AppError::UserNotFound(reason.clone());
            return Err(record_failure(&state, &attempt, reason, error).await);
        }
        Err(e) => {
            let reason = format!("User lookup failed: {}", e);
            return Err(record_failure(&state, &attempt, reason, AppError::DatabaseError(e)).await);
        }
    };

    let payment = fetch_payment(&state, &attempt).await?;

    let transaction = success_transaction(&attempt, &payment, payment.email.clone());
    state
        .repository
        .record(transaction.clone())
        .await
        .map_err(AppError::DatabaseError)?;

    metrics::record_verification(attempt.route, "success");
    metrics::record_amount(&payment.currency, payment.amount_rupees());

    let invoice =
        issue_invoice(&state, transaction.id, &donor.email, &donor.name, &payment).await;

    Ok(Json(ApiResponse::ok(verified_data(
        &transaction,
        &payment,
        invoice,
    ))))
}

/// Verify a checkout from the public donation page.
///
/// The donor is anonymous to us, so the page supplies their name and
/// email; those are only trusted once the signature has proven the
/// payment genuine.
pub async fn verify_public_order(
    State(state): State<AppState>,
    Json(payload): Json<VerifyPublicOrderRequest>,
) -> Result<Json<ApiResponse<VerifyOrderData>>, AppError> {
    let attempt = Attempt {
        route: "verify-public-order",
        order_id: &payload.razorpay_order_id,
        payment_id: &payload.razorpay_payment_id,
        signature: &payload.razorpay_signature,
    };

    tracing::info!(
        order_id = %attempt.order_id,
        payment_id = %attempt.payment_id,
        "Verifying public donation"
    );

    if let Err(e) = payload.validate() {
        let reason = format!("Missing or invalid parameters: {}", e);
        return Err(record_failure(&state, &attempt, reason, AppError::ValidationError(e)).await);
    }

    check_signature(&state, &attempt).await?;

    let payment = fetch_payment(&state, &attempt).await?;

    // The gateway's email wins when present; the page-supplied one fills in
    // for public checkouts where the gateway object carries none.
    let payer_email = payment
        .email
        .clone()
        .or_else(|| Some(payload.email.clone()));

    let transaction = success_transaction(&attempt, &payment, payer_email);
    state
        .repository
        .record(transaction.clone())
        .await
        .map_err(AppError::DatabaseError)?;

    if let Err(e) = state.repository.increment_total(payment.amount_rupees()).await {
        tracing::error!(error = %e, "Failed to update running donation total");
    }

    metrics::record_verification(attempt.route, "success");
    metrics::record_amount(&payment.currency, payment.amount_rupees());

    let invoice =
        issue_invoice(&state, transaction.id, &payload.email, &payload.name, &payment).await;

    Ok(Json(ApiResponse::ok(verified_data(
        &transaction,
        &payment,
        invoice,
    ))))
}

/// Write the failed attempt to the ledger before surfacing the error.
///
/// The ledger write must not mask the verification failure: a write error
/// here is logged and the original error is still returned to the caller.
async fn record_failure(
    state: &AppState,
    attempt: &Attempt<'_>,
    reason: String,
    error: AppError,
) -> AppError {
    tracing::warn!(
        route = attempt.route,
        order_id = %attempt.order_id,
        payment_id = %attempt.payment_id,
        reason = %reason,
        "Recording failed verification attempt"
    );

    let transaction = Transaction::failed(
        none_if_empty(attempt.order_id),
        none_if_empty(attempt.payment_id),
        none_if_empty(attempt.signature),
        reason,
    );

    if let Err(e) = state.repository.record(transaction).await {
        tracing::error!(error = %e, "Failed to write failure record to ledger");
    }

    metrics::record_verification(attempt.route, "failed");
    error
}

async fn check_signature(state: &AppState, attempt: &Attempt<'_>) -> Result<(), AppError> {
    let verification = PaymentVerification {
        razorpay_order_id: attempt.order_id.to_string(),
        razorpay_payment_id: attempt.payment_id.to_string(),
        razorpay_signature: attempt.signature.to_string(),
    };

    match state.razorpay.verify_payment_signature(&verification) {
        Ok(true) => Ok(()),
        Ok(false) => {
            let reason = "Invalid payment signature".to_string();
            let error = AppError::SignatureMismatch(reason.clone());
            Err(record_failure(state, attempt, reason, error).await)
        }
        Err(e) => {
            let reason = format!("Signature verification error: {}", e);
            Err(record_failure(state, attempt, reason, AppError::InternalError(e)).await)
        }
    }
}

async fn fetch_payment(
    state: &AppState,
    attempt: &Attempt<'_>,
) -> Result<PaymentEntity, AppError> {
    match state.razorpay.fetch_payment(attempt.payment_id).await {
        Ok(payment) => Ok(payment),
        Err(e) => {
            let reason = format!("Gateway fetch failed: {}", e);
            Err(record_failure(state, attempt, reason, AppError::GatewayFetch(e)).await)
        }
    }
}

/// Build the success record from gateway facts, never from client input
/// (the email is the one sanctioned exception, resolved by the caller).
fn success_transaction(
    attempt: &Attempt<'_>,
    payment: &PaymentEntity,
    payer_email: Option<String>,
) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        order_id: none_if_empty(attempt.order_id),
        payment_id: Some(payment.id.clone()),
        signature: none_if_empty(attempt.signature),
        status: TransactionStatus::Success,
        failure_reason: None,
        amount: Some(payment.amount_rupees()),
        currency: Some(payment.currency.clone()),
        method: payment.method.clone(),
        payer_email,
        payer_contact: payment.contact.clone(),
        notes: payment.notes.clone(),
        fee: payment.fee_rupees(),
        tax: payment.tax_rupees(),
        captured: payment.captured,
        gateway_created_at: Some(payment.created_at as i64),
        invoice_id: None,
        invoice_url: None,
        recorded_at: DateTime::now(),
    }
}

/// Issue the invoice and link it to the transaction, best-effort.
async fn issue_invoice(
    state: &AppState,
    transaction_id: Uuid,
    email: &str,
    name: &str,
    payment: &PaymentEntity,
) -> Option<InvoiceDetails> {
    match state
        .zoho
        .issue(email, name, payment.amount_rupees(), &payment.id)
        .await
    {
        Ok(details) => {
            match state
                .repository
                .attach_invoice(transaction_id, &details.invoice_id, &details.invoice_url)
                .await
            {
                Ok(true) => {}
                Ok(false) => tracing::warn!(
                    transaction_id = %transaction_id,
                    "Transaction already carries an invoice, not overwriting"
                ),
                Err(e) => tracing::warn!(
                    error = %e,
                    transaction_id = %transaction_id,
                    "Failed to attach invoice to transaction"
                ),
            }

            let record = InvoiceRecord {
                id: Uuid::new_v4(),
                transaction_email: email.to_string(),
                provider_invoice_id: details.invoice_id.clone(),
                invoice_number: details.invoice_number.clone(),
                pdf_url: details.invoice_url.clone(),
                amount: payment.amount_rupees(),
                created_at: DateTime::now(),
            };
            if let Err(e) = state.repository.save_invoice_record(record).await {
                tracing::warn!(error = %e, "Failed to save invoice record");
            }

            Some(details)
        }
        Err(e) => {
            // The payment is verified and recorded; invoicing stays
            // best-effort and the donor still sees a successful donation.
            tracing::warn!(
                error = %e,
                payment_id = %payment.id,
                "Invoice issuance failed, responding without invoice details"
            );
            None
        }
    }
}

fn verified_data(
    transaction: &Transaction,
    payment: &PaymentEntity,
    invoice: Option<InvoiceDetails>,
) -> VerifyOrderData {
    VerifyOrderData {
        transaction_id: transaction.id,
        order_id: transaction.order_id.clone().unwrap_or_default(),
        payment_id: payment.id.clone(),
        amount: payment.amount_rupees(),
        currency: payment.currency.clone(),
        status: TransactionStatus::Success,
        invoice_id: invoice.as_ref().map(|i| i.invoice_id.clone()),
        invoice_url: invoice.map(|i| i.invoice_url),
    }
}

fn none_if_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
