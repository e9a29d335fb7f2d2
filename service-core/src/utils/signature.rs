use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Generate the gateway checkout signature.
///
/// Format: HMAC-SHA256("{order_id}|{payment_id}", secret), hex-encoded.
pub fn generate_gateway_signature(
    order_id: &str,
    payment_id: &str,
    secret: &str,
) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;

    let payload = format!("{}|{}", order_id, payment_id);
    mac.update(payload.as_bytes());
    let result = mac.finalize();

    Ok(hex::encode(result.into_bytes()))
}

/// Verify a gateway checkout signature using constant-time comparison.
///
/// An empty order id, payment id, or signature is invalid without
/// computing the HMAC.
pub fn verify_gateway_signature(
    order_id: &str,
    payment_id: &str,
    signature: &str,
    secret: &str,
) -> Result<bool, anyhow::Error> {
    if order_id.is_empty() || payment_id.is_empty() || signature.is_empty() {
        return Ok(false);
    }

    let expected_signature = generate_gateway_signature(order_id, payment_id, secret)?;

    // Constant time comparison
    let expected_bytes = expected_signature.as_bytes();
    let signature_bytes = signature.as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}
