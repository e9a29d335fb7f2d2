//! Caller identity extractor.
//!
//! The session layer in front of this service authenticates the donor and
//! forwards their user id in the `X-User-ID` header. Session issuance and
//! validation are out of scope here; the header is the contract.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

/// Identity of the logged-in donor, as asserted by the session layer.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!("Missing X-User-ID header"))
            })?;

        Ok(Self {
            user_id: user_id.to_string(),
        })
    }
}
