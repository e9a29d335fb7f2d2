use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub razorpay: RazorpayConfig,
    pub zoho: ZohoConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub api_base_url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ZohoConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub refresh_token: Secret<String>,
    pub accounts_base_url: String,
    pub api_base_url: String,
    /// Fallback token lifetime when the token endpoint omits `expires_in`.
    pub token_ttl_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("DONATION_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("DONATION_SERVICE_PORT")
            .unwrap_or_else(|_| "3004".to_string())
            .parse()?;

        let db_url = env::var("DONATION_DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DONATION_DATABASE_URL must be set"))?;
        let db_name =
            env::var("DONATION_DATABASE_NAME").unwrap_or_else(|_| "donation_db".to_string());

        let razorpay_key_id = env::var("RAZORPAY_KEY_ID")
            .map_err(|_| anyhow::anyhow!("RAZORPAY_KEY_ID must be set"))?;
        let razorpay_key_secret = env::var("RAZORPAY_KEY_SECRET")
            .map_err(|_| anyhow::anyhow!("RAZORPAY_KEY_SECRET must be set"))?;
        let razorpay_api_base_url = env::var("RAZORPAY_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string());

        // Zoho credentials are allowed to be absent: invoicing is best-effort
        // and an unconfigured provider surfaces as a recoverable refresh
        // failure, never as a verification failure.
        let zoho_client_id = env::var("ZOHO_CLIENT_ID").unwrap_or_default();
        let zoho_client_secret = env::var("ZOHO_CLIENT_SECRET").unwrap_or_default();
        let zoho_refresh_token = env::var("ZOHO_REFRESH_TOKEN").unwrap_or_default();
        let zoho_accounts_base_url = env::var("ZOHO_ACCOUNTS_BASE_URL")
            .unwrap_or_else(|_| "https://accounts.zoho.in".to_string());
        let zoho_api_base_url = env::var("ZOHO_API_BASE_URL")
            .unwrap_or_else(|_| "https://www.zohoapis.in/invoice/v3".to_string());
        let zoho_token_ttl_seconds = env::var("ZOHO_TOKEN_TTL_SECONDS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3600);

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            razorpay: RazorpayConfig {
                key_id: razorpay_key_id,
                key_secret: Secret::new(razorpay_key_secret),
                api_base_url: razorpay_api_base_url,
            },
            zoho: ZohoConfig {
                client_id: zoho_client_id,
                client_secret: Secret::new(zoho_client_secret),
                refresh_token: Secret::new(zoho_refresh_token),
                accounts_base_url: zoho_accounts_base_url,
                api_base_url: zoho_api_base_url,
                token_ttl_seconds: zoho_token_ttl_seconds,
            },
            service_name: "donation-service".to_string(),
        })
    }
}
