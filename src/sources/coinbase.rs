//! Coinbase balances via the CDP Advanced Trade API.
//!
//! Requests carry a short-lived ES256 JWT signed with the CDP key.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use p256::SecretKey;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{collect_wallet, read_json, BalanceSource};
use crate::decimal::parse_decimal;
use crate::models::RawBalanceRecord;

const CDP_API_BASE: &str = "https://api.coinbase.com";
const ACCOUNTS_PATH: &str = "/api/v3/brokerage/accounts";
const PAGE_LIMIT: u32 = 250;

/// Coinbase CDP balance source.
pub struct CoinbaseSource {
    key_name: String,
    private_key_pem: SecretString,
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct JwtClaims {
    sub: String,
    iss: String,
    nbf: i64,
    exp: i64,
    uri: String,
}

#[derive(Debug, Deserialize)]
struct AccountsPage {
    #[serde(default)]
    accounts: Vec<CoinbaseAccount>,
    #[serde(default)]
    has_next: bool,
    #[serde(default)]
    cursor: String,
}

#[derive(Debug, Deserialize)]
struct CoinbaseAccount {
    currency: String,
    available_balance: CoinbaseAmount,
    #[serde(default)]
    hold: Option<CoinbaseAmount>,
}

#[derive(Debug, Deserialize)]
struct CoinbaseAmount {
    value: String,
}

impl CoinbaseSource {
    /// `private_key_pem` is the SEC1 EC key; literal `\n` sequences are accepted.
    pub fn new(key_name: String, private_key_pem: SecretString) -> Self {
        Self {
            key_name,
            private_key_pem,
            client: Client::new(),
            base_url: CDP_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn generate_jwt(&self, method: &str, path: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        let host = self
            .base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://");

        let claims = JwtClaims {
            sub: self.key_name.clone(),
            iss: "cdp".to_string(),
            nbf: now,
            exp: now + 120,
            uri: format!("{method} {host}{path}"),
        };

        let header = serde_json::json!({
            "alg": "ES256",
            "typ": "JWT",
            "kid": self.key_name,
            "nonce": format!("{:x}", rand::random::<u64>())
        });

        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_string(&header)?);
        let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_string(&claims)?);
        let message = format!("{header_b64}.{claims_b64}");

        let pem = self.private_key_pem.expose_secret().replace("\\n", "\n");
        let secret_key = SecretKey::from_sec1_pem(&pem).context("Failed to parse EC private key")?;
        let signing_key = SigningKey::from(&secret_key);

        let signature: Signature = signing_key.sign(message.as_bytes());
        let sig_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());

        Ok(format!("{message}.{sig_b64}"))
    }

    async fn accounts_page(&self, cursor: Option<&str>) -> Result<AccountsPage> {
        let jwt = self.generate_jwt("GET", ACCOUNTS_PATH)?;
        let mut query = vec![("limit", PAGE_LIMIT.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let response = self
            .client
            .get(format!("{}{}", self.base_url, ACCOUNTS_PATH))
            .query(&query)
            .header("Authorization", format!("Bearer {jwt}"))
            .header("Content-Type", "application/json")
            .send()
            .await
            .context("HTTP request failed")?;
        read_json(response).await
    }

    async fn spot_balances(&self) -> Result<Vec<RawBalanceRecord>> {
        info!(source = "coinbase", "extracting balances from spot accounts");
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.accounts_page(cursor.as_deref()).await?;
            for account in page.accounts {
                let mut amount = parse_decimal(&account.available_balance.value)?;
                if let Some(hold) = &account.hold {
                    amount += parse_decimal(&hold.value)?;
                }
                if amount > Decimal::ZERO {
                    records.push(RawBalanceRecord::new("Coinbase (Spot)", account.currency, amount));
                }
            }

            if !page.has_next || page.cursor.is_empty() {
                break;
            }
            cursor = Some(page.cursor);
        }

        Ok(records)
    }
}

#[async_trait::async_trait]
impl BalanceSource for CoinbaseSource {
    fn name(&self) -> &str {
        "coinbase"
    }

    async fn get_balances(&self) -> Vec<RawBalanceRecord> {
        collect_wallet(self.name(), "spot", self.spot_balances().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn test_key_pem() -> String {
        let key = SecretKey::random(&mut OsRng);
        key.to_sec1_pem(Default::default()).unwrap().to_string()
    }

    #[test]
    fn test_jwt_has_three_parts_and_uri_claim() {
        let source = CoinbaseSource::new("organizations/x/apiKeys/y".into(), SecretString::from(test_key_pem()))
            .with_base_url("http://127.0.0.1:9999");

        let jwt = source.generate_jwt("GET", ACCOUNTS_PATH).unwrap();
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);

        let claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        assert_eq!(claims["uri"], "GET 127.0.0.1:9999/api/v3/brokerage/accounts");
        assert_eq!(claims["iss"], "cdp");
    }

    #[test]
    fn test_escaped_newlines_accepted() {
        let escaped = test_key_pem().replace('\n', "\\n");
        let source = CoinbaseSource::new("key".into(), SecretString::from(escaped));
        assert!(source.generate_jwt("GET", ACCOUNTS_PATH).is_ok());
    }

    #[test]
    fn test_invalid_key_is_error() {
        let source = CoinbaseSource::new("key".into(), SecretString::from("not a pem"));
        assert!(source.generate_jwt("GET", ACCOUNTS_PATH).is_err());
    }
}
