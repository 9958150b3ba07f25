//! Gate spot and Earn (uni lending) balances, API v4.
//!
//! Signature: hex HMAC-SHA512 of
//! `METHOD\nPATH\nQUERY\nhex(SHA512(body))\nTIMESTAMP` with the timestamp in
//! seconds.

use anyhow::Result;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;

use super::signing::{hmac_sha512_hex, sha512_hex};
use super::{collect_wallet, read_json, BalanceSource};
use crate::decimal::parse_decimal;
use crate::models::RawBalanceRecord;

const GATE_API_BASE: &str = "https://api.gateio.ws";
const API_PREFIX: &str = "/api/v4";

pub struct GateSource {
    api_key: String,
    secret_key: SecretString,
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SpotAccount {
    currency: String,
    available: String,
    locked: String,
}

#[derive(Debug, Deserialize)]
struct UniLend {
    currency: String,
    amount: String,
}

impl GateSource {
    pub fn new(api_key: String, secret_key: SecretString) -> Self {
        Self {
            api_key,
            secret_key,
            client: Client::new(),
            base_url: GATE_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn sign(&self, method: &str, path: &str, query: &str, body: &str, timestamp: &str) -> Result<String> {
        let payload = format!("{method}\n{path}\n{query}\n{}\n{timestamp}", sha512_hex(body));
        hmac_sha512_hex(self.secret_key.expose_secret(), &payload)
    }

    async fn signed_get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let path = format!("{API_PREFIX}{endpoint}");
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign("GET", &path, "", "", &timestamp)?;

        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Accept", "application/json")
            .header("KEY", &self.api_key)
            .header("Timestamp", &timestamp)
            .header("SIGN", signature)
            .send()
            .await?;
        read_json(response).await
    }

    async fn spot_balances(&self) -> Result<Vec<RawBalanceRecord>> {
        info!(source = "gate", "extracting balances from spot account");
        let accounts: Vec<SpotAccount> = self.signed_get("/spot/accounts").await?;

        let mut records = Vec::new();
        for account in accounts {
            let amount = parse_decimal(&account.available)? + parse_decimal(&account.locked)?;
            if amount > Decimal::ZERO {
                records.push(RawBalanceRecord::new("Gate (Spot)", account.currency, amount));
            }
        }
        Ok(records)
    }

    async fn earn_balances(&self) -> Result<Vec<RawBalanceRecord>> {
        info!(source = "gate", "extracting balances from earn account");
        let lends: Vec<UniLend> = self.signed_get("/earn/uni/lends").await?;

        let mut records = Vec::new();
        for lend in lends {
            let amount = parse_decimal(&lend.amount)?;
            if amount > Decimal::ZERO {
                records.push(RawBalanceRecord::new("Gate (Earn)", lend.currency, amount));
            }
        }
        Ok(records)
    }
}

#[async_trait::async_trait]
impl BalanceSource for GateSource {
    fn name(&self) -> &str {
        "gate"
    }

    async fn get_balances(&self) -> Vec<RawBalanceRecord> {
        let mut records = collect_wallet(self.name(), "spot", self.spot_balances().await);
        records.extend(collect_wallet(self.name(), "earn", self.earn_balances().await));
        records
    }
}
