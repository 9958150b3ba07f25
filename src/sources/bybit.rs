//! ByBit unified trading account balances (v5 API).
//!
//! Requests are signed with HMAC-SHA256 over
//! `timestamp + api_key + recv_window + query`.

use anyhow::{Context, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::info;

use super::signing::{hmac_sha256_hex, timestamp_millis};
use super::{collect_wallet, read_json, BalanceSource};
use crate::decimal::parse_decimal;
use crate::models::RawBalanceRecord;

const BYBIT_API_BASE: &str = "https://api.bybit.com";
const RECV_WINDOW: &str = "5000";

pub struct ByBitSource {
    api_key: String,
    secret_key: SecretString,
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<WalletResult>,
}

#[derive(Debug, Deserialize)]
struct WalletResult {
    #[serde(default)]
    list: Vec<WalletAccount>,
}

#[derive(Debug, Deserialize)]
struct WalletAccount {
    #[serde(default)]
    coin: Vec<CoinBalance>,
}

#[derive(Debug, Deserialize)]
struct CoinBalance {
    coin: String,
    #[serde(default)]
    equity: String,
}

impl ByBitSource {
    pub fn new(api_key: String, secret_key: SecretString) -> Self {
        Self {
            api_key,
            secret_key,
            client: Client::new(),
            base_url: BYBIT_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn unified_balances(&self) -> Result<Vec<RawBalanceRecord>> {
        info!(source = "bybit", "extracting balances from unified trading account");
        let query = "accountType=UNIFIED";
        let timestamp = timestamp_millis().to_string();
        let payload = format!("{}{}{}{}", timestamp, self.api_key, RECV_WINDOW, query);
        let signature = hmac_sha256_hex(self.secret_key.expose_secret(), &payload)?;

        let response = self
            .client
            .get(format!("{}/v5/account/wallet-balance?{}", self.base_url, query))
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", &timestamp)
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .header("X-BAPI-SIGN", signature)
            .send()
            .await?;

        let envelope: Envelope = read_json(response).await?;
        if envelope.ret_code != 0 {
            anyhow::bail!("ByBit error {}: {}", envelope.ret_code, envelope.ret_msg);
        }
        let account = envelope
            .result
            .and_then(|r| r.list.into_iter().next())
            .context("ByBit response has no unified account")?;

        let mut records = Vec::new();
        for coin in account.coin {
            if coin.equity.trim().is_empty() {
                continue;
            }
            let equity = parse_decimal(&coin.equity)?;
            if equity > Decimal::ZERO {
                records.push(RawBalanceRecord::new("ByBit (Unified Trading)", coin.coin, equity));
            }
        }
        Ok(records)
    }
}

#[async_trait::async_trait]
impl BalanceSource for ByBitSource {
    fn name(&self) -> &str {
        "bybit"
    }

    async fn get_balances(&self) -> Vec<RawBalanceRecord> {
        collect_wallet(self.name(), "unified trading", self.unified_balances().await)
    }
}
