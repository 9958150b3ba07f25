//! BingX spot balances.

use anyhow::Result;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, warn};

use super::signing::{hmac_sha256_hex, query_string, timestamp_millis};
use super::{collect_wallet, read_json, BalanceSource};
use crate::decimal::parse_decimal;
use crate::models::RawBalanceRecord;

const BINGX_API_BASE: &str = "https://open-api.bingx.com";

pub struct BingXSource {
    api_key: String,
    secret_key: SecretString,
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct BalanceData {
    #[serde(default)]
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: String,
    locked: String,
}

impl BingXSource {
    pub fn new(api_key: String, secret_key: SecretString) -> Self {
        Self {
            api_key,
            secret_key,
            client: Client::new(),
            base_url: BINGX_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Params are sorted by key and suffixed with the timestamp before signing.
    async fn signed_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> Result<T> {
        params.sort_by(|a, b| a.0.cmp(b.0));
        params.push(("timestamp", timestamp_millis().to_string()));
        let query = query_string(&params);
        let signature = hmac_sha256_hex(self.secret_key.expose_secret(), &query)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        let response = self
            .client
            .get(&url)
            .header("X-BX-APIKEY", &self.api_key)
            .send()
            .await?;

        let envelope: Envelope<T> = read_json(response).await?;
        if envelope.code != 0 {
            anyhow::bail!("BingX error {}: {}", envelope.code, envelope.msg);
        }
        envelope
            .data
            .ok_or_else(|| anyhow::anyhow!("BingX response has no data"))
    }

    async fn spot_balances(&self) -> Result<Vec<RawBalanceRecord>> {
        info!(source = "bingx", "extracting balances from spot account");
        let data: BalanceData = self
            .signed_get("/openApi/spot/v1/account/balance", Vec::new())
            .await?;

        let mut records = Vec::new();
        for balance in data.balances {
            let amount = parse_decimal(&balance.free)? + parse_decimal(&balance.locked)?;
            if amount > Decimal::ZERO {
                records.push(RawBalanceRecord::new("BingX (Spot)", balance.asset, amount));
            }
        }
        Ok(records)
    }
}

#[async_trait::async_trait]
impl BalanceSource for BingXSource {
    fn name(&self) -> &str {
        "bingx"
    }

    async fn get_balances(&self) -> Vec<RawBalanceRecord> {
        let records = collect_wallet(self.name(), "spot", self.spot_balances().await);
        warn!(
            source = "bingx",
            "BingX does not expose wealth balances, add them to the manual balances file"
        );
        records
    }
}
