//! Binance spot and Simple Earn balances.
//!
//! Signed endpoints take the query string plus `timestamp`, signed with
//! HMAC-SHA256 and the key in `X-MBX-APIKEY`.

use anyhow::Result;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use super::signing::{hmac_sha256_hex, query_string, timestamp_millis};
use super::{collect_wallet, read_json, BalanceSource};
use crate::decimal::parse_decimal;
use crate::models::RawBalanceRecord;

const BINANCE_API_BASE: &str = "https://api.binance.com";
const RECV_WINDOW: &str = "30000";
const EARN_PAGE_SIZE: usize = 100;

pub struct BinanceSource {
    api_key: String,
    secret_key: SecretString,
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<SpotBalance>,
}

#[derive(Debug, Deserialize)]
struct SpotBalance {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Debug, Deserialize)]
struct EarnPage {
    #[serde(default)]
    rows: Vec<EarnPosition>,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EarnPosition {
    asset: String,
    /// Flexible positions.
    #[serde(default)]
    total_amount: Option<String>,
    /// Locked positions.
    #[serde(default)]
    amount: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum EarnKind {
    Flexible,
    Locked,
}

impl EarnKind {
    fn path(self) -> &'static str {
        match self {
            EarnKind::Flexible => "/sapi/v1/simple-earn/flexible/position",
            EarnKind::Locked => "/sapi/v1/simple-earn/locked/position",
        }
    }

    fn label(self) -> &'static str {
        match self {
            EarnKind::Flexible => "Binance (Flexible Earn)",
            EarnKind::Locked => "Binance (Locked Earn)",
        }
    }
}

/// Earn positions are mirrored into spot as `LD<asset>`.
fn is_earn_mirror(asset: &str) -> bool {
    asset.starts_with("LD") && asset.len() > 4
}

impl BinanceSource {
    pub fn new(api_key: String, secret_key: SecretString) -> Self {
        Self {
            api_key,
            secret_key,
            client: Client::new(),
            base_url: BINANCE_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn signed_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> Result<T> {
        params.push(("recvWindow", RECV_WINDOW.to_string()));
        params.push(("timestamp", timestamp_millis().to_string()));
        let query = query_string(&params);
        let signature = hmac_sha256_hex(self.secret_key.expose_secret(), &query)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        read_json(response).await
    }

    async fn spot_balances(&self) -> Result<Vec<RawBalanceRecord>> {
        info!(source = "binance", "extracting balances from spot account");
        let account: AccountResponse = self
            .signed_get("/api/v3/account", vec![("omitZeroBalances", "true".to_string())])
            .await?;

        let mut records = Vec::new();
        for balance in account.balances {
            if is_earn_mirror(&balance.asset) {
                debug!(asset = %balance.asset, "skipping earn mirror asset");
                continue;
            }
            let amount = parse_decimal(&balance.free)? + parse_decimal(&balance.locked)?;
            if amount > Decimal::ZERO {
                records.push(RawBalanceRecord::new("Binance (Spot)", balance.asset, amount));
            }
        }
        Ok(records)
    }

    async fn earn_balances(&self, kind: EarnKind) -> Result<Vec<RawBalanceRecord>> {
        info!(source = "binance", wallet = kind.label(), "extracting earn positions");
        let mut positions = Vec::new();
        let mut current = 1;

        loop {
            let page: EarnPage = self
                .signed_get(
                    kind.path(),
                    vec![
                        ("current", current.to_string()),
                        ("size", EARN_PAGE_SIZE.to_string()),
                    ],
                )
                .await?;
            let fetched = page.rows.len();
            positions.extend(page.rows);

            if fetched < EARN_PAGE_SIZE || positions.len() >= page.total {
                break;
            }
            current += 1;
        }
        info!(source = "binance", wallet = kind.label(), count = positions.len(), "retrieved earn products");

        let mut records = Vec::new();
        for position in positions {
            let raw = match kind {
                EarnKind::Flexible => position.total_amount.as_deref(),
                EarnKind::Locked => position.amount.as_deref(),
            };
            let amount = parse_decimal(raw.unwrap_or("0"))?;
            if amount > Decimal::ZERO {
                records.push(RawBalanceRecord::new(kind.label(), position.asset, amount));
            }
        }
        Ok(records)
    }
}

#[async_trait::async_trait]
impl BalanceSource for BinanceSource {
    fn name(&self) -> &str {
        "binance"
    }

    async fn get_balances(&self) -> Vec<RawBalanceRecord> {
        let mut records = collect_wallet(self.name(), "spot", self.spot_balances().await);
        records.extend(collect_wallet(
            self.name(),
            "flexible earn",
            self.earn_balances(EarnKind::Flexible).await,
        ));
        records.extend(collect_wallet(
            self.name(),
            "locked earn",
            self.earn_balances(EarnKind::Locked).await,
        ));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earn_mirror_detection() {
        assert!(is_earn_mirror("LDBTC"));
        assert!(is_earn_mirror("LDUSDT"));
        assert!(!is_earn_mirror("LDO"));
        assert!(!is_earn_mirror("LDOX"));
        assert!(!is_earn_mirror("BTC"));
    }

    #[test]
    fn test_parse_earn_page() {
        let page: EarnPage = serde_json::from_str(
            r#"{"rows":[{"asset":"USDT","totalAmount":"75.46","latestAnnualPercentageRate":"0.02"}],"total":1}"#,
        )
        .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].total_amount.as_deref(), Some("75.46"));
        assert!(page.rows[0].amount.is_none());
    }
}
