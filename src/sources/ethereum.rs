//! Ethereum mainnet wallets through the Ethplorer API.

use anyhow::{Context, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{collect_wallet, read_json, BalanceSource};
use crate::decimal::{decimal_from_json, from_base_units};
use crate::models::RawBalanceRecord;

const ETHPLORER_API_BASE: &str = "https://api.ethplorer.io";
const SOURCE_LABEL: &str = "Ethereum Wallet";
const WEI_DECIMALS: u32 = 18;

pub struct EthereumSource {
    addresses: Vec<String>,
    api_key: String,
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct AddressInfo {
    #[serde(rename = "ETH")]
    eth: EthBalance,
    #[serde(default)]
    tokens: Vec<TokenBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EthBalance {
    #[serde(default)]
    balance: Value,
    #[serde(default)]
    raw_balance: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalance {
    token_info: TokenInfo,
    #[serde(default)]
    balance: Value,
    #[serde(default)]
    raw_balance: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    symbol: Option<String>,
    /// Ethplorer sends this as a string.
    #[serde(default)]
    decimals: Value,
}

impl EthereumSource {
    pub fn new(addresses: Vec<String>) -> Self {
        Self {
            addresses,
            api_key: "freekey".to_string(),
            client: Client::new(),
            base_url: ETHPLORER_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    async fn address_balances(&self, address: &str) -> Result<Vec<RawBalanceRecord>> {
        info!(source = "ethereum", address, "extracting balances from Ethereum mainnet");
        let response = self
            .client
            .get(format!("{}/getAddressInfo/{}", self.base_url, address))
            .query(&[("apiKey", self.api_key.as_str())])
            .send()
            .await
            .context("HTTP request failed")?;
        let info: AddressInfo = read_json(response).await?;

        let mut records = Vec::new();
        let eth = match info.eth.raw_balance.as_deref() {
            Some(raw) => from_base_units(raw, WEI_DECIMALS)?,
            None => decimal_from_json(&info.eth.balance).unwrap_or_default(),
        };
        if eth > Decimal::ZERO {
            records.push(RawBalanceRecord::new(SOURCE_LABEL, "ETH", eth));
        }

        for token in info.tokens {
            let symbol = token.token_info.symbol.as_deref().map(str::trim).unwrap_or_default();
            if symbol.is_empty() {
                warn!(source = "ethereum", address, "token without symbol, skipping");
                continue;
            }
            let amount = match token_amount(&token) {
                Ok(amount) => amount,
                Err(e) => {
                    warn!(source = "ethereum", address, symbol = %symbol, error = %e, "unreadable token balance, skipping");
                    continue;
                }
            };
            if amount > Decimal::ZERO {
                records.push(RawBalanceRecord::new(SOURCE_LABEL, symbol, amount));
            }
        }

        Ok(records)
    }
}

fn token_amount(token: &TokenBalance) -> Result<Decimal> {
    let decimals = token_decimals(&token.token_info.decimals).context("Invalid token decimals")?;
    match token.raw_balance.as_deref() {
        Some(raw) => from_base_units(raw, decimals),
        None => Ok(scale_down(
            decimal_from_json(&token.balance).unwrap_or_default(),
            decimals,
        )),
    }
}

fn token_decimals(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|d| u32::try_from(d).ok()),
        Value::String(s) => s.trim().parse().ok(),
        Value::Null => Some(0),
        _ => None,
    }
}

fn scale_down(amount: Decimal, decimals: u32) -> Decimal {
    (0..decimals).fold(amount, |acc, _| acc / Decimal::TEN)
}

#[async_trait::async_trait]
impl BalanceSource for EthereumSource {
    fn name(&self) -> &str {
        "ethereum"
    }

    async fn get_balances(&self) -> Vec<RawBalanceRecord> {
        let mut records = Vec::new();
        for address in &self.addresses {
            records.extend(collect_wallet(
                self.name(),
                address,
                self.address_balances(address).await,
            ));
        }
        records
    }
}
