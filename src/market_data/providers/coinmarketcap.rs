//! CoinMarketCap market-data client.
//!
//! Uses the Pro API: `/v1/cryptocurrency/map` resolves symbols to coin ids and
//! ranks, `/v2/cryptocurrency/quotes/latest` returns price, supply and market
//! cap for one id. Every response carries a `status` block whose `error_code`
//! is used to classify failures.
//! Docs: https://coinmarketcap.com/api/documentation/v1/

use std::collections::HashMap;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::decimal::decimal_from_json;
use crate::market_data::{ApiError, ApiErrorKind, CoinIdentity, LatestQuote, MarketDataApi};

const COINMARKETCAP_API_BASE: &str = "https://pro-api.coinmarketcap.com";

#[derive(Debug, Default, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    #[serde(default)]
    status: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct MapEntry {
    id: u64,
    name: String,
    symbol: String,
    #[serde(default)]
    rank: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct QuoteEntry {
    #[serde(default)]
    max_supply: Value,
    #[serde(default)]
    circulating_supply: Value,
    #[serde(default)]
    total_supply: Value,
    #[serde(default)]
    quote: HashMap<String, UsdQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct UsdQuote {
    #[serde(default)]
    price: Value,
    #[serde(default)]
    market_cap: Value,
}

/// CoinMarketCap API client.
pub struct CoinMarketCapClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
}

impl CoinMarketCapClient {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: COINMARKETCAP_API_BASE.to_string(),
        }
    }

    /// Point the client at another host (sandbox or a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .header("Accept", "application/json")
            .header("X-CMC_PRO_API_KEY", self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| ApiError::new(ApiErrorKind::Unknown, format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::new(ApiErrorKind::Unknown, format!("failed to read body: {e}")))?;
        debug!(path, status = %status, body = %body, "coinmarketcap response");

        let api_status = serde_json::from_str::<StatusEnvelope>(&body)
            .ok()
            .and_then(|envelope| envelope.status)
            .unwrap_or_default();
        let code = api_status.error_code.filter(|code| *code != 0);

        if !status.is_success() || code.is_some() {
            let message = api_status
                .error_message
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(ApiError::from_response(status.as_u16(), code, message));
        }

        let envelope: DataEnvelope<T> = serde_json::from_str(&body).map_err(|e| {
            ApiError::new(
                ApiErrorKind::Unknown,
                format!("failed to parse CoinMarketCap response: {e}"),
            )
        })?;
        Ok(envelope.data)
    }
}

#[async_trait::async_trait]
impl MarketDataApi for CoinMarketCapClient {
    async fn cryptocurrency_map(&self, symbols: &[String]) -> Result<Vec<CoinIdentity>, ApiError> {
        let entries: Vec<MapEntry> = self
            .get("/v1/cryptocurrency/map", &[("symbol", symbols.join(","))])
            .await?;

        Ok(entries
            .into_iter()
            .map(|entry| CoinIdentity {
                id: entry.id,
                symbol: entry.symbol,
                name: entry.name,
                rank: entry.rank,
            })
            .collect())
    }

    async fn quotes_latest(&self, id: u64) -> Result<Option<LatestQuote>, ApiError> {
        let mut data: HashMap<String, QuoteEntry> = self
            .get("/v2/cryptocurrency/quotes/latest", &[("id", id.to_string())])
            .await?;

        let Some(entry) = data.remove(&id.to_string()) else {
            return Ok(None);
        };
        let usd = entry.quote.get("USD");

        Ok(Some(LatestQuote {
            price_usd: usd.and_then(|q| decimal_from_json(&q.price)),
            max_supply: decimal_from_json(&entry.max_supply),
            circulating_supply: decimal_from_json(&entry.circulating_supply),
            total_supply: decimal_from_json(&entry.total_supply),
            market_cap: usd.and_then(|q| decimal_from_json(&q.market_cap)),
        }))
    }

    fn name(&self) -> &str {
        "coinmarketcap"
    }
}
