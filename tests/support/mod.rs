#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cryptonaire::clock::RecordingSleeper;
use cryptonaire::market_data::{
    ApiError, ApiErrorKind, CoinIdentity, LatestQuote, MarketDataApi, MarketDataEnricher,
};
use cryptonaire::models::RawBalanceRecord;
use cryptonaire::sources::BalanceSource;
use rust_decimal::Decimal;

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// In-memory market data with scripted failures.
#[derive(Default)]
pub struct ScriptedApi {
    identities: HashMap<String, Vec<CoinIdentity>>,
    quotes: HashMap<u64, LatestQuote>,
    invalid: HashSet<String>,
    rate_limits_left: AtomicU32,
    map_error: Option<ApiErrorKind>,
    quote_errors: HashMap<u64, ApiErrorKind>,
    map_calls: Mutex<Vec<Vec<String>>>,
    quote_calls: Mutex<Vec<u64>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Known coin with a price; market cap is price × 1000.
    pub fn with_coin(mut self, symbol: &str, id: u64, rank: i64, price: &str) -> Self {
        self.identities.entry(symbol.to_string()).or_default().push(CoinIdentity {
            id,
            symbol: symbol.to_string(),
            name: format!("{symbol} Coin"),
            rank: Some(rank),
        });
        let price = dec(price);
        self.quotes.insert(
            id,
            LatestQuote {
                price_usd: Some(price),
                max_supply: None,
                circulating_supply: Some(Decimal::from(1000)),
                total_supply: Some(Decimal::from(1000)),
                market_cap: Some(price * Decimal::from(1000)),
            },
        );
        self
    }

    /// Symbol that makes any batch containing it a bad request.
    pub fn with_invalid(mut self, symbol: &str) -> Self {
        self.invalid.insert(symbol.to_string());
        self
    }

    /// The first `n` calls (of any kind) answer with a rate limit.
    pub fn with_rate_limits(self, n: u32) -> Self {
        self.rate_limits_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_map_error(mut self, kind: ApiErrorKind) -> Self {
        self.map_error = Some(kind);
        self
    }

    /// Every quote call for `id` fails with `kind`.
    pub fn with_quote_error(mut self, id: u64, kind: ApiErrorKind) -> Self {
        self.quote_errors.insert(id, kind);
        self
    }

    pub fn map_calls(&self) -> Vec<Vec<String>> {
        self.map_calls.lock().unwrap().clone()
    }

    pub fn quote_calls(&self) -> Vec<u64> {
        self.quote_calls.lock().unwrap().clone()
    }

    fn take_rate_limit(&self) -> Result<(), ApiError> {
        let left = self.rate_limits_left.load(Ordering::SeqCst);
        if left > 0 {
            self.rate_limits_left.store(left - 1, Ordering::SeqCst);
            return Err(ApiError::from_response(429, Some(1008), "minute limit"));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataApi for ScriptedApi {
    async fn cryptocurrency_map(&self, symbols: &[String]) -> Result<Vec<CoinIdentity>, ApiError> {
        self.map_calls.lock().unwrap().push(symbols.to_vec());
        self.take_rate_limit()?;
        if let Some(kind) = self.map_error {
            return Err(ApiError::new(kind, "scripted failure"));
        }
        if symbols.iter().any(|s| self.invalid.contains(s)) {
            return Err(ApiError::from_response(400, Some(400), "Invalid value for \"symbol\""));
        }
        Ok(symbols
            .iter()
            .filter_map(|s| self.identities.get(s))
            .flatten()
            .cloned()
            .collect())
    }

    async fn quotes_latest(&self, id: u64) -> Result<Option<LatestQuote>, ApiError> {
        self.quote_calls.lock().unwrap().push(id);
        self.take_rate_limit()?;
        if let Some(kind) = self.quote_errors.get(&id) {
            return Err(match kind {
                ApiErrorKind::BadRequest => ApiError::from_response(400, Some(400), "Invalid value for \"id\""),
                kind => ApiError::new(*kind, "scripted failure"),
            });
        }
        Ok(self.quotes.get(&id).cloned())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn enricher(api: Arc<ScriptedApi>, sleeper: Arc<RecordingSleeper>) -> MarketDataEnricher {
    MarketDataEnricher::new(api).with_sleeper(sleeper)
}

/// Source returning fixed records.
pub struct StaticSource {
    pub name: String,
    pub records: Vec<RawBalanceRecord>,
}

impl StaticSource {
    pub fn new(name: &str, records: Vec<RawBalanceRecord>) -> Arc<dyn BalanceSource> {
        Arc::new(Self {
            name: name.to_string(),
            records,
        })
    }
}

#[async_trait]
impl BalanceSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_balances(&self) -> Vec<RawBalanceRecord> {
        self.records.clone()
    }
}
