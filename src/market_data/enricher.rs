use std::collections::{BTreeSet, HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::clock::{Sleeper, TokioSleeper};
use crate::duration::format_duration;
use crate::models::{CoinInfo, CoinQuote};

use super::{ApiError, ApiErrorKind, CoinIdentity, MarketDataApi};

/// Fatal enrichment failure. The run cannot produce a report.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("market data access denied, check the API key: {0}")]
    Unauthorized(ApiError),

    #[error("market data provider failed, try again later: {0}")]
    ServerError(ApiError),

    #[error("unexpected market data error: {0}")]
    Unknown(ApiError),

    #[error("market data still rate limited after {retries} retries")]
    RateLimitExhausted {
        retries: u32,
        #[source]
        error: ApiError,
    },
}

impl EnrichError {
    fn from_api(error: ApiError) -> Self {
        match error.kind {
            ApiErrorKind::Unauthorized => Self::Unauthorized(error),
            ApiErrorKind::ServerError => Self::ServerError(error),
            _ => Self::Unknown(error),
        }
    }
}

/// Outcome of a request after rate limits were waited out.
enum Attempt<T> {
    Done(T),
    BadRequest(ApiError),
}

/// Resolves identity and latest quotes for canonical symbols.
pub struct MarketDataEnricher {
    api: Arc<dyn MarketDataApi>,
    sleeper: Arc<dyn Sleeper>,
    cooldown: Duration,
    max_rate_limit_retries: Option<u32>,
    /// Serializes requests against the shared rate-limit budget.
    gate: Mutex<()>,
}

impl MarketDataEnricher {
    pub fn new(api: Arc<dyn MarketDataApi>) -> Self {
        Self {
            api,
            sleeper: Arc::new(TokioSleeper),
            cooldown: Duration::from_secs(61),
            max_rate_limit_retries: None,
            gate: Mutex::new(()),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_max_rate_limit_retries(mut self, retries: Option<u32>) -> Self {
        self.max_rate_limit_retries = retries;
        self
    }

    /// Look up market data for every symbol.
    ///
    /// Symbols the provider does not know are missing from the result. Symbols
    /// whose quote could not be fetched are present without a quote.
    pub async fn enrich(
        &self,
        symbols: &BTreeSet<String>,
    ) -> Result<HashMap<String, CoinInfo>, EnrichError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }

        let identities = self.resolve_identities(symbols).await?;
        let mut coins = select_identities(symbols, identities);

        let not_found: Vec<&str> = symbols
            .iter()
            .filter(|s| !coins.contains_key(*s))
            .map(String::as_str)
            .collect();
        if not_found.is_empty() {
            info!(provider = self.api.name(), count = coins.len(), "identity found for all symbols");
        } else {
            warn!(symbols = %not_found.join(","), "symbols not found by market data provider");
        }

        for symbol in symbols {
            let Some(info) = coins.get_mut(symbol) else {
                continue;
            };
            let id = info.id;
            match self
                .call_with_retry("quotes latest", || self.api.quotes_latest(id))
                .await?
            {
                Attempt::Done(Some(quote)) => {
                    info!(symbol = %symbol, "price data found");
                    info.quote = Some(CoinQuote::from_parts(
                        quote.price_usd,
                        quote.max_supply,
                        quote.circulating_supply,
                        quote.total_supply,
                        quote.market_cap,
                    ));
                }
                Attempt::Done(None) => {
                    warn!(symbol = %symbol, id, "price data not found");
                }
                Attempt::BadRequest(e) => {
                    warn!(symbol = %symbol, id, error = %e, "latest quote not found");
                }
            }
        }

        debug!(?coins, "market data extracted");
        Ok(coins)
    }

    /// Batched map lookup. A rejected batch is split into single-symbol
    /// batches; a rejected single symbol is dropped.
    async fn resolve_identities(
        &self,
        symbols: &BTreeSet<String>,
    ) -> Result<Vec<CoinIdentity>, EnrichError> {
        let mut work: VecDeque<Vec<String>> = VecDeque::new();
        work.push_back(symbols.iter().cloned().collect());
        let mut identities = Vec::new();

        while let Some(batch) = work.pop_front() {
            let outcome = self
                .call_with_retry("cryptocurrency map", || self.api.cryptocurrency_map(&batch))
                .await?;

            match outcome {
                Attempt::Done(found) => {
                    info!(symbols = %batch.join(","), "cryptocurrency map extracted");
                    identities.extend(found);
                }
                Attempt::BadRequest(e) if batch.len() == 1 => {
                    warn!(symbol = %batch[0], error = %e, "symbol not found, market data will be missing");
                }
                Attempt::BadRequest(_) => {
                    warn!(count = batch.len(), "batched lookup rejected, retrying one symbol per call");
                    work.extend(batch.into_iter().map(|symbol| vec![symbol]));
                }
            }
        }

        Ok(identities)
    }

    /// Run one request, waiting out rate limits. Bad requests are handed back
    /// to the caller; every other failure is fatal.
    async fn call_with_retry<T, F, Fut>(&self, what: &str, mut call: F) -> Result<Attempt<T>, EnrichError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let _guard = self.gate.lock().await;
        let mut retries = 0u32;

        loop {
            let error = match call().await {
                Ok(value) => return Ok(Attempt::Done(value)),
                Err(e) => e,
            };
            debug!(request = what, error = ?error, "market data request failed");

            match error.kind {
                ApiErrorKind::BadRequest => return Ok(Attempt::BadRequest(error)),
                ApiErrorKind::RateLimited => {
                    if let Some(max) = self.max_rate_limit_retries {
                        if retries >= max {
                            error!(request = what, retries, "rate limit retries exhausted");
                            return Err(EnrichError::RateLimitExhausted { retries, error });
                        }
                    }
                    retries += 1;
                    warn!(
                        request = what,
                        cooldown = %format_duration(self.cooldown),
                        "API limit reached, waiting before retrying"
                    );
                    self.sleeper.sleep(self.cooldown).await;
                }
                _ => {
                    error!(request = what, error = %error, "market data request failed");
                    return Err(EnrichError::from_api(error));
                }
            }
        }
    }
}

/// Keep identities for requested symbols only, first occurrence per symbol.
fn select_identities(
    requested: &BTreeSet<String>,
    identities: Vec<CoinIdentity>,
) -> HashMap<String, CoinInfo> {
    let mut coins = HashMap::new();
    for identity in identities {
        let symbol = identity.symbol.trim().to_uppercase();
        if !requested.contains(&symbol) || coins.contains_key(&symbol) {
            continue;
        }
        let info = CoinInfo::new(symbol.clone(), identity.id, identity.name, identity.rank);
        coins.insert(symbol, info);
    }
    coins
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::RecordingSleeper;
    use crate::market_data::LatestQuote;
    use crate::models::MISSING_RANK;
    use rust_decimal::Decimal;
    use std::sync::Mutex as StdMutex;

    /// Answers from a fixed table; records every map request.
    struct TableApi {
        known: HashMap<String, (u64, Option<i64>)>,
        map_calls: StdMutex<Vec<Vec<String>>>,
        quote_calls: StdMutex<Vec<u64>>,
        failures: StdMutex<VecDeque<ApiError>>,
    }

    impl TableApi {
        fn new(known: &[(&str, u64, Option<i64>)]) -> Self {
            Self {
                known: known
                    .iter()
                    .map(|(s, id, rank)| (s.to_string(), (*id, *rank)))
                    .collect(),
                map_calls: StdMutex::new(Vec::new()),
                quote_calls: StdMutex::new(Vec::new()),
                failures: StdMutex::new(VecDeque::new()),
            }
        }

        fn fail_next(self, error: ApiError) -> Self {
            self.failures.lock().unwrap().push_back(error);
            self
        }
    }

    #[async_trait::async_trait]
    impl MarketDataApi for TableApi {
        async fn cryptocurrency_map(&self, symbols: &[String]) -> Result<Vec<CoinIdentity>, ApiError> {
            self.map_calls.lock().unwrap().push(symbols.to_vec());
            if let Some(e) = self.failures.lock().unwrap().pop_front() {
                return Err(e);
            }
            if symbols.iter().any(|s| !self.known.contains_key(s)) {
                return Err(ApiError::from_response(400, Some(400), "Invalid value for \"symbol\""));
            }
            Ok(symbols
                .iter()
                .map(|s| {
                    let (id, rank) = self.known[s];
                    CoinIdentity { id, symbol: s.clone(), name: format!("{s} coin"), rank }
                })
                .collect())
        }

        async fn quotes_latest(&self, id: u64) -> Result<Option<LatestQuote>, ApiError> {
            self.quote_calls.lock().unwrap().push(id);
            Ok(Some(LatestQuote {
                price_usd: Some(Decimal::from(id)),
                market_cap: Some(Decimal::from(id * 1000)),
                ..LatestQuote::default()
            }))
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    fn symbols(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_empty_symbol_set_makes_no_calls() {
        let api = Arc::new(TableApi::new(&[]));
        let enricher = MarketDataEnricher::new(api.clone());

        let result = enricher.enrich(&BTreeSet::new()).await.unwrap();

        assert!(result.is_empty());
        assert!(api.map_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_symbol_splits_batch() {
        let api = Arc::new(TableApi::new(&[("BTC", 1, Some(1)), ("ETH", 1027, Some(2))]));
        let enricher = MarketDataEnricher::new(api.clone());

        let result = enricher.enrich(&symbols(&["BTC", "ETH", "NOPE"])).await.unwrap();

        assert_eq!(result.len(), 2);
        assert!(!result.contains_key("NOPE"));
        // One batched call, then one per symbol.
        assert_eq!(api.map_calls.lock().unwrap().len(), 4);
        assert_eq!(result["ETH"].price_usd(), Some(Decimal::from(1027)));
    }

    #[tokio::test]
    async fn test_rate_limit_sleeps_then_retries() {
        let api = Arc::new(
            TableApi::new(&[("BTC", 1, Some(1))])
                .fail_next(ApiError::from_response(429, Some(1008), "rate limit")),
        );
        let sleeper = Arc::new(RecordingSleeper::new());
        let enricher = MarketDataEnricher::new(api.clone()).with_sleeper(sleeper.clone());

        let result = enricher.enrich(&symbols(&["BTC"])).await.unwrap();

        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(61)]);
        assert_eq!(result["BTC"].id, 1);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_can_be_capped() {
        let api = Arc::new(
            TableApi::new(&[("BTC", 1, Some(1))])
                .fail_next(ApiError::from_response(429, None, "rate limit"))
                .fail_next(ApiError::from_response(429, None, "rate limit")),
        );
        let sleeper = Arc::new(RecordingSleeper::new());
        let enricher = MarketDataEnricher::new(api)
            .with_sleeper(sleeper.clone())
            .with_max_rate_limit_retries(Some(1));

        let err = enricher.enrich(&symbols(&["BTC"])).await.unwrap_err();

        assert!(matches!(err, EnrichError::RateLimitExhausted { retries: 1, .. }));
        assert_eq!(sleeper.sleeps().len(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_is_fatal() {
        let api = Arc::new(
            TableApi::new(&[("BTC", 1, Some(1))])
                .fail_next(ApiError::from_response(401, Some(1002), "API key missing")),
        );
        let enricher = MarketDataEnricher::new(api);

        let err = enricher.enrich(&symbols(&["BTC"])).await.unwrap_err();
        assert!(matches!(err, EnrichError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_fatal() {
        let api = Arc::new(
            TableApi::new(&[("BTC", 1, Some(1))])
                .fail_next(ApiError::from_response(500, None, "internal error")),
        );
        let enricher = MarketDataEnricher::new(api);

        let err = enricher.enrich(&symbols(&["BTC"])).await.unwrap_err();
        assert!(matches!(err, EnrichError::ServerError(_)));
    }

    #[test]
    fn test_select_identities_keeps_first_and_requested() {
        let requested = symbols(&["BTC"]);
        let coins = select_identities(
            &requested,
            vec![
                CoinIdentity { id: 1, symbol: "btc".into(), name: "Bitcoin".into(), rank: None },
                CoinIdentity { id: 2, symbol: "BTC".into(), name: "Clone".into(), rank: Some(900) },
                CoinIdentity { id: 3, symbol: "XYZ".into(), name: "Other".into(), rank: Some(5) },
            ],
        );

        assert_eq!(coins.len(), 1);
        assert_eq!(coins["BTC"].id, 1);
        assert_eq!(coins["BTC"].rank, MISSING_RANK);
    }
}
