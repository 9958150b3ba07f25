use std::fmt;

use rust_decimal::Decimal;

/// One entry of the symbol → coin identity map.
#[derive(Debug, Clone, PartialEq)]
pub struct CoinIdentity {
    pub id: u64,
    pub symbol: String,
    pub name: String,
    pub rank: Option<i64>,
}

/// Latest USD quote for one coin id. Absent upstream fields stay `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LatestQuote {
    pub price_usd: Option<Decimal>,
    pub max_supply: Option<Decimal>,
    pub circulating_supply: Option<Decimal>,
    pub total_supply: Option<Decimal>,
    pub market_cap: Option<Decimal>,
}

/// How the enrichment pipeline should react to a failed API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// One or more requested symbols/ids are unknown.
    BadRequest,
    /// Key missing, invalid or lacking permissions.
    Unauthorized,
    /// Per-minute request budget exhausted; retry after a cooldown.
    RateLimited,
    /// The provider failed internally.
    ServerError,
    Unknown,
}

impl ApiErrorKind {
    /// Classify a failure from the HTTP status and the provider's own error
    /// code. A non-zero provider code wins over the HTTP status.
    pub fn classify(http_status: Option<u16>, error_code: Option<i64>) -> Self {
        match error_code.filter(|code| *code != 0) {
            Some(400) => Self::BadRequest,
            Some(401 | 403 | 1001..=1007) => Self::Unauthorized,
            Some(429 | 1008 | 1011) => Self::RateLimited,
            Some(500) => Self::ServerError,
            Some(_) => Self::Unknown,
            None => match http_status {
                Some(400) => Self::BadRequest,
                Some(401 | 403) => Self::Unauthorized,
                Some(429) => Self::RateLimited,
                Some(500..=599) => Self::ServerError,
                _ => Self::Unknown,
            },
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BadRequest => "bad request",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate limited",
            Self::ServerError => "server error",
            Self::Unknown => "unknown error",
        };
        f.write_str(label)
    }
}

/// A failed market-data API call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} (status {status:?}, code {code:?}): {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: Option<u16>,
    pub code: Option<i64>,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// Build a classified error from a provider response.
    pub fn from_response(status: u16, code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::classify(Some(status), code),
            status: Some(status),
            code,
            message: message.into(),
        }
    }
}

/// Market-data provider with separate identity and quote endpoints.
#[async_trait::async_trait]
pub trait MarketDataApi: Send + Sync {
    /// Look up coin identities for a batch of symbols in one call.
    async fn cryptocurrency_map(&self, symbols: &[String]) -> Result<Vec<CoinIdentity>, ApiError>;

    /// Latest quote for a coin id. `Ok(None)` when the response has no entry for it.
    async fn quotes_latest(&self, id: u64) -> Result<Option<LatestQuote>, ApiError>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_http_status() {
        assert_eq!(ApiErrorKind::classify(Some(400), None), ApiErrorKind::BadRequest);
        assert_eq!(ApiErrorKind::classify(Some(401), None), ApiErrorKind::Unauthorized);
        assert_eq!(ApiErrorKind::classify(Some(403), None), ApiErrorKind::Unauthorized);
        assert_eq!(ApiErrorKind::classify(Some(429), None), ApiErrorKind::RateLimited);
        assert_eq!(ApiErrorKind::classify(Some(500), None), ApiErrorKind::ServerError);
        assert_eq!(ApiErrorKind::classify(Some(503), None), ApiErrorKind::ServerError);
        assert_eq!(ApiErrorKind::classify(Some(418), None), ApiErrorKind::Unknown);
        assert_eq!(ApiErrorKind::classify(None, None), ApiErrorKind::Unknown);
    }

    #[test]
    fn test_provider_code_wins_over_status() {
        assert_eq!(ApiErrorKind::classify(Some(429), Some(1008)), ApiErrorKind::RateLimited);
        assert_eq!(ApiErrorKind::classify(Some(401), Some(1001)), ApiErrorKind::Unauthorized);
        assert_eq!(ApiErrorKind::classify(Some(403), Some(1006)), ApiErrorKind::Unauthorized);
        assert_eq!(ApiErrorKind::classify(Some(200), Some(400)), ApiErrorKind::BadRequest);
        // Daily and monthly caps do not recover after a short cooldown.
        assert_eq!(ApiErrorKind::classify(Some(429), Some(1009)), ApiErrorKind::Unknown);
        assert_eq!(ApiErrorKind::classify(Some(429), Some(1010)), ApiErrorKind::Unknown);
    }

    #[test]
    fn test_zero_code_falls_back_to_status() {
        assert_eq!(ApiErrorKind::classify(Some(500), Some(0)), ApiErrorKind::ServerError);
    }

    #[test]
    fn test_error_message_includes_kind() {
        let err = ApiError::from_response(429, Some(1008), "You've exceeded your API Key's HTTP request rate limit");
        assert_eq!(err.kind, ApiErrorKind::RateLimited);
        assert!(err.to_string().starts_with("rate limited"));
    }
}
