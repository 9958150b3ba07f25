use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Marker for numeric market fields the upstream API left empty.
pub const MISSING_NUMBER: Decimal = Decimal::NEGATIVE_ONE;

/// Marker for an unranked coin.
pub const MISSING_RANK: i64 = -1;

/// Market data for one canonical symbol.
///
/// Identity fields always come from the map lookup. `quote` is only present
/// when the latest-quote lookup for `id` succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinInfo {
    pub symbol: String,
    pub id: u64,
    pub name: String,
    pub rank: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<CoinQuote>,
}

/// Latest USD quote. Supply and market cap fields hold [`MISSING_NUMBER`] when
/// the upstream response omits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinQuote {
    pub price_usd: Option<Decimal>,
    pub max_supply: Decimal,
    pub circulating_supply: Decimal,
    pub total_supply: Decimal,
    pub market_cap: Decimal,
}

impl CoinInfo {
    pub fn new(symbol: impl Into<String>, id: u64, name: impl Into<String>, rank: Option<i64>) -> Self {
        Self {
            symbol: symbol.into(),
            id,
            name: name.into(),
            rank: rank.unwrap_or(MISSING_RANK),
            quote: None,
        }
    }

    pub fn with_quote(mut self, quote: CoinQuote) -> Self {
        self.quote = Some(quote);
        self
    }

    pub fn price_usd(&self) -> Option<Decimal> {
        self.quote.as_ref().and_then(|q| q.price_usd)
    }

    /// Market cap from the quote, unless it is the missing marker.
    pub fn known_market_cap(&self) -> Option<Decimal> {
        self.quote
            .as_ref()
            .map(|q| q.market_cap)
            .filter(|cap| *cap != MISSING_NUMBER)
    }
}

impl CoinQuote {
    /// Builds a quote, substituting the missing marker for absent numbers.
    pub fn from_parts(
        price_usd: Option<Decimal>,
        max_supply: Option<Decimal>,
        circulating_supply: Option<Decimal>,
        total_supply: Option<Decimal>,
        market_cap: Option<Decimal>,
    ) -> Self {
        Self {
            price_usd,
            max_supply: max_supply.unwrap_or(MISSING_NUMBER),
            circulating_supply: circulating_supply.unwrap_or(MISSING_NUMBER),
            total_supply: total_supply.unwrap_or(MISSING_NUMBER),
            market_cap: market_cap.unwrap_or(MISSING_NUMBER),
        }
    }
}
