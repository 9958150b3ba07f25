mod enricher;
mod provider;
pub mod providers;

pub use enricher::{EnrichError, MarketDataEnricher};
pub use provider::{ApiError, ApiErrorKind, CoinIdentity, LatestQuote, MarketDataApi};
