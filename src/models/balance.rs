use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One balance line as reported by a source (exchange wallet, network address,
/// manual entry). The symbol is source-native; grouping normalizes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBalanceRecord {
    /// Human-readable provenance, e.g. "Binance (Spot)" or "Ethereum Wallet".
    pub source: String,
    pub symbol: String,
    /// Always strictly positive; sources drop empty balances.
    pub balance: Decimal,
    /// Price carried by the source itself, used when market data has none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_price_usd: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_market_cap: Option<Decimal>,
}

impl RawBalanceRecord {
    pub fn new(source: impl Into<String>, symbol: impl Into<String>, balance: Decimal) -> Self {
        Self {
            source: source.into(),
            symbol: symbol.into(),
            balance,
            backup_price_usd: None,
            backup_market_cap: None,
        }
    }

    pub fn with_backup_price(mut self, price_usd: Decimal) -> Self {
        self.backup_price_usd = Some(price_usd);
        self
    }

    pub fn with_backup_market_cap(mut self, market_cap: Decimal) -> Self {
        self.backup_market_cap = Some(market_cap);
        self
    }
}

/// All balances of one canonical symbol, summed across sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedBalance {
    pub symbol: String,
    pub sources: BTreeSet<String>,
    pub balance: Decimal,
    pub backup_price_usd: Option<Decimal>,
    pub backup_market_cap: Option<Decimal>,
}

impl GroupedBalance {
    /// Sources joined for display, e.g. "Binance (Spot)|Gate (Earn)".
    pub fn sources_display(&self) -> String {
        self.sources.iter().cloned().collect::<Vec<_>>().join("|")
    }
}
