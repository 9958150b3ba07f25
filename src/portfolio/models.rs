// src/portfolio/models.rs
use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::Serialize;

/// One line of the portfolio report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioRow {
    pub sources: BTreeSet<String>,
    pub symbol: String,
    pub name: Option<String>,
    pub rank: Option<i64>,
    pub balance: Decimal,
    pub max_supply: Option<Decimal>,
    pub circulating_supply: Option<Decimal>,
    pub total_supply: Option<Decimal>,
    /// Market price, or the source's backup price when the market has none.
    pub effective_price_usd: Option<Decimal>,
    pub effective_market_cap: Option<Decimal>,
    /// None when no price could be resolved. Never zero as a stand-in.
    pub total_value_usd: Option<Decimal>,
    /// Share of the summed resolved value, in 0..=1.
    pub portfolio_percentage: Option<Decimal>,
}

impl PortfolioRow {
    pub fn sources_display(&self) -> String {
        self.sources.iter().cloned().collect::<Vec<_>>().join("|")
    }
}
