// src/portfolio/aggregate.rs
use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::models::{GroupedBalance, RawBalanceRecord};
use crate::symbols::normalize;

/// Group raw records by canonical symbol.
///
/// Balances are summed, sources are unioned and backup values keep the
/// largest one reported. The result is ordered by symbol.
pub fn aggregate(records: &[RawBalanceRecord]) -> Vec<GroupedBalance> {
    let mut groups: BTreeMap<String, GroupedBalance> = BTreeMap::new();

    for record in records {
        let symbol = normalize(&record.symbol);
        let group = groups
            .entry(symbol.clone())
            .or_insert_with(|| GroupedBalance {
                symbol,
                sources: BTreeSet::new(),
                balance: Default::default(),
                backup_price_usd: None,
                backup_market_cap: None,
            });

        group.sources.insert(record.source.clone());
        match group.balance.checked_add(record.balance) {
            Some(sum) => group.balance = sum,
            None => warn!(
                symbol = %group.symbol,
                source = %record.source,
                "balance sum out of range, record left out"
            ),
        }
        group.backup_price_usd = group.backup_price_usd.max(record.backup_price_usd);
        group.backup_market_cap = group.backup_market_cap.max(record.backup_market_cap);
    }

    groups.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate(&[]).is_empty());
    }

    #[test]
    fn test_same_symbol_two_sources() {
        let grouped = aggregate(&[
            RawBalanceRecord::new("X", "ETH", dec("1.5")),
            RawBalanceRecord::new("Y", "eth", dec("0.5")),
        ]);

        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].symbol, "ETH");
        assert_eq!(grouped[0].balance, dec("2.0"));
        assert_eq!(grouped[0].sources_display(), "X|Y");
    }

    #[test]
    fn test_renamed_ticker_merges_into_canonical() {
        let grouped = aggregate(&[
            RawBalanceRecord::new("Gate (Spot)", "BEAMX", dec("100")),
            RawBalanceRecord::new("Binance (Spot)", "BEAM", dec("50")),
        ]);

        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].symbol, "BEAM");
        assert_eq!(grouped[0].balance, dec("150"));
        assert_eq!(grouped[0].sources.len(), 2);
    }

    #[test]
    fn test_same_source_counted_once() {
        let grouped = aggregate(&[
            RawBalanceRecord::new("Solana", "SOL", dec("1")),
            RawBalanceRecord::new("Solana", "SOL", dec("2")),
        ]);

        assert_eq!(grouped[0].sources.len(), 1);
        assert_eq!(grouped[0].balance, dec("3"));
    }

    #[test]
    fn test_backups_take_max_ignoring_missing() {
        let grouped = aggregate(&[
            RawBalanceRecord::new("Solana", "BONK", dec("10")).with_backup_price(dec("0.2")),
            RawBalanceRecord::new("Manual", "BONK", dec("5")),
            RawBalanceRecord::new("Solana", "BONK", dec("1"))
                .with_backup_price(dec("0.1"))
                .with_backup_market_cap(dec("1000")),
        ]);

        assert_eq!(grouped[0].backup_price_usd, Some(dec("0.2")));
        assert_eq!(grouped[0].backup_market_cap, Some(dec("1000")));
    }

    #[test]
    fn test_overflowing_sum_keeps_current_balance() {
        let half = (Decimal::MAX / Decimal::TWO).trunc() + Decimal::ONE;
        let grouped = aggregate(&[
            RawBalanceRecord::new("A", "X", half),
            RawBalanceRecord::new("B", "X", half),
        ]);

        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].balance, half);
        assert_eq!(grouped[0].sources_display(), "A|B");
    }

    #[test]
    fn test_output_sorted_by_symbol() {
        let grouped = aggregate(&[
            RawBalanceRecord::new("A", "SOL", dec("1")),
            RawBalanceRecord::new("A", "BTC", dec("1")),
            RawBalanceRecord::new("A", "ETH", dec("1")),
        ]);
        let symbols: Vec<_> = grouped.iter().map(|g| g.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTC", "ETH", "SOL"]);
    }
}
