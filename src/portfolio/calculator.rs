// src/portfolio/calculator.rs
use std::cmp::Ordering;
use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::warn;

use super::PortfolioRow;
use crate::models::{CoinInfo, GroupedBalance};

/// Join grouped balances with market data and compute value and share.
///
/// Rows are ordered by total value, largest first, with unpriced rows last.
pub fn compute(grouped: Vec<GroupedBalance>, coins: &HashMap<String, CoinInfo>) -> Vec<PortfolioRow> {
    let mut rows: Vec<PortfolioRow> = grouped
        .into_iter()
        .map(|group| {
            let coin = coins.get(&group.symbol);
            build_row(group, coin)
        })
        .collect();

    let total = total_value(&rows);

    if !total.is_zero() {
        for row in &mut rows {
            row.portfolio_percentage = row
                .total_value_usd
                .and_then(|value| value.checked_div(total));
        }
    }

    rows.sort_by(compare_rows);
    rows
}

/// Sum of every priced row. An addition that would overflow is skipped
/// with a warning and the running total is kept.
pub fn total_value(rows: &[PortfolioRow]) -> Decimal {
    rows.iter()
        .filter_map(|row| row.total_value_usd.map(|value| (row, value)))
        .fold(Decimal::ZERO, |acc, (row, value)| match acc.checked_add(value) {
            Some(sum) => sum,
            None => {
                warn!(symbol = %row.symbol, "portfolio total out of range, row left out of the total");
                acc
            }
        })
}

fn build_row(group: GroupedBalance, coin: Option<&CoinInfo>) -> PortfolioRow {
    let quote = coin.and_then(|c| c.quote.as_ref());

    let effective_price_usd = coin
        .and_then(CoinInfo::price_usd)
        .or(group.backup_price_usd);
    let effective_market_cap = coin
        .and_then(CoinInfo::known_market_cap)
        .or(group.backup_market_cap)
        .or_else(|| quote.map(|q| q.market_cap));

    let total_value_usd = effective_price_usd.and_then(|price| {
        let value = group.balance.checked_mul(price);
        if value.is_none() {
            warn!(symbol = %group.symbol, "total value out of range");
        }
        value
    });

    PortfolioRow {
        sources: group.sources,
        symbol: group.symbol,
        name: coin.map(|c| c.name.clone()),
        rank: coin.map(|c| c.rank),
        balance: group.balance,
        max_supply: quote.map(|q| q.max_supply),
        circulating_supply: quote.map(|q| q.circulating_supply),
        total_supply: quote.map(|q| q.total_supply),
        effective_price_usd,
        effective_market_cap,
        total_value_usd,
        portfolio_percentage: None,
    }
}

fn compare_rows(a: &PortfolioRow, b: &PortfolioRow) -> Ordering {
    match (a.total_value_usd, b.total_value_usd) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.symbol.cmp(&b.symbol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CoinQuote, MISSING_NUMBER};
    use std::collections::BTreeSet;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn group(symbol: &str, balance: &str) -> GroupedBalance {
        GroupedBalance {
            symbol: symbol.to_string(),
            sources: BTreeSet::from(["Test".to_string()]),
            balance: dec(balance),
            backup_price_usd: None,
            backup_market_cap: None,
        }
    }

    fn priced(symbol: &str, price: &str) -> CoinInfo {
        CoinInfo::new(symbol, 1, format!("{symbol} coin"), Some(1)).with_quote(CoinQuote::from_parts(
            Some(dec(price)),
            None,
            None,
            None,
            Some(dec("1000")),
        ))
    }

    #[test]
    fn test_backup_price_used_without_coin_info() {
        let mut g = group("NEW", "10");
        g.backup_price_usd = Some(dec("2.0"));

        let rows = compute(vec![g], &HashMap::new());

        assert_eq!(rows[0].total_value_usd, Some(dec("20.0")));
        assert_eq!(rows[0].portfolio_percentage, Some(Decimal::ONE));
        assert_eq!(rows[0].name, None);
    }

    #[test]
    fn test_market_price_wins_over_backup() {
        let mut g = group("SOL", "2");
        g.backup_price_usd = Some(dec("1"));
        let coins = HashMap::from([("SOL".to_string(), priced("SOL", "150"))]);

        let rows = compute(vec![g], &coins);

        assert_eq!(rows[0].effective_price_usd, Some(dec("150")));
        assert_eq!(rows[0].total_value_usd, Some(dec("300")));
        assert_eq!(rows[0].max_supply, Some(MISSING_NUMBER));
    }

    #[test]
    fn test_unresolved_row_kept_without_value() {
        let coins = HashMap::from([("BTC".to_string(), priced("BTC", "100"))]);
        let identity_only = CoinInfo::new("ODD", 9, "Odd", None);
        let coins: HashMap<String, CoinInfo> = coins
            .into_iter()
            .chain([("ODD".to_string(), identity_only)])
            .collect();

        let rows = compute(vec![group("ODD", "5"), group("BTC", "1")], &coins);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].symbol, "BTC");
        assert_eq!(rows[1].symbol, "ODD");
        assert_eq!(rows[1].total_value_usd, None);
        assert_eq!(rows[1].portfolio_percentage, None);
        assert_eq!(rows[1].rank, Some(-1));
        assert_eq!(rows[0].portfolio_percentage, Some(Decimal::ONE));
    }

    #[test]
    fn test_market_cap_falls_back_to_backup_then_marker() {
        let mut with_backup = group("A", "1");
        with_backup.backup_market_cap = Some(dec("500"));
        let no_cap = CoinInfo::new("A", 1, "A", Some(1))
            .with_quote(CoinQuote::from_parts(Some(dec("1")), None, None, None, None));
        let coins = HashMap::from([
            ("A".to_string(), no_cap.clone()),
            ("B".to_string(), CoinInfo { symbol: "B".into(), ..no_cap }),
        ]);

        let rows = compute(vec![with_backup, group("B", "1")], &coins);
        let by_symbol: HashMap<_, _> = rows.iter().map(|r| (r.symbol.as_str(), r)).collect();

        assert_eq!(by_symbol["A"].effective_market_cap, Some(dec("500")));
        assert_eq!(by_symbol["B"].effective_market_cap, Some(MISSING_NUMBER));
    }

    #[test]
    fn test_zero_total_leaves_percentages_unset() {
        let coins = HashMap::from([("DUST".to_string(), priced("DUST", "0"))]);
        let rows = compute(vec![group("DUST", "3")], &coins);

        assert_eq!(rows[0].total_value_usd, Some(Decimal::ZERO));
        assert_eq!(rows[0].portfolio_percentage, None);
    }

    #[test]
    fn test_total_overflow_keeps_running_sum() {
        let half = (Decimal::MAX / Decimal::TWO).trunc() + Decimal::ONE;
        let coins = HashMap::from([
            ("A".to_string(), priced("A", "1")),
            ("B".to_string(), priced("B", "1")),
        ]);
        let mut a = group("A", "1");
        a.balance = half;
        let mut b = group("B", "1");
        b.balance = half;

        let rows = compute(vec![a, b], &coins);

        assert_eq!(rows.len(), 2);
        assert_eq!(total_value(&rows), half);
        assert!(rows.iter().all(|r| r.total_value_usd == Some(half)));
        assert!(rows.iter().all(|r| r.portfolio_percentage == Some(Decimal::ONE)));
    }

    #[test]
    fn test_percentages_sum_to_one_and_sorted_desc() {
        let coins = HashMap::from([
            ("BTC".to_string(), priced("BTC", "100")),
            ("ETH".to_string(), priced("ETH", "10")),
        ]);

        let rows = compute(vec![group("ETH", "3"), group("BTC", "1")], &coins);

        assert_eq!(rows[0].symbol, "BTC");
        let sum: Decimal = rows.iter().filter_map(|r| r.portfolio_percentage).sum();
        assert!((sum - Decimal::ONE).abs() < dec("0.0000001"));
    }

    #[test]
    fn test_ties_broken_by_symbol() {
        let coins = HashMap::from([
            ("ZZZ".to_string(), priced("ZZZ", "1")),
            ("AAA".to_string(), priced("AAA", "1")),
        ]);
        let rows = compute(vec![group("ZZZ", "1"), group("AAA", "1")], &coins);
        assert_eq!(rows[0].symbol, "AAA");
    }
}
