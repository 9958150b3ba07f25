//! Balances entered by hand in a CSV file.
//!
//! Header: `source,symbol,balance`, optionally followed by
//! `backup_price_usd,backup_market_cap`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use super::{collect_wallet, BalanceSource};
use crate::decimal::parse_decimal;
use crate::models::RawBalanceRecord;

pub struct ManualSource {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ManualRow {
    source: String,
    symbol: String,
    balance: String,
    #[serde(default)]
    backup_price_usd: Option<String>,
    #[serde(default)]
    backup_market_cap: Option<String>,
}

/// Optional backup cell. An unreadable value is dropped with a warning and
/// the row is kept.
fn backup_cell(value: Option<&str>, column: &str, line: usize) -> Option<Decimal> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match parse_decimal(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(source = "manual", line, column, error = %e, "unreadable backup value, ignoring it");
            None
        }
    }
}

impl ManualSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_balances(&self) -> Result<Vec<RawBalanceRecord>> {
        info!(source = "manual", path = %self.path.display(), "reading manual balances");
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut records = Vec::new();
        for (index, row) in reader.deserialize::<ManualRow>().enumerate() {
            let line = index + 2;
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(source = "manual", line, error = %e, "unreadable row, skipping");
                    continue;
                }
            };

            let balance = match parse_decimal(&row.balance) {
                Ok(balance) if balance > Decimal::ZERO => balance,
                Ok(_) => {
                    warn!(source = "manual", line, symbol = %row.symbol, "non-positive balance, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(source = "manual", line, error = %e, "unreadable balance, skipping");
                    continue;
                }
            };

            let mut record = RawBalanceRecord::new(row.source, row.symbol, balance);
            record.backup_price_usd = backup_cell(row.backup_price_usd.as_deref(), "backup_price_usd", line);
            record.backup_market_cap = backup_cell(row.backup_market_cap.as_deref(), "backup_market_cap", line);
            records.push(record);
        }

        Ok(records)
    }
}

#[async_trait::async_trait]
impl BalanceSource for ManualSource {
    fn name(&self) -> &str {
        "manual"
    }

    async fn get_balances(&self) -> Vec<RawBalanceRecord> {
        collect_wallet(self.name(), "csv", self.read_balances())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn write_csv(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("manual.csv");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_reads_rows_and_skips_non_positive() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "source,symbol,balance\nBingX (Wealth),USDT, 120.5\nLedger,BTC,0\nLedger,ETH,-1\n",
        );

        let records = ManualSource::new(path).get_balances().await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "BingX (Wealth)");
        assert_eq!(records[0].balance, Decimal::from_str("120.5").unwrap());
        assert!(records[0].backup_price_usd.is_none());
    }

    #[tokio::test]
    async fn test_optional_backup_columns() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "source,symbol,balance,backup_price_usd,backup_market_cap\nPresale,NEW,1000,0.05,\n",
        );

        let records = ManualSource::new(path).get_balances().await;

        assert_eq!(records[0].backup_price_usd, Some(Decimal::from_str("0.05").unwrap()));
        assert_eq!(records[0].backup_market_cap, None);
    }

    #[test]
    fn test_bad_row_skipped_and_bad_backup_ignored() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "source,symbol,balance,backup_price_usd,backup_market_cap\nLedger,BTC,1,\nLedger,SOL\nLedger,ETH,2,n/a,oops\n",
        );

        let records = ManualSource::new(path).read_balances().unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symbol, "BTC");
        assert_eq!(records[1].symbol, "ETH");
        assert_eq!(records[1].balance, Decimal::from(2));
        assert_eq!(records[1].backup_price_usd, None);
        assert_eq!(records[1].backup_market_cap, None);
    }

    #[tokio::test]
    async fn test_missing_file_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let records = ManualSource::new(dir.path().join("missing.csv")).get_balances().await;
        assert!(records.is_empty());
    }
}
