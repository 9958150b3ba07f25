//! Report files: the portfolio table as raw CSV or a styled spreadsheet.

mod csv;
mod xlsx;

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::info;

use crate::clock::Clock;
use crate::portfolio::PortfolioRow;

pub const COLUMNS: [&str; 12] = [
    "Exchange(s) / Network(s)",
    "Symbol",
    "Full Name",
    "Coin Rank",
    "Balance",
    "Price (USD)",
    "Max Supply",
    "Circulating Supply",
    "Total Supply",
    "Market Cap",
    "Total Value (USD)",
    "Portfolio Percentage",
];

const FILE_PREFIX: &str = "crypto_portfolio_report";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    Csv,
    #[default]
    Xlsx,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Csv => "csv",
            ReportFormat::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// `crypto_portfolio_report_<YYYYmmdd_HHMMSS>.<ext>` stamped with the clock's
/// local time.
pub fn report_file_name(clock: &dyn Clock, format: ReportFormat) -> String {
    format!(
        "{FILE_PREFIX}_{}.{}",
        clock.now().format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Writes the report into `dir`, creating it if needed, and returns the file path.
///
/// The spreadsheet leaves out rows worth less than `min_styled_value_usd`
/// (unpriced rows included). CSV keeps every row.
pub fn write_report(
    rows: &[PortfolioRow],
    dir: &Path,
    format: ReportFormat,
    clock: &dyn Clock,
    min_styled_value_usd: Decimal,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report directory: {}", dir.display()))?;
    let path = dir.join(report_file_name(clock, format));

    match format {
        ReportFormat::Csv => csv::write(rows, &path)?,
        ReportFormat::Xlsx => {
            let styled: Vec<&PortfolioRow> = rows
                .iter()
                .filter(|row| row.total_value_usd.is_some_and(|v| v >= min_styled_value_usd))
                .collect();
            xlsx::write(&styled, &path)?;
        }
    }

    info!(path = %path.display(), format = %format, rows = rows.len(), "report written");
    Ok(path)
}
