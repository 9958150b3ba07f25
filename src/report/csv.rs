use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

use super::COLUMNS;
use crate::format::format_decimal;
use crate::portfolio::PortfolioRow;

fn cell(value: Option<Decimal>) -> String {
    value.map(format_decimal).unwrap_or_default()
}

fn record(row: &PortfolioRow) -> [String; 12] {
    [
        row.sources_display(),
        row.symbol.clone(),
        row.name.clone().unwrap_or_default(),
        row.rank.map(|r| r.to_string()).unwrap_or_default(),
        format_decimal(row.balance),
        cell(row.effective_price_usd),
        cell(row.max_supply),
        cell(row.circulating_supply),
        cell(row.total_supply),
        cell(row.effective_market_cap),
        cell(row.total_value_usd),
        cell(row.portfolio_percentage),
    ]
}

pub(super) fn write(rows: &[PortfolioRow], path: &Path) -> Result<()> {
    let mut writer = ::csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(COLUMNS)?;
    for row in rows {
        writer.write_record(record(row))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
