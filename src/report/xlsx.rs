use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use super::COLUMNS;
use crate::portfolio::PortfolioRow;

const SHEET_NAME: &str = "Portfolio";
const USD_FORMAT: &str = "$#,##0.00";
const PRICE_FORMAT: &str = "$#,##0.00######";
const AMOUNT_FORMAT: &str = "#,##0.########";
const PERCENT_FORMAT: &str = "0.00%";

struct Formats {
    header: Format,
    usd: Format,
    price: Format,
    amount: Format,
    percent: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new().set_bold(),
            usd: Format::new().set_num_format(USD_FORMAT),
            price: Format::new().set_num_format(PRICE_FORMAT),
            amount: Format::new().set_num_format(AMOUNT_FORMAT),
            percent: Format::new().set_num_format(PERCENT_FORMAT),
        }
    }
}

fn write_number(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: Option<Decimal>,
    format: &Format,
) -> Result<(), XlsxError> {
    match value.and_then(|v| v.to_f64()) {
        Some(number) => sheet.write_number_with_format(row, col, number, format).map(|_| ()),
        None => Ok(()),
    }
}

fn write_row(sheet: &mut Worksheet, index: u32, row: &PortfolioRow, formats: &Formats) -> Result<(), XlsxError> {
    sheet.write_string(index, 0, row.sources_display())?;
    sheet.write_string(index, 1, &row.symbol)?;
    if let Some(name) = &row.name {
        sheet.write_string(index, 2, name)?;
    }
    if let Some(rank) = row.rank {
        sheet.write_number(index, 3, rank as f64)?;
    }
    write_number(sheet, index, 4, Some(row.balance), &formats.amount)?;
    write_number(sheet, index, 5, row.effective_price_usd, &formats.price)?;
    write_number(sheet, index, 6, row.max_supply, &formats.amount)?;
    write_number(sheet, index, 7, row.circulating_supply, &formats.amount)?;
    write_number(sheet, index, 8, row.total_supply, &formats.amount)?;
    write_number(sheet, index, 9, row.effective_market_cap, &formats.usd)?;
    write_number(sheet, index, 10, row.total_value_usd, &formats.usd)?;
    write_number(sheet, index, 11, row.portfolio_percentage, &formats.percent)?;
    Ok(())
}

fn build(rows: &[&PortfolioRow], path: &Path) -> Result<(), XlsxError> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, title) in COLUMNS.iter().enumerate() {
        let col = col as u16;
        sheet.write_string_with_format(0, col, *title, &formats.header)?;
        sheet.set_column_width(col, (title.len() + 4) as f64)?;
    }
    sheet.set_column_width(0, 40)?;

    for (offset, row) in rows.iter().enumerate() {
        write_row(sheet, offset as u32 + 1, row, &formats)?;
    }

    sheet.set_freeze_panes(1, 0)?;
    sheet.autofilter(0, 0, rows.len() as u32, (COLUMNS.len() - 1) as u16)?;

    workbook.save(path)
}

pub(super) fn write(rows: &[&PortfolioRow], path: &Path) -> Result<()> {
    build(rows, path).with_context(|| format!("Failed to write {}", path.display()))
}
