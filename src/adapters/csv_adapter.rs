//! Portfolio CSV import and export.
//!
//! Columns: `symbol,coins,avg_cost_ccy,avg_cost_per_unit`.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::asset::AssetUpsert;
use crate::domain::error::BalancerError;
use crate::domain::portfolio::PositionUpsert;
use crate::domain::positions::ImportSummary;
use crate::ports::store_port::StorePort;

pub const CSV_HEADER: [&str; 4] = ["symbol", "coins", "avg_cost_ccy", "avg_cost_per_unit"];

#[derive(Debug, Serialize)]
struct CsvRowOut<'a> {
    symbol: &'a str,
    coins: f64,
    avg_cost_ccy: &'a str,
    avg_cost_per_unit: f64,
}

/// Every column is read as text so a bad number degrades to zero instead of
/// failing the whole file.
#[derive(Debug, Deserialize)]
struct CsvRowIn {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    coins: String,
    #[serde(default)]
    avg_cost_ccy: String,
    #[serde(default)]
    avg_cost_per_unit: String,
}

fn csv_error(e: csv::Error) -> BalancerError {
    BalancerError::Decode {
        what: "portfolio csv".into(),
        reason: e.to_string(),
    }
}

fn number_or_zero(raw: &str) -> f64 {
    raw.trim().parse().ok().filter(|v: &f64| v.is_finite()).unwrap_or(0.0)
}

/// Writes the positions of `portfolio`. An unknown portfolio produces no
/// output at all, not even a header. Returns the number of rows written.
pub fn write_portfolio_csv<W: Write>(
    store: &dyn StorePort,
    writer: W,
    portfolio: &str,
) -> Result<usize, BalancerError> {
    if store.find_portfolio(portfolio)?.is_none() {
        log::warn!("portfolio {portfolio} not found, nothing to export");
        return Ok(0);
    }
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER).map_err(csv_error)?;
    let holdings = store.holdings(Some(portfolio))?;
    for h in &holdings {
        let ccy = if h.position.avg_cost_ccy.is_empty() { "GBP" } else { &h.position.avg_cost_ccy };
        wtr.serialize(CsvRowOut {
            symbol: &h.asset.symbol,
            coins: h.position.coins,
            avg_cost_ccy: ccy,
            avg_cost_per_unit: h.position.avg_cost_per_unit,
        })
        .map_err(csv_error)?;
    }
    wtr.flush()?;
    Ok(holdings.len())
}

pub fn export_portfolio_csv(
    store: &dyn StorePort,
    path: &Path,
    portfolio: &str,
) -> Result<usize, BalancerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    write_portfolio_csv(store, file, portfolio)
}

/// Upserts assets by symbol and sets coins and average cost on each
/// position. Rows without a symbol are skipped.
pub fn read_portfolio_csv<R: Read>(
    store: &dyn StorePort,
    reader: R,
    portfolio: &str,
    base_currency: &str,
) -> Result<ImportSummary, BalancerError> {
    let pf = store.ensure_portfolio(portfolio, base_currency)?;
    let mut summary = ImportSummary::default();
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    for result in rdr.deserialize::<CsvRowIn>() {
        let row = result.map_err(csv_error)?;
        let symbol = row.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            summary.skipped += 1;
            continue;
        }
        let ccy = match row.avg_cost_ccy.trim() {
            "" => "GBP".to_string(),
            c => c.to_uppercase(),
        };
        let asset = match store.find_asset_by_symbol(&symbol)? {
            Some(asset) => asset,
            None => store.upsert_asset(&AssetUpsert::new(&symbol).name(symbol.clone()))?,
        };
        store.upsert_position(
            pf.id,
            asset.id,
            &PositionUpsert::coins(number_or_zero(&row.coins), &ccy)
                .with_avg_cost_ccy(&ccy)
                .with_avg_cost(number_or_zero(&row.avg_cost_per_unit)),
        )?;
        summary.assets += 1;
    }
    Ok(summary)
}

/// A missing file is a no-op.
pub fn import_portfolio_csv(
    store: &dyn StorePort,
    path: &Path,
    portfolio: &str,
    base_currency: &str,
) -> Result<ImportSummary, BalancerError> {
    if !path.exists() {
        log::warn!("{} does not exist, nothing to import", path.display());
        return Ok(ImportSummary::default());
    }
    let file = fs::File::open(path)?;
    read_portfolio_csv(store, file, portfolio, base_currency)
}
