//! Holdings importers and the number parsing they share.

use serde::Deserialize;

use crate::domain::asset::{classify, AssetUpsert};
use crate::domain::error::BalancerError;
use crate::domain::portfolio::PositionUpsert;
use crate::domain::positions::{import_assets, ImportAsset, ImportSummary};
use crate::ports::store_port::StorePort;

/// First `-?\d+(\.\d+)?` match in `s`.
fn first_decimal(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let negative = bytes[i] == b'-' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
        if bytes[i].is_ascii_digit() || negative {
            let start = i;
            if negative {
                i += 1;
            }
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
            }
            return s[start..i].parse().ok();
        }
        i += 1;
    }
    None
}

fn parse_with(value: &str, strip: &[char]) -> f64 {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return 0.0;
    }
    let cleaned: String = trimmed.chars().filter(|c| !strip.contains(c)).collect();
    let cleaned = cleaned.trim();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => first_decimal(cleaned).unwrap_or(0.0),
    }
}

/// Parses a pound amount such as `£1,234.50`. Dashes and blanks are zero.
pub fn parse_money(value: &str) -> f64 {
    parse_with(value, &['£', ','])
}

/// Parses a plain quantity such as `1,000.5`. Dashes and blanks are zero.
pub fn parse_float(value: &str) -> f64 {
    parse_with(value, &[','])
}

pub fn clean_name(name: &str) -> String {
    name.replace('*', "").trim().to_string()
}

/// Normalises a locale-formatted number: currency symbols and whitespace are
/// dropped and the rightmost `.` or `,` becomes the decimal point.
pub fn normalize_number_string(s: &str) -> String {
    let x: String = s
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    let Some(dec) = x.rfind(['.', ',']).filter(|&i| i > 0) else {
        return x.replace(['.', ','], "");
    };
    let int_part = x[..dec].replace(['.', ','], "");
    let frac_part = x[dec + 1..].replace(['.', ','], "");
    format!("{int_part}.{frac_part}")
}

/// Parses a user-typed number in either `1,234.5` or `1.234,5` style.
pub fn to_number(s: &str) -> Option<f64> {
    let normalized = normalize_number_string(s);
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// One data row of a tokenlist export.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRow {
    pub token: String,
    pub symbol: String,
    pub price_gbp: f64,
    pub coins: f64,
    pub avg_buy_price_gbp: f64,
}

/// Columns: Token, Symbol, Price(£), Coins, Value(£), Avg Buy Price(£).
/// Tab separated; falls back to whitespace when the line has no tabs.
pub fn parse_row(line: &str) -> TokenRow {
    let mut parts: Vec<&str> = line.split('\t').filter(|p| !p.is_empty()).collect();
    if parts.len() == 1 {
        parts = line.split_whitespace().collect();
    }
    let col = |i: usize| parts.get(i).copied().unwrap_or("");
    TokenRow {
        token: clean_name(col(0)),
        symbol: col(1).trim().to_string(),
        price_gbp: parse_money(col(2)),
        coins: parse_float(col(3)),
        avg_buy_price_gbp: parse_money(col(5)),
    }
}

/// Imports a tokenlist export into `portfolio`. The first line is a header.
/// Rows without a symbol are skipped. Average costs are recorded in
/// `avg_cost_ccy`.
pub fn import_tokenlist(
    store: &dyn StorePort,
    content: &str,
    portfolio: &str,
    avg_cost_ccy: &str,
) -> Result<ImportSummary, BalancerError> {
    let pf = store.ensure_portfolio(portfolio, "USD")?;
    let mut summary = ImportSummary::default();

    for line in content.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let row = parse_row(line);
        if row.symbol.is_empty() {
            summary.skipped += 1;
            continue;
        }
        let (is_stable, is_fiat) = classify(&row.symbol, &row.token);
        let asset = store.upsert_asset(
            &AssetUpsert::new(&row.symbol)
                .name(row.token.clone())
                .flags(is_stable, is_fiat),
        )?;
        store.upsert_position(
            pf.id,
            asset.id,
            &PositionUpsert::coins(row.coins, avg_cost_ccy).with_avg_cost(row.avg_buy_price_gbp),
        )?;
        summary.assets += 1;
    }
    log::info!(
        "tokenlist import: {} assets, {} skipped",
        summary.assets,
        summary.skipped
    );
    Ok(summary)
}

#[derive(Debug, Deserialize)]
struct PortfolioDocument {
    #[serde(default)]
    assets: Vec<ImportAsset>,
}

/// Imports `{"assets": [{symbol, name, coingecko_id, coins}]}`.
pub fn import_portfolio_json(
    store: &dyn StorePort,
    content: &str,
    portfolio: &str,
    avg_cost_ccy: &str,
) -> Result<ImportSummary, BalancerError> {
    let doc: PortfolioDocument =
        serde_json::from_str(content).map_err(|e| BalancerError::Decode {
            what: "portfolio json".into(),
            reason: e.to_string(),
        })?;
    import_assets(store, portfolio, &doc.assets, avg_cost_ccy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite_adapter::SqliteAdapter;
    use proptest::prelude::*;

    #[test]
    fn money_parsing() {
        assert_eq!(parse_money("£1,234.50"), 1234.5);
        assert_eq!(parse_money(" - "), 0.0);
        assert_eq!(parse_money(""), 0.0);
        assert_eq!(parse_money("approx £12.5 each"), 12.5);
        assert_eq!(parse_money("n/a"), 0.0);
        assert_eq!(parse_money("-3.25"), -3.25);
    }

    #[test]
    fn float_parsing() {
        assert_eq!(parse_float("1,000.5"), 1000.5);
        assert_eq!(parse_float("0.00012"), 0.00012);
        assert_eq!(parse_float("12 coins"), 12.0);
        assert_eq!(parse_float("-"), 0.0);
    }

    #[test]
    fn name_cleaning() {
        assert_eq!(clean_name(" Bitcoin* "), "Bitcoin");
    }

    #[test]
    fn normalization_uses_rightmost_separator() {
        assert_eq!(normalize_number_string("1,234.56"), "1234.56");
        assert_eq!(normalize_number_string("1.234,56"), "1234.56");
        assert_eq!(normalize_number_string("£ 1 000"), "1000");
        assert_eq!(normalize_number_string("$0.5"), "0.5");
        assert_eq!(normalize_number_string(""), "");
        assert_eq!(to_number("€12,5"), Some(12.5));
        assert_eq!(to_number("  "), None);
        assert_eq!(to_number("-"), None);
        assert_eq!(to_number("abc"), None);
    }

    #[test]
    fn tokenlist_row_columns() {
        let row = parse_row("Bitcoin*\tBTC\t£40,000.00\t0.5\t£20,000.00\t£30,000.00");
        assert_eq!(row.token, "Bitcoin");
        assert_eq!(row.symbol, "BTC");
        assert_eq!(row.price_gbp, 40_000.0);
        assert_eq!(row.coins, 0.5);
        assert_eq!(row.avg_buy_price_gbp, 30_000.0);

        let short = parse_row("Cash\tGBP");
        assert_eq!(short.coins, 0.0);
        assert_eq!(short.avg_buy_price_gbp, 0.0);
    }

    #[test]
    fn tokenlist_import_classifies_and_upserts() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        let content = "Token\tSymbol\tPrice\tCoins\tValue\tAvg\n\
                       Bitcoin\tBTC\t£40,000\t0.5\t£20,000\t£30,000\n\
                       \n\
                       USD Coin\tUSDC\t£0.80\t100\t£80\t£0.79\n\
                       Pound\tGBP\t£1\t250\t£250\t-\n\
                       Orphan\t\t£1\t1\t£1\t£1\n";
        adapter
            .with_store(|s| {
                let summary = import_tokenlist(s, content, "Default", "GBP")?;
                assert_eq!(summary.assets, 3);
                assert_eq!(summary.skipped, 1);

                let gbp = s.find_asset_by_symbol("GBP")?.unwrap();
                assert!(gbp.is_fiat && gbp.is_stable);
                let usdc = s.find_asset_by_symbol("USDC")?.unwrap();
                assert!(usdc.is_stable && !usdc.is_fiat);

                let holdings = s.holdings(Some("Default"))?;
                let btc = holdings.iter().find(|h| h.asset.symbol == "BTC").unwrap();
                assert_eq!(btc.position.coins, 0.5);
                assert_eq!(btc.position.avg_cost_per_unit, 30_000.0);
                assert_eq!(btc.position.avg_cost_ccy, "GBP");

                // re-import updates in place
                import_tokenlist(
                    s,
                    "header\nBitcoin\tBTC\t£1\t0.75\t£1\t£31,000\n",
                    "Default",
                    "GBP",
                )?;
                let btc = s.holdings(Some("Default"))?
                    .into_iter()
                    .find(|h| h.asset.symbol == "BTC")
                    .unwrap();
                assert_eq!(btc.position.coins, 0.75);
                assert_eq!(btc.position.avg_cost_per_unit, 31_000.0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn json_import_rejects_garbage() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        let result =
            adapter.with_store(|s| import_portfolio_json(s, "{not json", "Default", "GBP"));
        assert!(matches!(result, Err(BalancerError::Decode { .. })));
    }

    #[test]
    fn json_import_creates_positions() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        let content = r#"{"assets": [
            {"symbol": "eth", "name": "Ethereum", "coingecko_id": "ethereum", "coins": 2.5},
            {"symbol": ""}
        ]}"#;
        adapter
            .with_store(|s| {
                let summary = import_portfolio_json(s, content, "Main", "GBP")?;
                assert_eq!(summary.assets, 1);
                let eth = s.find_asset_by_symbol("ETH")?.unwrap();
                assert_eq!(eth.coingecko_id.as_deref(), Some("ethereum"));
                assert_eq!(s.holdings(Some("Main"))?[0].position.coins, 2.5);
                Ok(())
            })
            .unwrap();
    }

    proptest! {
        #[test]
        fn plain_decimals_round_trip(n in -1.0e9f64..1.0e9f64) {
            let text = format!("{n:.4}");
            let parsed = parse_float(&text);
            prop_assert!((parsed - text.parse::<f64>().unwrap()).abs() < 1e-9);
        }

        #[test]
        fn grouped_numbers_normalize(int in 0u64..1_000_000_000u64, frac in 0u32..100u32) {
            let grouped = int
                .to_string()
                .as_bytes()
                .rchunks(3)
                .rev()
                .map(|c| std::str::from_utf8(c).unwrap())
                .collect::<Vec<_>>()
                .join(",");
            let text = format!("£{grouped}.{frac:02}");
            let expected = int as f64 + frac as f64 / 100.0;
            prop_assert!((to_number(&text).unwrap() - expected).abs() < 1e-6);
        }

        #[test]
        fn parsers_never_panic(s in "\\PC*") {
            let _ = parse_money(&s);
            let _ = parse_float(&s);
            let _ = to_number(&s);
        }
    }
}
