//! SQLite store adapter.
//!
//! [`SqliteAdapter`] owns the r2d2 pool; [`SqliteStore`] implements
//! [`StorePort`] over one borrowed connection so the same queries run either
//! standalone or inside a transaction.

use chrono::{Duration, NaiveDateTime};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::asset::{Asset, AssetUpsert};
use crate::domain::error::BalancerError;
use crate::domain::market::{FxRate, IndicatorObservation, NewPrice, PricePoint};
use crate::domain::portfolio::{Holding, Portfolio, Position, PositionUpsert, Target};
use crate::domain::timestamp;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{AlertRecord, Bucket, StorePort};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS portfolios (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    base_currency TEXT NOT NULL DEFAULT 'USD'
);
CREATE TABLE IF NOT EXISTS assets (
    id INTEGER PRIMARY KEY,
    symbol TEXT NOT NULL,
    name TEXT NOT NULL,
    coingecko_id TEXT,
    is_stable INTEGER NOT NULL DEFAULT 0,
    is_fiat INTEGER NOT NULL DEFAULT 0,
    eligible_note TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    CONSTRAINT uq_asset_symbol UNIQUE (symbol)
);
CREATE INDEX IF NOT EXISTS idx_assets_coingecko_id ON assets(coingecko_id);
CREATE TABLE IF NOT EXISTS positions (
    id INTEGER PRIMARY KEY,
    portfolio_id INTEGER NOT NULL REFERENCES portfolios(id),
    asset_id INTEGER NOT NULL REFERENCES assets(id),
    coins REAL NOT NULL DEFAULT 0,
    avg_cost_ccy TEXT NOT NULL DEFAULT 'GBP',
    avg_cost_per_unit REAL NOT NULL DEFAULT 0,
    as_of TEXT,
    CONSTRAINT uq_position_portfolio_asset UNIQUE (portfolio_id, asset_id)
);
CREATE TABLE IF NOT EXISTS prices (
    id INTEGER PRIMARY KEY,
    asset_id INTEGER NOT NULL REFERENCES assets(id),
    ccy TEXT NOT NULL,
    price REAL NOT NULL,
    at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_prices_asset_ccy_at ON prices(asset_id, ccy, at);
CREATE INDEX IF NOT EXISTS idx_prices_at ON prices(at);
CREATE TABLE IF NOT EXISTS fx_rates (
    id INTEGER PRIMARY KEY,
    base_ccy TEXT NOT NULL,
    quote_ccy TEXT NOT NULL,
    rate REAL NOT NULL,
    at TEXT NOT NULL,
    CONSTRAINT uq_fx_pair_time UNIQUE (base_ccy, quote_ccy, at)
);
CREATE INDEX IF NOT EXISTS idx_fx_ccy_at ON fx_rates(base_ccy, quote_ccy, at);
CREATE TABLE IF NOT EXISTS targets (
    id INTEGER PRIMARY KEY,
    portfolio_id INTEGER NOT NULL REFERENCES portfolios(id),
    asset_id INTEGER NOT NULL REFERENCES assets(id),
    target_weight REAL NOT NULL DEFAULT 0,
    min_trade_usd REAL NOT NULL DEFAULT 50,
    drift_band REAL NOT NULL DEFAULT 0.2,
    CONSTRAINT uq_target_portfolio_asset UNIQUE (portfolio_id, asset_id)
);
CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY,
    portfolio_id INTEGER NOT NULL REFERENCES portfolios(id),
    asset_id INTEGER NOT NULL REFERENCES assets(id),
    type TEXT NOT NULL,
    message TEXT NOT NULL,
    payload_json TEXT,
    severity TEXT NOT NULL DEFAULT 'info',
    at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_lookup ON alerts(portfolio_id, asset_id, type, at);
CREATE TABLE IF NOT EXISTS indicators (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    value REAL NOT NULL,
    at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_indicators_name_at ON indicators(name, at);
";

const ASSET_COLUMNS: &str =
    "a.id, a.symbol, a.name, a.coingecko_id, a.is_stable, a.is_fiat, a.active";
const POSITION_COLUMNS: &str =
    "p.id, p.portfolio_id, p.asset_id, p.coins, p.avg_cost_ccy, p.avg_cost_per_unit, p.as_of";

/// Rows per table returned by the development browser.
pub const DUMP_ROW_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
    path: String,
}

/// Contents of every user table, for the development database browser.
#[derive(Debug, Serialize)]
pub struct DatabaseDump {
    pub tables: Vec<String>,
    pub data: BTreeMap<String, Vec<serde_json::Value>>,
    pub schemas: BTreeMap<String, String>,
    #[serde(rename = "dbPath")]
    pub db_path: String,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BalancerError> {
        let db_path =
            config
                .get_string("database", "path")
                .ok_or_else(|| BalancerError::ConfigMissing {
                    section: "database".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("database", "pool_size", 4).max(1) as u32;
        Self::open(&db_path, pool_size)
    }

    pub fn open(db_path: &str, pool_size: u32) -> Result<Self, BalancerError> {
        let manager = SqliteConnectionManager::file(db_path).with_init(|c| {
            c.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        });
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| BalancerError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self {
            pool,
            path: db_path.to_string(),
        })
    }

    pub fn in_memory() -> Result<Self, BalancerError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| BalancerError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self {
            pool,
            path: ":memory:".to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn initialize_schema(&self) -> Result<(), BalancerError> {
        let conn = self.pool.get()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Runs `f` against a pooled connection in autocommit mode.
    pub fn with_store<T>(
        &self,
        f: impl FnOnce(&SqliteStore<'_>) -> Result<T, BalancerError>,
    ) -> Result<T, BalancerError> {
        let conn = self.pool.get()?;
        f(&SqliteStore::new(&conn))
    }

    /// Runs `f` inside one transaction; any error rolls everything back.
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&SqliteStore<'_>) -> Result<T, BalancerError>,
    ) -> Result<T, BalancerError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let out = f(&SqliteStore::new(&tx))?;
        tx.commit()?;
        Ok(out)
    }

    /// Thins price and FX history: latest row per hour for the last 24h, per
    /// day for the rest of the last year, per month before that.
    /// Returns the number of deleted rows.
    pub fn compact(&self, now: NaiveDateTime) -> Result<usize, BalancerError> {
        let since_24h = timestamp::format(now - Duration::hours(24));
        let since_1y = timestamp::format(now - Duration::days(365));

        let windows = [
            ("at >= ?1", since_24h.clone(), None, "strftime('%Y-%m-%d %H', at)"),
            ("at >= ?1 AND at < ?2", since_1y.clone(), Some(since_24h), "date(at)"),
            ("at < ?1", since_1y, None, "strftime('%Y-%m', at)"),
        ];
        let tables = [("prices", "asset_id, ccy"), ("fx_rates", "base_ccy, quote_ccy")];

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for (table, keys) in tables {
            for (scope, lower, upper, bucket) in &windows {
                let sql = format!(
                    "DELETE FROM {table}
                     WHERE {scope}
                       AND ({keys}, at) NOT IN (
                         SELECT {keys}, MAX(at) FROM {table}
                         WHERE {scope}
                         GROUP BY {keys}, {bucket}
                       )"
                );
                deleted += match upper {
                    Some(upper) => tx.execute(&sql, params![lower, upper])?,
                    None => tx.execute(&sql, params![lower])?,
                };
            }
        }
        tx.commit()?;
        log::info!("compaction removed {deleted} rows");
        Ok(deleted)
    }

    pub fn dump(&self, row_limit: usize) -> Result<DatabaseDump, BalancerError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT name, COALESCE(sql, '') FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let tables = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut dump = DatabaseDump {
            tables: Vec::with_capacity(tables.len()),
            data: BTreeMap::new(),
            schemas: BTreeMap::new(),
            db_path: self.path.clone(),
        };

        for (name, sql) in tables {
            let rows = match dump_table(&conn, &name, row_limit) {
                Ok(rows) => rows,
                Err(e) => vec![serde_json::json!({ "error": e.to_string() })],
            };
            dump.data.insert(name.clone(), rows);
            dump.schemas.insert(name.clone(), sql);
            dump.tables.push(name);
        }
        Ok(dump)
    }
}

fn dump_table(
    conn: &Connection,
    table: &str,
    row_limit: usize,
) -> Result<Vec<serde_json::Value>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM \"{}\" LIMIT {}",
        table.replace('"', "\"\""),
        row_limit
    ))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let rows = stmt.query_map([], |row| {
        let mut obj = serde_json::Map::new();
        for (i, col) in columns.iter().enumerate() {
            let value = match row.get_ref(i)? {
                ValueRef::Null => serde_json::Value::Null,
                ValueRef::Integer(n) => serde_json::Value::from(n),
                ValueRef::Real(f) => serde_json::Value::from(f),
                ValueRef::Text(t) => {
                    serde_json::Value::from(String::from_utf8_lossy(t).into_owned())
                }
                ValueRef::Blob(b) => serde_json::Value::from(format!("<{} bytes>", b.len())),
            };
            obj.insert(col.clone(), value);
        }
        Ok(serde_json::Value::Object(obj))
    })?;
    rows.collect()
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    timestamp::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {raw}").into(),
        )
    })
}

fn asset_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Asset> {
    Ok(Asset {
        id: row.get(offset)?,
        symbol: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
        coingecko_id: row.get(offset + 3)?,
        is_stable: row.get(offset + 4)?,
        is_fiat: row.get(offset + 5)?,
        active: row.get(offset + 6)?,
    })
}

fn position_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Position> {
    let as_of: Option<String> = row.get(offset + 6)?;
    Ok(Position {
        id: row.get(offset)?,
        portfolio_id: row.get(offset + 1)?,
        asset_id: row.get(offset + 2)?,
        coins: row.get(offset + 3)?,
        avg_cost_ccy: row.get(offset + 4)?,
        avg_cost_per_unit: row.get(offset + 5)?,
        as_of: as_of.as_deref().and_then(timestamp::parse),
    })
}

fn price_point(row: &Row<'_>) -> rusqlite::Result<PricePoint> {
    Ok(PricePoint {
        price: row.get(0)?,
        at: ts_column(row, 1)?,
    })
}

/// [`StorePort`] over a single connection (or transaction).
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn asset_by_id(&self, id: i64) -> Result<Asset, BalancerError> {
        let sql = format!("SELECT {ASSET_COLUMNS} FROM assets a WHERE a.id = ?1");
        Ok(self.conn.query_row(&sql, params![id], |r| asset_from_row(r, 0))?)
    }

    fn single_asset(&self, filter: &str, value: &str) -> Result<Option<Asset>, BalancerError> {
        let sql =
            format!("SELECT {ASSET_COLUMNS} FROM assets a WHERE {filter} ORDER BY a.id LIMIT 1");
        Ok(self
            .conn
            .query_row(&sql, params![value], |r| asset_from_row(r, 0))
            .optional()?)
    }

    fn exists(&self, sql: &str, params: impl rusqlite::Params) -> Result<bool, BalancerError> {
        let found: i64 = self.conn.query_row(sql, params, |r| r.get(0))?;
        Ok(found != 0)
    }
}

impl StorePort for SqliteStore<'_> {
    fn find_portfolio(&self, name: &str) -> Result<Option<Portfolio>, BalancerError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, base_currency FROM portfolios WHERE name = ?1",
                params![name],
                |r| {
                    Ok(Portfolio {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        base_currency: r.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    fn ensure_portfolio(
        &self,
        name: &str,
        base_currency: &str,
    ) -> Result<Portfolio, BalancerError> {
        if let Some(existing) = self.find_portfolio(name)? {
            return Ok(existing);
        }
        self.conn.execute(
            "INSERT INTO portfolios (name, base_currency) VALUES (?1, ?2)",
            params![name, base_currency],
        )?;
        log::info!("created portfolio {name}");
        Ok(Portfolio {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            base_currency: base_currency.to_string(),
        })
    }

    fn find_asset_by_symbol(&self, symbol: &str) -> Result<Option<Asset>, BalancerError> {
        self.single_asset("UPPER(a.symbol) = UPPER(?1)", symbol)
    }

    fn find_asset_by_coingecko_id(&self, id: &str) -> Result<Option<Asset>, BalancerError> {
        self.single_asset("a.coingecko_id = ?1", id)
    }

    fn upsert_asset(&self, asset: &AssetUpsert) -> Result<Asset, BalancerError> {
        if asset.symbol.is_empty() {
            return Err(BalancerError::invalid("empty asset symbol"));
        }
        match self.find_asset_by_symbol(&asset.symbol)? {
            None => {
                self.conn.execute(
                    "INSERT INTO assets (symbol, name, coingecko_id, is_stable, is_fiat, active)
                     VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                    params![
                        asset.symbol,
                        asset.name.as_deref().unwrap_or(&asset.symbol),
                        asset.coingecko_id,
                        asset.is_stable.unwrap_or(false),
                        asset.is_fiat.unwrap_or(false),
                    ],
                )?;
                self.asset_by_id(self.conn.last_insert_rowid())
            }
            Some(existing) => {
                self.conn.execute(
                    "UPDATE assets SET
                        name = COALESCE(?1, name),
                        coingecko_id = COALESCE(?2, coingecko_id),
                        is_stable = COALESCE(?3, is_stable),
                        is_fiat = COALESCE(?4, is_fiat)
                     WHERE id = ?5",
                    params![
                        asset.name,
                        asset.coingecko_id,
                        asset.is_stable,
                        asset.is_fiat,
                        existing.id
                    ],
                )?;
                self.asset_by_id(existing.id)
            }
        }
    }

    fn set_coingecko_id(&self, asset_id: i64, coingecko_id: &str) -> Result<(), BalancerError> {
        self.conn.execute(
            "UPDATE assets SET coingecko_id = ?1 WHERE id = ?2",
            params![coingecko_id, asset_id],
        )?;
        Ok(())
    }

    fn active_asset_ids(&self) -> Result<Vec<i64>, BalancerError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM assets WHERE active = 1 ORDER BY id")?;
        let ids = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn holdings(&self, portfolio: Option<&str>) -> Result<Vec<Holding>, BalancerError> {
        let sql = format!(
            "SELECT {ASSET_COLUMNS}, {POSITION_COLUMNS}
             FROM positions p
             JOIN assets a ON a.id = p.asset_id
             JOIN portfolios pf ON pf.id = p.portfolio_id
             WHERE a.active = 1 AND pf.name = COALESCE(?1, pf.name)
             ORDER BY p.id"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![portfolio], |r| {
                Ok(Holding {
                    asset: asset_from_row(r, 0)?,
                    position: position_from_row(r, 7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find_position(
        &self,
        portfolio_id: i64,
        asset_id: i64,
    ) -> Result<Option<Position>, BalancerError> {
        let sql = format!(
            "SELECT {POSITION_COLUMNS} FROM positions p
             WHERE p.portfolio_id = ?1 AND p.asset_id = ?2"
        );
        Ok(self
            .conn
            .query_row(&sql, params![portfolio_id, asset_id], |r| {
                position_from_row(r, 0)
            })
            .optional()?)
    }

    fn upsert_position(
        &self,
        portfolio_id: i64,
        asset_id: i64,
        values: &PositionUpsert,
    ) -> Result<Position, BalancerError> {
        let now = timestamp::format(timestamp::now());
        match self.find_position(portfolio_id, asset_id)? {
            None => {
                self.conn.execute(
                    "INSERT INTO positions
                        (portfolio_id, asset_id, coins, avg_cost_ccy, avg_cost_per_unit, as_of)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        portfolio_id,
                        asset_id,
                        values.coins,
                        values.avg_cost_ccy.as_deref().unwrap_or(&values.default_ccy),
                        values.avg_cost_per_unit.unwrap_or(0.0),
                        now
                    ],
                )?;
            }
            Some(existing) => {
                self.conn.execute(
                    "UPDATE positions SET
                        coins = ?1,
                        avg_cost_ccy = COALESCE(?2, avg_cost_ccy),
                        avg_cost_per_unit = COALESCE(?3, avg_cost_per_unit),
                        as_of = ?4
                     WHERE id = ?5",
                    params![
                        values.coins,
                        values.avg_cost_ccy,
                        values.avg_cost_per_unit,
                        now,
                        existing.id
                    ],
                )?;
            }
        }
        self.find_position(portfolio_id, asset_id)?
            .ok_or_else(|| BalancerError::not_found("position"))
    }

    fn set_position_coins(&self, position_id: i64, coins: f64) -> Result<(), BalancerError> {
        self.conn.execute(
            "UPDATE positions SET coins = ?1, as_of = ?2 WHERE id = ?3",
            params![coins, timestamp::format(timestamp::now()), position_id],
        )?;
        Ok(())
    }

    fn set_position_avg_cost(&self, position_id: i64, avg: f64) -> Result<(), BalancerError> {
        self.conn.execute(
            "UPDATE positions SET avg_cost_per_unit = ?1 WHERE id = ?2",
            params![avg, position_id],
        )?;
        Ok(())
    }

    fn held_coingecko_ids(&self, portfolio: Option<&str>) -> Result<Vec<String>, BalancerError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT a.coingecko_id
             FROM positions p
             JOIN assets a ON a.id = p.asset_id
             JOIN portfolios pf ON pf.id = p.portfolio_id
             WHERE a.coingecko_id IS NOT NULL AND a.coingecko_id <> ''
               AND pf.name = COALESCE(?1, pf.name)
             ORDER BY a.coingecko_id",
        )?;
        let ids = stmt
            .query_map(params![portfolio], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn unmapped_held_assets(&self, limit: usize) -> Result<Vec<Asset>, BalancerError> {
        let sql = format!(
            "SELECT DISTINCT {ASSET_COLUMNS}
             FROM assets a
             JOIN positions p ON p.asset_id = a.id
             WHERE (a.coingecko_id IS NULL OR a.coingecko_id = '') AND a.active = 1
             ORDER BY a.symbol
             LIMIT ?1"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let assets = stmt
            .query_map(params![limit as i64], |r| asset_from_row(r, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assets)
    }

    fn insert_prices(&self, prices: &[NewPrice]) -> Result<usize, BalancerError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO prices (asset_id, ccy, price, at) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for p in prices {
            stmt.execute(params![p.asset_id, p.ccy, p.price, timestamp::format(p.at)])?;
        }
        Ok(prices.len())
    }

    fn latest_price(&self, asset_id: i64, ccy: &str) -> Result<Option<PricePoint>, BalancerError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT price, at FROM prices WHERE asset_id = ?1 AND ccy = ?2
             ORDER BY at DESC, id DESC LIMIT 1",
        )?;
        Ok(stmt.query_row(params![asset_id, ccy], price_point).optional()?)
    }

    fn price_at_or_before(
        &self,
        asset_id: i64,
        ccy: &str,
        at: NaiveDateTime,
    ) -> Result<Option<PricePoint>, BalancerError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT price, at FROM prices WHERE asset_id = ?1 AND ccy = ?2 AND at <= ?3
             ORDER BY at DESC, id DESC LIMIT 1",
        )?;
        Ok(stmt
            .query_row(params![asset_id, ccy, timestamp::format(at)], price_point)
            .optional()?)
    }

    fn earliest_price(
        &self,
        asset_id: i64,
        ccy: &str,
    ) -> Result<Option<PricePoint>, BalancerError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT price, at FROM prices WHERE asset_id = ?1 AND ccy = ?2
             ORDER BY at ASC, id ASC LIMIT 1",
        )?;
        Ok(stmt.query_row(params![asset_id, ccy], price_point).optional()?)
    }

    fn has_price_between(
        &self,
        asset_id: i64,
        ccy: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<bool, BalancerError> {
        self.exists(
            "SELECT EXISTS(SELECT 1 FROM prices
                WHERE asset_id = ?1 AND ccy = ?2 AND at >= ?3 AND at < ?4)",
            params![asset_id, ccy, timestamp::format(from), timestamp::format(to)],
        )
    }

    fn latest_price_time(&self) -> Result<Option<NaiveDateTime>, BalancerError> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT MAX(at) FROM prices", [], |r| r.get(0))?;
        Ok(raw.as_deref().and_then(timestamp::parse))
    }

    fn insert_fx_rates(&self, rates: &[FxRate]) -> Result<usize, BalancerError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO fx_rates (base_ccy, quote_ccy, rate, at)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for r in rates {
            stmt.execute(params![r.base_ccy, r.quote_ccy, r.rate, timestamp::format(r.at)])?;
        }
        Ok(rates.len())
    }

    fn latest_fx(&self, base: &str, quote: &str) -> Result<Option<f64>, BalancerError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT rate FROM fx_rates WHERE base_ccy = ?1 AND quote_ccy = ?2
             ORDER BY at DESC LIMIT 1",
        )?;
        Ok(stmt.query_row(params![base, quote], |r| r.get(0)).optional()?)
    }

    fn fx_at_or_before(
        &self,
        base: &str,
        quote: &str,
        at: NaiveDateTime,
    ) -> Result<Option<f64>, BalancerError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT rate FROM fx_rates WHERE base_ccy = ?1 AND quote_ccy = ?2 AND at <= ?3
             ORDER BY at DESC LIMIT 1",
        )?;
        Ok(stmt
            .query_row(params![base, quote, timestamp::format(at)], |r| r.get(0))
            .optional()?)
    }

    fn fx_before(
        &self,
        base: &str,
        quote: &str,
        at: NaiveDateTime,
    ) -> Result<Option<f64>, BalancerError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT rate FROM fx_rates WHERE base_ccy = ?1 AND quote_ccy = ?2 AND at < ?3
             ORDER BY at DESC LIMIT 1",
        )?;
        Ok(stmt
            .query_row(params![base, quote, timestamp::format(at)], |r| r.get(0))
            .optional()?)
    }

    fn has_fx_between(
        &self,
        base: &str,
        quote: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<bool, BalancerError> {
        self.exists(
            "SELECT EXISTS(SELECT 1 FROM fx_rates
                WHERE base_ccy = ?1 AND quote_ccy = ?2 AND at >= ?3 AND at < ?4)",
            params![base, quote, timestamp::format(from), timestamp::format(to)],
        )
    }

    fn insert_indicator(&self, observation: &IndicatorObservation) -> Result<(), BalancerError> {
        self.conn.execute(
            "INSERT INTO indicators (name, value, at) VALUES (?1, ?2, ?3)",
            params![
                observation.name,
                observation.value,
                timestamp::format(observation.at)
            ],
        )?;
        Ok(())
    }

    fn indicators_since(
        &self,
        since: NaiveDateTime,
    ) -> Result<Vec<IndicatorObservation>, BalancerError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT name, value, at FROM indicators WHERE at >= ?1 ORDER BY at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![timestamp::format(since)], |r| {
                Ok(IndicatorObservation {
                    name: r.get(0)?,
                    value: r.get(1)?,
                    at: ts_column(r, 2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn targets(&self, portfolio_id: i64) -> Result<Vec<Target>, BalancerError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT portfolio_id, asset_id, target_weight, min_trade_usd, drift_band
             FROM targets WHERE portfolio_id = ?1 ORDER BY asset_id",
        )?;
        let rows = stmt
            .query_map(params![portfolio_id], |r| {
                Ok(Target {
                    portfolio_id: r.get(0)?,
                    asset_id: r.get(1)?,
                    target_weight: r.get(2)?,
                    min_trade_usd: r.get(3)?,
                    drift_band: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn upsert_target(&self, target: &Target) -> Result<(), BalancerError> {
        self.conn.execute(
            "INSERT INTO targets (portfolio_id, asset_id, target_weight, min_trade_usd, drift_band)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(portfolio_id, asset_id) DO UPDATE SET
                target_weight = excluded.target_weight,
                min_trade_usd = excluded.min_trade_usd,
                drift_band = excluded.drift_band",
            params![
                target.portfolio_id,
                target.asset_id,
                target.target_weight,
                target.min_trade_usd,
                target.drift_band
            ],
        )?;
        Ok(())
    }

    fn insert_alert(&self, alert: &AlertRecord) -> Result<(), BalancerError> {
        self.conn.execute(
            "INSERT INTO alerts (portfolio_id, asset_id, type, message, payload_json, severity, at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                alert.portfolio_id,
                alert.asset_id,
                alert.kind,
                alert.message,
                alert.payload_json,
                alert.severity,
                timestamp::format(alert.at)
            ],
        )?;
        Ok(())
    }

    fn alert_exists_since(
        &self,
        portfolio_id: i64,
        asset_id: i64,
        kind: &str,
        since: NaiveDateTime,
    ) -> Result<bool, BalancerError> {
        self.exists(
            "SELECT EXISTS(SELECT 1 FROM alerts
                WHERE portfolio_id = ?1 AND asset_id = ?2 AND type = ?3 AND at >= ?4)",
            params![portfolio_id, asset_id, kind, timestamp::format(since)],
        )
    }

    fn count_price_buckets(
        &self,
        asset_id: i64,
        ccy: &str,
        since: NaiveDateTime,
        bucket: Bucket,
    ) -> Result<usize, BalancerError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT strftime(?1, at)) FROM prices
             WHERE asset_id = ?2 AND ccy = ?3 AND at >= ?4",
            params![bucket.strftime(), asset_id, ccy, timestamp::format(since)],
            |r| r.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn count_fx_buckets(
        &self,
        base: &str,
        quote: &str,
        since: NaiveDateTime,
        bucket: Bucket,
    ) -> Result<usize, BalancerError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT strftime(?1, at)) FROM fx_rates
             WHERE base_ccy = ?2 AND quote_ccy = ?3 AND at >= ?4",
            params![bucket.strftime(), base, quote, timestamp::format(since)],
            |r| r.get(0),
        )?;
        Ok(count.max(0) as usize)
    }
}
