//! SQLite registry adapter.
//!
//! Dates are stored as `YYYY-MM-DD` text so that lexical comparison in SQL
//! matches date order. Between [`RegistryPort::begin`] and
//! [`RegistryPort::commit`] the adapter holds one pooled connection and
//! routes every query through it.

use crate::domain::error::SecmasterError;
use crate::domain::security::{
    CanonicalSecurity, Exchange, InstrumentType, ListedSecurity, ListingDiff, ListingWindow,
    NewListing, NewSecurity, SecurityDiff, search_key,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::registry_port::RegistryPort;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::cell::RefCell;
use tracing::{debug, warn};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS exchanges (
    id INTEGER PRIMARY KEY,
    label TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS instrument_types (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS securities (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    search_key TEXT NOT NULL,
    instrument_type_id INTEGER NOT NULL REFERENCES instrument_types(id),
    UNIQUE (search_key, instrument_type_id)
);
CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY,
    security_id INTEGER NOT NULL REFERENCES securities(id),
    exchange_id INTEGER NOT NULL REFERENCES exchanges(id),
    symbol TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT,
    vendor_id INTEGER
);
CREATE INDEX IF NOT EXISTS idx_listings_exchange_symbol ON listings(exchange_id, symbol);
CREATE INDEX IF NOT EXISTS idx_listings_security ON listings(security_id);";

const LISTING_COLUMNS: &str =
    "id, security_id, exchange_id, symbol, start_date, end_date, vendor_id";

type SqlitePool = Pool<SqliteConnectionManager>;
type SqliteConnection = PooledConnection<SqliteConnectionManager>;

fn pool_error(e: r2d2::Error) -> SecmasterError {
    SecmasterError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> SecmasterError {
    SecmasterError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn optional_date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        None => Ok(None),
        Some(_) => date_column(row, idx).map(Some),
    }
}

/// Reads a listing from `LISTING_COLUMNS` starting at column `base`.
fn listing_at(row: &Row<'_>, base: usize) -> rusqlite::Result<ListedSecurity> {
    Ok(ListedSecurity {
        id: row.get(base)?,
        security_id: row.get(base + 1)?,
        exchange_id: row.get(base + 2)?,
        symbol: row.get(base + 3)?,
        start_date: date_column(row, base + 4)?,
        end_date: optional_date_column(row, base + 5)?,
        vendor_id: row.get(base + 6)?,
    })
}

fn security_row(row: &Row<'_>) -> rusqlite::Result<CanonicalSecurity> {
    Ok(CanonicalSecurity {
        id: row.get(0)?,
        name: row.get(1)?,
        search_key: row.get(2)?,
        instrument_type_id: row.get(3)?,
    })
}

pub struct SqliteRepository {
    pool: SqlitePool,
    held: RefCell<Option<SqliteConnection>>,
}

impl SqliteRepository {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SecmasterError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| SecmasterError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        debug!(path = %db_path, pool_size, "opened sqlite registry");
        Ok(Self::with_pool(pool))
    }

    pub fn in_memory() -> Result<Self, SecmasterError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self::with_pool(pool))
    }

    fn with_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            held: RefCell::new(None),
        }
    }

    pub fn initialize_schema(&self) -> Result<(), SecmasterError> {
        self.with_conn(|conn| conn.execute_batch(SCHEMA))
    }

    /// Runs `f` on the transaction's connection when one is open, otherwise
    /// on a fresh pooled connection.
    fn with_conn<T, F>(&self, f: F) -> Result<T, SecmasterError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        if let Some(conn) = self.held.borrow().as_ref() {
            return f(&**conn).map_err(query_error);
        }
        let conn = self.pool.get().map_err(pool_error)?;
        f(&*conn).map_err(query_error)
    }

    fn query_listings(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<ListedSecurity>, SecmasterError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params_from_iter(params.iter()), |row| listing_at(row, 0))?;
            rows.collect()
        })
    }

    fn finish(&self, statement: &str) -> Result<(), SecmasterError> {
        let conn = self
            .held
            .borrow_mut()
            .take()
            .ok_or_else(|| SecmasterError::Database {
                reason: format!("{statement} without an open transaction"),
            })?;
        let result = conn.execute_batch(statement).map_err(query_error);
        if !conn.is_autocommit() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "could not roll back failed transaction");
            }
        }
        result
    }
}

impl RegistryPort for SqliteRepository {
    fn begin(&self) -> Result<(), SecmasterError> {
        if self.held.borrow().is_some() {
            return Err(SecmasterError::Database {
                reason: "transaction already open".into(),
            });
        }
        let conn = self.pool.get().map_err(pool_error)?;
        conn.execute_batch("BEGIN").map_err(query_error)?;
        *self.held.borrow_mut() = Some(conn);
        Ok(())
    }

    fn commit(&self) -> Result<(), SecmasterError> {
        self.finish("COMMIT")
    }

    fn rollback(&self) -> Result<(), SecmasterError> {
        if self.held.borrow().is_none() {
            return Ok(());
        }
        self.finish("ROLLBACK")
    }

    fn find_exchange(&self, label: &str) -> Result<Option<Exchange>, SecmasterError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, label FROM exchanges WHERE label = ?1",
                params![label],
                |row| {
                    Ok(Exchange {
                        id: row.get(0)?,
                        label: row.get(1)?,
                    })
                },
            )
            .optional()
        })
    }

    fn get_or_create_exchange(&self, label: &str) -> Result<Exchange, SecmasterError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO exchanges (label) VALUES (?1)",
                params![label],
            )?;
            conn.query_row(
                "SELECT id, label FROM exchanges WHERE label = ?1",
                params![label],
                |row| {
                    Ok(Exchange {
                        id: row.get(0)?,
                        label: row.get(1)?,
                    })
                },
            )
        })
    }

    fn find_instrument_type(&self, name: &str) -> Result<Option<InstrumentType>, SecmasterError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name FROM instrument_types WHERE name = ?1",
                params![name],
                |row| {
                    Ok(InstrumentType {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
        })
    }

    fn get_instrument_type(&self, id: i64) -> Result<Option<InstrumentType>, SecmasterError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name FROM instrument_types WHERE id = ?1",
                params![id],
                |row| {
                    Ok(InstrumentType {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
        })
    }

    fn get_or_create_instrument_type(&self, name: &str) -> Result<InstrumentType, SecmasterError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO instrument_types (name) VALUES (?1)",
                params![name],
            )?;
            conn.query_row(
                "SELECT id, name FROM instrument_types WHERE name = ?1",
                params![name],
                |row| {
                    Ok(InstrumentType {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
        })
    }

    fn find_exact(
        &self,
        name: &str,
        instrument_type_id: i64,
    ) -> Result<Vec<CanonicalSecurity>, SecmasterError> {
        let key = search_key(name);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, search_key, instrument_type_id
                 FROM securities
                 WHERE search_key = ?1 AND instrument_type_id = ?2
                 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![key, instrument_type_id], security_row)?;
            rows.collect()
        })
    }

    fn get_entity(&self, id: i64) -> Result<Option<CanonicalSecurity>, SecmasterError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, search_key, instrument_type_id FROM securities WHERE id = ?1",
                params![id],
                security_row,
            )
            .optional()
        })
    }

    fn security_names(&self, instrument_type_id: i64) -> Result<Vec<String>, SecmasterError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM securities WHERE instrument_type_id = ?1 ORDER BY name",
            )?;
            let rows = stmt.query_map(params![instrument_type_id], |row| row.get(0))?;
            rows.collect()
        })
    }

    fn create_entity(&self, new: &NewSecurity) -> Result<CanonicalSecurity, SecmasterError> {
        let key = search_key(&new.name);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO securities (name, search_key, instrument_type_id) VALUES (?1, ?2, ?3)",
                params![new.name, key, new.instrument_type_id],
            )?;
            Ok(CanonicalSecurity {
                id: conn.last_insert_rowid(),
                name: new.name.clone(),
                search_key: key.clone(),
                instrument_type_id: new.instrument_type_id,
            })
        })
    }

    fn update_entity(&self, id: i64, diff: &SecurityDiff) -> Result<(), SecmasterError> {
        let changed = self.with_conn(|conn| {
            conn.execute(
                "UPDATE securities SET name = ?1, search_key = ?2 WHERE id = ?3",
                params![diff.name, search_key(&diff.name), id],
            )
        })?;
        if changed == 0 {
            return Err(SecmasterError::DatabaseQuery {
                reason: format!("security {id} vanished before update"),
            });
        }
        Ok(())
    }

    fn find_overlapping_listings(
        &self,
        exchange_id: i64,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Vec<ListedSecurity>, SecmasterError> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM listings
             WHERE exchange_id = ?1 AND symbol = ?2
               AND start_date <= ?3 AND (end_date IS NULL OR end_date >= ?3)
             ORDER BY start_date, id"
        );
        self.query_listings(
            &sql,
            &[
                Value::Integer(exchange_id),
                Value::Text(symbol.to_string()),
                Value::Text(date_text(date)),
            ],
        )
    }

    fn find_listings_in_window(
        &self,
        exchange_id: i64,
        symbol: &str,
        window: &ListingWindow,
    ) -> Result<Vec<ListedSecurity>, SecmasterError> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM listings
             WHERE exchange_id = ?1 AND symbol = ?2
               AND (end_date IS NULL OR end_date >= ?3)
               AND (?4 IS NULL OR start_date <= ?4)
             ORDER BY start_date, id"
        );
        let end = window.end.map_or(Value::Null, |d| Value::Text(date_text(d)));
        self.query_listings(
            &sql,
            &[
                Value::Integer(exchange_id),
                Value::Text(symbol.to_string()),
                Value::Text(date_text(window.start)),
                end,
            ],
        )
    }

    fn listings_for(
        &self,
        exchange_id: i64,
        symbol: &str,
    ) -> Result<Vec<ListedSecurity>, SecmasterError> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM listings
             WHERE exchange_id = ?1 AND symbol = ?2
             ORDER BY start_date, id"
        );
        self.query_listings(
            &sql,
            &[Value::Integer(exchange_id), Value::Text(symbol.to_string())],
        )
    }

    fn create_listing(&self, new: &NewListing) -> Result<ListedSecurity, SecmasterError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO listings (security_id, exchange_id, symbol, start_date, end_date, vendor_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new.security_id,
                    new.exchange_id,
                    new.symbol,
                    date_text(new.start_date),
                    new.end_date.map(date_text),
                    new.vendor_id
                ],
            )?;
            Ok(ListedSecurity {
                id: conn.last_insert_rowid(),
                security_id: new.security_id,
                exchange_id: new.exchange_id,
                symbol: new.symbol.clone(),
                start_date: new.start_date,
                end_date: new.end_date,
                vendor_id: new.vendor_id,
            })
        })
    }

    fn update_listing(&self, id: i64, diff: &ListingDiff) -> Result<(), SecmasterError> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(security_id) = diff.security_id {
            sets.push("security_id");
            values.push(Value::Integer(security_id));
        }
        if let Some(symbol) = &diff.symbol {
            sets.push("symbol");
            values.push(Value::Text(symbol.clone()));
        }
        if let Some(start) = diff.start_date {
            sets.push("start_date");
            values.push(Value::Text(date_text(start)));
        }
        if let Some(end) = diff.end_date {
            sets.push("end_date");
            values.push(end.map_or(Value::Null, |d| Value::Text(date_text(d))));
        }
        if let Some(vendor_id) = diff.vendor_id {
            sets.push("vendor_id");
            values.push(vendor_id.map_or(Value::Null, Value::Integer));
        }
        if sets.is_empty() {
            return Ok(());
        }

        let assignments: Vec<String> = sets
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ?{}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE listings SET {} WHERE id = ?{}",
            assignments.join(", "),
            sets.len() + 1
        );
        values.push(Value::Integer(id));

        let changed = self.with_conn(|conn| conn.execute(&sql, params_from_iter(values.iter())))?;
        if changed == 0 {
            return Err(SecmasterError::DatabaseQuery {
                reason: format!("listing {id} vanished before update"),
            });
        }
        Ok(())
    }

    fn window_conflicts(&self) -> Result<Vec<(ListedSecurity, ListedSecurity)>, SecmasterError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT a.id, a.security_id, a.exchange_id, a.symbol, a.start_date, a.end_date, a.vendor_id,
                        b.id, b.security_id, b.exchange_id, b.symbol, b.start_date, b.end_date, b.vendor_id
                 FROM listings a
                 JOIN listings b
                   ON a.exchange_id = b.exchange_id AND a.symbol = b.symbol AND a.id < b.id
                 WHERE (a.end_date IS NULL OR a.end_date >= b.start_date)
                   AND (b.end_date IS NULL OR b.end_date >= a.start_date)
                 ORDER BY a.exchange_id, a.symbol, a.start_date, b.start_date",
            )?;
            let rows = stmt.query_map([], |row| Ok((listing_at(row, 0)?, listing_at(row, 7)?)))?;
            rows.collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
        fn section(&self, _section: &str) -> Vec<(String, String)> {
            Vec::new()
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn repo() -> SqliteRepository {
        let repo = SqliteRepository::in_memory().unwrap();
        repo.initialize_schema().unwrap();
        repo
    }

    fn seed_listing(
        repo: &SqliteRepository,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> ListedSecurity {
        let exchange = repo.get_or_create_exchange("NYSE").unwrap();
        let equity = repo.get_or_create_instrument_type("Equity").unwrap();
        let security = match repo.find_exact("ABC Corp", equity.id).unwrap().pop() {
            Some(s) => s,
            None => repo
                .create_entity(&NewSecurity {
                    name: "ABC Corp".into(),
                    instrument_type_id: equity.id,
                })
                .unwrap(),
        };
        repo.create_listing(&NewListing {
            security_id: security.id,
            exchange_id: exchange.id,
            symbol: "ABC".into(),
            start_date: start,
            end_date: end,
            vendor_id: Some(1001),
        })
        .unwrap()
    }

    #[test]
    fn from_config_missing_path() {
        match SqliteRepository::from_config(&EmptyConfig) {
            Err(SecmasterError::ConfigMissing { section, key }) => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let repo = repo();
        repo.initialize_schema().unwrap();
    }

    #[test]
    fn get_or_create_exchange_is_stable() {
        let repo = repo();
        let first = repo.get_or_create_exchange("NYSE").unwrap();
        let second = repo.get_or_create_exchange("NYSE").unwrap();
        assert_eq!(first, second);
        assert_eq!(repo.find_exchange("NYSE").unwrap(), Some(first));
        assert_eq!(repo.find_exchange("LSE").unwrap(), None);
    }

    #[test]
    fn find_exact_uses_normalized_key() {
        let repo = repo();
        let equity = repo.get_or_create_instrument_type("Equity").unwrap();
        let fund = repo.get_or_create_instrument_type("Fund").unwrap();
        let created = repo
            .create_entity(&NewSecurity {
                name: "ABC Corp".into(),
                instrument_type_id: equity.id,
            })
            .unwrap();

        assert_eq!(repo.find_exact("  abc CORP ", equity.id).unwrap(), vec![created]);
        assert!(repo.find_exact("ABC Corp", fund.id).unwrap().is_empty());
    }

    #[test]
    fn duplicate_search_key_is_rejected() {
        let repo = repo();
        let equity = repo.get_or_create_instrument_type("Equity").unwrap();
        let new = NewSecurity {
            name: "ABC Corp".into(),
            instrument_type_id: equity.id,
        };
        repo.create_entity(&new).unwrap();
        let err = repo.create_entity(&new).unwrap_err();
        assert!(matches!(err, SecmasterError::DatabaseQuery { .. }));
    }

    #[test]
    fn rename_updates_search_key() {
        let repo = repo();
        let equity = repo.get_or_create_instrument_type("Equity").unwrap();
        let security = repo
            .create_entity(&NewSecurity {
                name: "ABC Corp".into(),
                instrument_type_id: equity.id,
            })
            .unwrap();
        repo.update_entity(
            security.id,
            &SecurityDiff {
                name: "ABC Corp Inc".into(),
            },
        )
        .unwrap();

        let renamed = repo.get_entity(security.id).unwrap().unwrap();
        assert_eq!(renamed.name, "ABC Corp Inc");
        assert_eq!(renamed.search_key, "abc corp inc");
        assert_eq!(repo.security_names(equity.id).unwrap(), vec!["ABC Corp Inc"]);
    }

    #[test]
    fn overlapping_lookup_respects_bounds() {
        let repo = repo();
        let listing = seed_listing(&repo, date(2020, 1, 1), Some(date(2020, 12, 31)));

        let hit = |d| repo.find_overlapping_listings(listing.exchange_id, "ABC", d).unwrap();
        assert_eq!(hit(date(2020, 1, 1)), vec![listing.clone()]);
        assert_eq!(hit(date(2020, 12, 31)), vec![listing.clone()]);
        assert!(hit(date(2019, 12, 31)).is_empty());
        assert!(hit(date(2021, 1, 1)).is_empty());
    }

    #[test]
    fn window_query_handles_open_ends() {
        let repo = repo();
        let closed = seed_listing(&repo, date(2018, 1, 1), Some(date(2019, 6, 30)));
        let open = seed_listing(&repo, date(2020, 1, 1), None);
        let exchange_id = closed.exchange_id;

        let everything = ListingWindow {
            start: date(2000, 1, 1),
            end: None,
        };
        assert_eq!(
            repo.find_listings_in_window(exchange_id, "ABC", &everything).unwrap(),
            vec![closed.clone(), open.clone()]
        );

        let gap = ListingWindow {
            start: date(2019, 7, 1),
            end: Some(date(2019, 12, 31)),
        };
        assert!(repo.find_listings_in_window(exchange_id, "ABC", &gap).unwrap().is_empty());

        let late = ListingWindow {
            start: date(2025, 1, 1),
            end: Some(date(2025, 2, 1)),
        };
        assert_eq!(
            repo.find_listings_in_window(exchange_id, "ABC", &late).unwrap(),
            vec![open]
        );
    }

    #[test]
    fn update_listing_applies_partial_diff() {
        let repo = repo();
        let listing = seed_listing(&repo, date(2020, 1, 1), None);

        repo.update_listing(
            listing.id,
            &ListingDiff {
                end_date: Some(Some(date(2022, 3, 31))),
                vendor_id: Some(None),
                ..ListingDiff::default()
            },
        )
        .unwrap();

        let stored = repo.listings_for(listing.exchange_id, "ABC").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].end_date, Some(date(2022, 3, 31)));
        assert_eq!(stored[0].vendor_id, None);
        assert_eq!(stored[0].start_date, date(2020, 1, 1));
    }

    #[test]
    fn update_of_missing_rows_is_a_database_error() {
        let repo = repo();
        let err = repo
            .update_listing(
                99,
                &ListingDiff {
                    symbol: Some("XYZ".into()),
                    ..ListingDiff::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, SecmasterError::DatabaseQuery { .. }));

        let err = repo
            .update_entity(
                99,
                &SecurityDiff {
                    name: "Gone Corp".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, SecmasterError::DatabaseQuery { .. }));
    }

    #[test]
    fn rollback_discards_writes() {
        let repo = repo();
        repo.begin().unwrap();
        repo.get_or_create_exchange("NYSE").unwrap();
        assert!(repo.find_exchange("NYSE").unwrap().is_some());
        repo.rollback().unwrap();
        assert_eq!(repo.find_exchange("NYSE").unwrap(), None);
    }

    #[test]
    fn commit_keeps_writes() {
        let repo = repo();
        repo.begin().unwrap();
        repo.get_or_create_exchange("NYSE").unwrap();
        repo.commit().unwrap();
        assert!(repo.find_exchange("NYSE").unwrap().is_some());
    }

    #[test]
    fn nested_begin_is_rejected() {
        let repo = repo();
        repo.begin().unwrap();
        assert!(repo.begin().is_err());
        repo.rollback().unwrap();
        assert!(repo.commit().is_err());
    }

    #[test]
    fn window_conflicts_reports_overlapping_pairs() {
        let repo = repo();
        let first = seed_listing(&repo, date(2020, 1, 1), None);
        let second = seed_listing(&repo, date(2021, 1, 1), Some(date(2021, 12, 31)));
        seed_listing(&repo, date(2010, 1, 1), Some(date(2010, 12, 31)));

        assert_eq!(repo.window_conflicts().unwrap(), vec![(first, second)]);
    }
}
