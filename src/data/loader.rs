//! Data loader: one `SELECT` over the fact table, plus the TTL cache.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Instant;

use chrono::NaiveDate;
use duckdb::Connection;
use strum::IntoEnumIterator;

use crate::config::DbSettings;
use crate::error::{DashboardError, Result};

use super::{FactTable, Indicator, TariffRecord};

/// Columns the pipeline cannot work without. Indicator columns are
/// optional: a missing one merely leaves that indicator undefined.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "fecha",
    "municipio",
    "estrato",
    "servicio",
    "Cargo Fijo",
    "Cargo por Consumo",
];

/// Load the full fact table from the configured database.
///
/// Fails with `ConnectionFailure` when the database cannot be opened or
/// queried, `SchemaMismatch` when required columns are absent, and
/// `EmptyTable` when no usable rows come back. The returned table is
/// read-only from the caller's perspective.
pub fn load_fact_table(db: &DbSettings) -> Result<FactTable> {
    let conn = if db.database == ":memory:" {
        Connection::open_in_memory()?
    } else {
        Connection::open(&db.database)?
    };
    load_from_connection(&conn, &db.fact_table)
}

/// Load the fact table over an existing connection.
pub fn load_from_connection(conn: &Connection, table: &str) -> Result<FactTable> {
    let columns = table_columns(conn, table)?;

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !columns.iter().any(|have| have == *c))
        .map(|c| (*c).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(DashboardError::SchemaMismatch {
            table: table.to_string(),
            missing,
        });
    }

    let present_indicators: Vec<Indicator> = Indicator::iter()
        .filter(|i| columns.iter().any(|have| have == i.column()))
        .collect();

    let mut select = vec![
        "CAST(\"fecha\" AS VARCHAR)".to_string(),
        quoted("municipio"),
        format!("CAST({} AS VARCHAR)", quoted("estrato")),
        quoted("servicio"),
        format!("CAST({} AS DOUBLE)", quoted("Cargo Fijo")),
        format!("CAST({} AS DOUBLE)", quoted("Cargo por Consumo")),
    ];
    for indicator in &present_indicators {
        select.push(format!("CAST({} AS DOUBLE)", quoted(indicator.column())));
    }
    let sql = format!(
        "SELECT {} FROM {} ORDER BY \"fecha\"",
        select.join(", "),
        quoted(table),
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;

    let mut records = Vec::new();
    let mut skipped = 0usize;
    while let Some(row) = rows.next()? {
        let raw_date: Option<String> = row.get(0)?;
        let municipality: Option<String> = row.get(1)?;
        let stratum: Option<String> = row.get(2)?;
        let service: Option<String> = row.get(3)?;
        let fixed_charge: Option<f64> = row.get(4)?;
        let consumption_charge: Option<f64> = row.get(5)?;

        let (raw_date, municipality, stratum, service, fixed_charge, consumption_charge) = match (
            raw_date,
            municipality,
            stratum,
            service,
            fixed_charge,
            consumption_charge,
        ) {
            (Some(d), Some(m), Some(e), Some(s), Some(f), Some(c))
                if f.is_finite() && c.is_finite() =>
            {
                (d, m, e, s, f, c)
            }
            _ => {
                skipped += 1;
                continue;
            }
        };

        let date = match parse_date(&raw_date) {
            Some(date) => date,
            None => {
                skipped += 1;
                continue;
            }
        };

        let mut indicators = BTreeMap::new();
        for (offset, indicator) in present_indicators.iter().enumerate() {
            if let Some(value) = row.get::<_, Option<f64>>(6 + offset)? {
                if value.is_finite() {
                    indicators.insert(*indicator, value);
                }
            }
        }

        records.push(TariffRecord {
            date,
            municipality,
            stratum,
            service,
            fixed_charge,
            consumption_charge,
            indicators,
        });
    }

    if skipped > 0 {
        tracing::warn!(skipped, table, "dropped fact rows with NULL or unparsable fields");
    }
    if records.is_empty() {
        return Err(DashboardError::EmptyTable(table.to_string()));
    }

    tracing::debug!(rows = records.len(), table, "fact table loaded");
    Ok(FactTable::new(records))
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT column_name FROM information_schema.columns WHERE table_name = ?")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Accepts `YYYY-MM-DD`, tolerating a trailing time component from
/// TIMESTAMP-typed date columns.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Double-quote an identifier, doubling any embedded quotes.
fn quoted(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

struct CacheEntry {
    loaded_at: Instant,
    table: std::sync::Arc<FactTable>,
}

/// Bounded cache for the loaded fact table.
///
/// Replaces the original "cache forever" pattern: entries expire after
/// the configured time-to-live and can be invalidated explicitly, so a
/// refreshed database shows up without a process restart.
pub struct FactCache {
    slot: Mutex<Option<CacheEntry>>,
}

impl FactCache {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Return the cached snapshot if it is still fresh, otherwise load a
    /// new one. Load errors are propagated and nothing stale is served.
    pub fn get_or_load(&self, db: &DbSettings) -> Result<std::sync::Arc<FactTable>> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = slot.as_ref() {
            if entry.loaded_at.elapsed() < db.cache_ttl {
                return Ok(std::sync::Arc::clone(&entry.table));
            }
        }

        let table = std::sync::Arc::new(load_fact_table(db)?);
        tracing::info!(rows = table.len(), "fact table (re)loaded into cache");
        *slot = Some(CacheEntry {
            loaded_at: Instant::now(),
            table: std::sync::Arc::clone(&table),
        });
        Ok(table)
    }

    /// Drop the cached snapshot; the next access reloads.
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

impl Default for FactCache {
    fn default() -> Self {
        Self::new()
    }
}
