//! Reading time-series store for Lampyris
//!
//! SQLite-backed storage for decoded beacon readings: an upsert keyed by
//! minute timestamp that derives interval energy from the cumulative
//! counter, plus the gap query and null-guarded carbon fill used by the
//! enrichment pass.

use crate::advert::MeterReading;
use crate::error::{LampyrisError, Result};
use crate::logging::{StructuredLogger, get_logger};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One persisted reading with its derived and enriched fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingRow {
    /// Arrival time, truncated to the minute by the caller
    pub timestamp: DateTime<Utc>,

    /// Battery percentage reported by the beacon
    pub battery: u8,

    /// Cumulative energy in kWh
    pub total_kwh: f64,

    /// Energy consumed since the previous row, null for the first row
    pub interval_kwh: Option<f64>,

    /// Instantaneous power in kW
    pub kw: f64,

    /// Regional carbon intensity in gCO2/kWh, null until enriched
    pub carbon_intensity: Option<u32>,

    /// Intensity band reported alongside the forecast (e.g. "low")
    pub intensity_index: Option<String>,

    /// Carbon mass for the interval in gCO2, null until enriched
    pub carbon_g: Option<f64>,
}

/// Time-series store over a single SQLite connection
pub struct ReadingStore {
    conn: Connection,
    logger: StructuredLogger,
}

impl ReadingStore {
    /// Open (or create) the store at the given database path
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn)?;
        store
            .logger
            .info(&format!("Readings database initialized at {}", path.display()));
        Ok(store)
    }

    /// Open an ephemeral in-memory store
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let logger = get_logger("store");

        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            logger.warn(&format!("Failed to enable WAL mode: {}", e));
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS readings (
                timestamp TEXT PRIMARY KEY,
                battery INTEGER NOT NULL,
                total_kwh REAL NOT NULL,
                interval_kwh REAL,
                kw REAL NOT NULL,
                carbon_intensity INTEGER,
                intensity_index TEXT,
                carbon_g REAL
            )",
        )?;

        Ok(Self { conn, logger })
    }

    /// Insert a decoded reading, deriving interval energy from the prior row
    ///
    /// A row already present at the same timestamp is replaced wholesale
    /// (last-write-wins). The interval is computed against the latest row
    /// strictly before the new timestamp, so a replaced row never acts as
    /// its own predecessor.
    pub fn insert(&mut self, timestamp: DateTime<Utc>, reading: &MeterReading) -> Result<()> {
        let key = fmt_timestamp(&timestamp);
        let tx = self.conn.transaction()?;

        let prior_total: Option<f64> = tx
            .query_row(
                "SELECT total_kwh FROM readings
                 WHERE timestamp < ?1
                 ORDER BY timestamp DESC
                 LIMIT 1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        let interval_kwh = prior_total.map(|prior| reading.cumulative_kwh - prior);

        tx.execute(
            "INSERT OR REPLACE INTO readings
             (timestamp, battery, total_kwh, interval_kwh, kw,
              carbon_intensity, intensity_index, carbon_g)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, NULL)",
            params![
                key,
                reading.battery,
                reading.cumulative_kwh,
                interval_kwh,
                reading.rate_kw,
            ],
        )?;
        tx.commit()?;

        self.logger.debug(&format!("Stored reading at {}", key));
        Ok(())
    }

    /// Inclusive timestamp bounds of all rows still lacking carbon data
    pub fn find_gap_range(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let bounds: (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM readings
             WHERE carbon_intensity IS NULL",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        match bounds {
            (Some(min), Some(max)) => Ok(Some((parse_timestamp(&min)?, parse_timestamp(&max)?))),
            _ => Ok(None),
        }
    }

    /// Set the carbon triplet on unenriched rows within `[from, to)`
    ///
    /// The IS NULL guard keeps repeated passes additive: a value set by an
    /// earlier pass is never overwritten by a retried or overlapping fetch.
    /// Returns the number of rows updated.
    pub fn fill_carbon(
        &self,
        forecast: u32,
        index: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize> {
        let updated = self.conn.execute(
            "UPDATE readings
             SET carbon_intensity = ?1,
                 intensity_index = ?2,
                 carbon_g = ?1 * interval_kwh
             WHERE timestamp >= ?3 AND timestamp < ?4
               AND carbon_intensity IS NULL",
            params![forecast, index, fmt_timestamp(&from), fmt_timestamp(&to)],
        )?;
        Ok(updated)
    }

    /// Full snapshot of all rows in timestamp order
    pub fn export_all(&self) -> Result<Vec<ReadingRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, battery, total_kwh, interval_kwh, kw,
                    carbon_intensity, intensity_index, carbon_g
             FROM readings
             ORDER BY timestamp",
        )?;

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row_to_reading(row)?);
        }
        Ok(out)
    }
}

fn row_to_reading(row: &Row<'_>) -> Result<ReadingRow> {
    let timestamp: String = row.get("timestamp")?;
    Ok(ReadingRow {
        timestamp: parse_timestamp(&timestamp)?,
        battery: row.get("battery")?,
        total_kwh: row.get("total_kwh")?,
        interval_kwh: row.get("interval_kwh")?,
        kw: row.get("kw")?,
        carbon_intensity: row.get("carbon_intensity")?,
        intensity_index: row.get("intensity_index")?,
        carbon_g: row.get("carbon_g")?,
    })
}

// Uniform second-precision text keys keep lexicographic order chronological.
fn fmt_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            LampyrisError::storage(format!("Invalid stored timestamp '{}': {}", value, e))
        })
}
