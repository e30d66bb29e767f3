use mtf_core::candle::{normalize, Candle};
use mtf_core::error::CoreError;
use mtf_core::source::{CandleSource, TimeRange};
use mtf_core::timeframe::Timeframe;
use rusqlite::types::ToSql;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

use crate::error::DataError;

/// Candle source over one or more SQLite partitions.
///
/// Expected table:
///
/// ```sql
/// CREATE TABLE candles (
///     symbol TEXT NOT NULL, interval TEXT NOT NULL, t INTEGER NOT NULL,
///     o REAL, h REAL, l REAL, c REAL, v REAL,
///     PRIMARY KEY (symbol, interval, t)
/// );
/// ```
///
/// Every query opens its own read-only connection, so the source is `Sync`
/// and can be shared across rayon workers.
#[derive(Debug, Clone)]
pub struct SqliteCandleSource {
    paths: Vec<PathBuf>,
}

impl SqliteCandleSource {
    /// Single database. The file must exist and contain a `candles` table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataError> {
        Self::with_partitions(vec![path.as_ref().to_path_buf()])
    }

    /// Candle history split across several files; overlapping bars are
    /// deduplicated on `(symbol, t)` after merging.
    pub fn with_partitions(paths: Vec<PathBuf>) -> Result<Self, DataError> {
        if paths.is_empty() {
            return Err(DataError::NoDatabase);
        }
        for p in &paths {
            let conn = connect(p)?;
            let found: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'candles'",
                [],
                |row| row.get(0),
            )?;
            if found == 0 {
                return Err(DataError::MissingTable { path: p.clone() });
            }
        }
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Min/max open time of a (symbol, timeframe) partition across all files,
    /// or `None` when there are no rows.
    pub fn time_range(&self, symbol: &str, timeframe: Timeframe) -> Result<Option<(i64, i64)>, DataError> {
        let interval = timeframe.to_string();
        let mut min_t: Option<i64> = None;
        let mut max_t: Option<i64> = None;

        for p in &self.paths {
            let conn = connect(p)?;
            let (mn, mx): (Option<i64>, Option<i64>) = conn.query_row(
                "SELECT MIN(t), MAX(t) FROM candles WHERE symbol = ?1 AND interval = ?2",
                (symbol, interval.as_str()),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            if let Some((mn, mx)) = mn.zip(mx) {
                min_t = Some(min_t.map_or(mn, |v| v.min(mn)));
                max_t = Some(max_t.map_or(mx, |v| v.max(mx)));
            }
        }
        Ok(min_t.zip(max_t))
    }

    fn load(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<Candle>, DataError> {
        let start = Instant::now();
        let interval = timeframe.to_string();

        // Build dynamic WHERE clause
        let mut where_parts = vec!["symbol = ?1".to_string(), "interval = ?2".to_string()];
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(symbol.to_string()), Box::new(interval.clone())];
        if let Some(s) = range.start {
            params.push(Box::new(s));
            where_parts.push(format!("t >= ?{}", params.len()));
        }
        if let Some(e) = range.end {
            params.push(Box::new(e));
            where_parts.push(format!("t <= ?{}", params.len()));
        }
        // Newest first so LIMIT keeps the most recent rows; reversed below.
        let mut query = format!(
            "SELECT t, o, h, l, c, v FROM candles WHERE {} ORDER BY t DESC",
            where_parts.join(" AND "),
        );
        if let Some(n) = limit {
            query.push_str(&format!(" LIMIT {n}"));
        }
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut out: Vec<Candle> = Vec::new();
        for p in &self.paths {
            let conn = connect(p)?;
            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(param_refs.as_slice(), |row| {
                Ok(Candle {
                    t: row.get(0)?,
                    o: row.get(1)?,
                    h: row.get(2)?,
                    l: row.get(3)?,
                    c: row.get(4)?,
                    v: row.get(5)?,
                })
            })?;
            for row in rows {
                out.push(row?);
            }
        }

        normalize(&mut out);
        if let Some(n) = limit {
            if out.len() > n {
                out.drain(..out.len() - n);
            }
        }

        debug!(
            symbol,
            interval = %interval,
            bars = out.len(),
            partitions = self.paths.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded candles"
        );
        Ok(out)
    }

    fn load_symbols(&self) -> Result<Vec<String>, DataError> {
        let mut out = Vec::new();
        for p in &self.paths {
            let conn = connect(p)?;
            let mut stmt = conn.prepare("SELECT DISTINCT symbol FROM candles ORDER BY symbol")?;
            let symbols = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            out.extend(symbols);
        }
        out.sort();
        out.dedup();
        Ok(out)
    }
}

fn connect(path: &Path) -> Result<Connection, DataError> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(|source| DataError::Open {
        path: path.to_path_buf(),
        source,
    })
}

impl CandleSource for SqliteCandleSource {
    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<Candle>, CoreError> {
        Ok(self.load(symbol, timeframe, range, limit)?)
    }

    fn symbols(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.load_symbols()?)
    }
}
