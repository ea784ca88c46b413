use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use std::path::Path;
use std::str::FromStr;

use crate::error::StorageError;
use crate::model::{AnalysisRecord, Candle, TimeFrame};
use crate::storage::Storage;

type CandleRow = (String, String, String, f64, f64, f64, f64, f64);

type AnalysisRow = (
    String,
    String,
    String,
    String,
    Option<f64>,
    Option<f64>,
    String,
);

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, Report<StorageError>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .change_context(StorageError::Migration)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(StorageError::Migration)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(StorageError::Migration)
            .attach_with(|| format!("database path: {}", path.display()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StorageError::Migration)?;

        Ok(Self { pool })
    }
}

#[cfg(test)]
impl SqliteStorage {
    /// Migrated in-memory database for tests.
    pub(crate) async fn in_memory() -> Self {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .create_if_missing(true);
        // every connection to :memory: is a separate database
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        Self { pool }
    }
}

impl Storage for SqliteStorage {
    fn upsert_candles(
        &self,
        candles: &[Candle],
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let candles = candles.to_vec();
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .change_context(StorageError::Insert)?;

            for c in &candles {
                sqlx::query(
                    "INSERT OR REPLACE INTO candles \
                     (symbol, timeframe, open_time, open, high, low, close, volume) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&c.symbol)
                .bind(c.timeframe.as_str())
                .bind(c.open_time.to_rfc3339())
                .bind(c.open)
                .bind(c.high)
                .bind(c.low)
                .bind(c.close)
                .bind(c.volume)
                .execute(&mut *tx)
                .await
                .change_context(StorageError::Insert)?;
            }

            tx.commit().await.change_context(StorageError::Insert)?;
            Ok(())
        })
    }

    fn get_recent_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let rows: Vec<CandleRow> = sqlx::query_as(
                "SELECT symbol, timeframe, open_time, open, high, low, close, volume \
                 FROM candles \
                 WHERE symbol = ? AND timeframe = ? \
                 ORDER BY open_time DESC \
                 LIMIT ?",
            )
            .bind(&symbol)
            .bind(timeframe.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            let mut candles = rows
                .into_iter()
                .map(map_candle_row)
                .collect::<Result<Vec<_>, _>>()?;

            // Reverse to ascending (oldest first) order
            candles.reverse();
            Ok(candles)
        })
    }

    fn get_candles_in_range(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let rows: Vec<CandleRow> = sqlx::query_as(
                "SELECT symbol, timeframe, open_time, open, high, low, close, volume \
                 FROM candles \
                 WHERE symbol = ? AND timeframe = ? AND open_time >= ? AND open_time < ? \
                 ORDER BY open_time ASC",
            )
            .bind(&symbol)
            .bind(timeframe.as_str())
            .bind(start_time.to_rfc3339())
            .bind(end_time.to_rfc3339())
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            rows.into_iter().map(map_candle_row).collect()
        })
    }

    fn log_analysis(
        &self,
        record: &AnalysisRecord,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let record = record.clone();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO analyses \
                 (symbol, timeframe, strategy, label, current_price, target_price, analyzed_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.symbol)
            .bind(record.timeframe.as_str())
            .bind(&record.strategy)
            .bind(&record.label)
            .bind(record.current_price)
            .bind(record.target_price)
            .bind(record.analyzed_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .change_context(StorageError::Insert)?;
            Ok(())
        })
    }

    fn recent_analyses(
        &self,
        symbol: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<AnalysisRecord>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let rows: Vec<AnalysisRow> = sqlx::query_as(
                "SELECT symbol, timeframe, strategy, label, current_price, target_price, analyzed_at \
                 FROM analyses WHERE symbol = ? \
                 ORDER BY analyzed_at DESC, id DESC LIMIT ?",
            )
            .bind(&symbol)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            rows.into_iter().map(map_analysis_row).collect()
        })
    }
}

fn map_candle_row(
    (symbol, timeframe, open_time, open, high, low, close, volume): CandleRow,
) -> Result<Candle, Report<StorageError>> {
    Ok(Candle {
        symbol,
        timeframe: parse_timeframe(&timeframe)?,
        open_time: parse_time_utc(&open_time)?,
        open,
        high,
        low,
        close,
        volume,
    })
}

fn map_analysis_row(
    (symbol, timeframe, strategy, label, current_price, target_price, analyzed_at): AnalysisRow,
) -> Result<AnalysisRecord, Report<StorageError>> {
    Ok(AnalysisRecord {
        symbol,
        timeframe: parse_timeframe(&timeframe)?,
        strategy,
        label,
        current_price,
        target_price,
        analyzed_at: parse_time_utc(&analyzed_at)?,
    })
}

fn parse_timeframe(value: &str) -> Result<TimeFrame, Report<StorageError>> {
    TimeFrame::from_str(value).ok_or_else(|| {
        Report::new(StorageError::Query).attach(format!("unknown stored timeframe: {value}"))
    })
}

fn parse_time_utc(value: &str) -> Result<DateTime<Utc>, Report<StorageError>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .change_context(StorageError::Query)
        .attach_with(|| format!("stored timestamp: {value}"))
}
