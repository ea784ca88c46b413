pub mod sqlite;

use chrono::{DateTime, Utc};
use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::StorageError;
use crate::model::{AnalysisRecord, Candle, TimeFrame};

pub trait Storage: Send + Sync {
    /// Insert candles, replacing any stored candle with the same
    /// `(symbol, timeframe, open_time)`.
    fn upsert_candles(&self, candles: &[Candle])
    -> BoxFuture<'_, Result<(), Report<StorageError>>>;

    /// The newest `limit` candles, returned oldest first.
    fn get_recent_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<StorageError>>>;

    fn get_candles_in_range(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<StorageError>>>;

    fn log_analysis(&self, record: &AnalysisRecord)
    -> BoxFuture<'_, Result<(), Report<StorageError>>>;

    /// The newest `limit` analyses for `symbol`, newest first.
    fn recent_analyses(
        &self,
        symbol: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<AnalysisRecord>, Report<StorageError>>>;
}
